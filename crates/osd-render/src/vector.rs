//! Vector line batching.
//!
//! Consecutive vector lines are expanded into one triangle list so the
//! post-processing chain can shade the whole beam pass in a single draw.
//! When that chain is active the vertices are also mapped from screen space
//! into the vector render target, which may be rotated or flipped relative to
//! the emulated screen.

use crate::batch::PolygonDescriptor;
use crate::context::GpuContext;
use crate::device::{Device, PrimitiveTopology, TextureOp};
use crate::geometry::{line_to_quad, Vec2, Vertex};
use crate::postfx::{PostProcessor, FSFX_QUAD_VERTICES};
use crate::primitive::{Primitive, PrimitiveKind};
use crate::window::Orientation;

pub const VECTOR_MIN_WIDTH: f32 = 2.0;
pub const VERTICES_PER_VECTOR: u32 = 6;

/// Size of the vector render target, taken from the frame's vector buffer quad.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VectorTarget {
    pub quad_width: f32,
    pub quad_height: f32,
    pub full_width: f32,
    pub full_height: f32,
}

impl VectorTarget {
    /// Uses the last vector buffer quad in `prims`; all zero when there is none.
    pub fn from_primitives(prims: &[Primitive]) -> Self {
        prims
            .iter()
            .rev()
            .find(|p| p.kind == PrimitiveKind::Quad && p.flags.is_vector_buffer())
            .map_or_else(Self::default, |p| Self {
                quad_width: p.quad_width(),
                quad_height: p.quad_height(),
                full_width: p.full_quad_width(),
                full_height: p.full_quad_height(),
            })
    }
}

/// Maps screen-space vector vertices into the vector render target.
///
/// The steps run in a fixed order: swap, mirror, center, rescale, uncenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorTransform {
    screen_width: f32,
    screen_height: f32,
    swap_xy: bool,
    flip_x: bool,
    flip_y: bool,
    ratio_x: f32,
    ratio_y: f32,
}

impl VectorTransform {
    pub fn new(
        screen_width: f32,
        screen_height: f32,
        target_width: f32,
        target_height: f32,
        native: Orientation,
        target: Orientation,
    ) -> Self {
        let native_swap = native.swaps_xy();
        let swap_xy = native_swap ^ target.swaps_xy();

        let rot0 = target == Orientation::ROT0;
        let rot90 = target == Orientation::ROT90;
        let rot180 = target == Orientation::ROT180;
        let rot270 = target == Orientation::ROT270;
        let flip_x = ((rot0 || rot270) && native_swap) || ((rot180 || rot270) && !native_swap);
        let flip_y = ((rot0 || rot90) && native_swap) || ((rot180 || rot90) && !native_swap);

        // Without a vector buffer quad there is nothing to rescale against.
        let ratio = |screen: f32, target: f32| if target > 0.0 { screen / target } else { 1.0 };
        let mut ratio_x = ratio(screen_width, target_width);
        let mut ratio_y = ratio(screen_height, target_height);
        if swap_xy {
            std::mem::swap(&mut ratio_x, &mut ratio_y);
        }

        Self {
            screen_width,
            screen_height,
            swap_xy,
            flip_x,
            flip_y,
            ratio_x,
            ratio_y,
        }
    }

    pub fn swaps_xy(&self) -> bool {
        self.swap_xy
    }

    pub fn flips(&self) -> (bool, bool) {
        (self.flip_x, self.flip_y)
    }

    pub fn apply(&self, vertex: &mut Vertex) {
        let (w, h) = (self.screen_width, self.screen_height);
        let (mut x, mut y) = (vertex.x, vertex.y);

        if self.swap_xy {
            x *= h / w;
            y *= w / h;
            std::mem::swap(&mut x, &mut y);
        }
        if self.flip_x {
            x = w - x;
        }
        if self.flip_y {
            y = h - y;
        }

        x -= w * 0.5;
        y -= h * 0.5;
        x *= self.ratio_x;
        y *= self.ratio_y;
        x += w * 0.5;
        y += h * 0.5;

        vertex.x = x;
        vertex.y = y;
    }
}

/// Expands one vector line into two triangles.
///
/// `uv` is the default texture's UV rectangle; `None` selects the procedural
/// unit-square UVs the post-processing chain expects. The second UV set holds
/// the line's length and width.
pub fn vector_line_vertices(prim: &Primitive, uv: Option<(Vec2, Vec2)>) -> [Vertex; 6] {
    let width = prim.width.max(VECTOR_MIN_WIDTH);
    let (b0, b1) = line_to_quad(&prim.bounds, width, width);

    let length = (b1.x1 - b0.x1).hypot(b1.y1 - b0.y1);
    let line_width = (b1.x1 - b1.x0).hypot(b1.y1 - b1.y0);

    let (start, stop) = uv.unwrap_or((Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)));
    let corners = [
        (b0.x0, b0.y0, start.x, start.y),
        (b0.x1, b0.y1, start.x, stop.y),
        (b1.x0, b1.y0, stop.x, start.y),
        (b0.x1, b0.y1, start.x, stop.y),
        (b1.x0, b1.y0, stop.x, start.y),
        (b1.x1, b1.y1, stop.x, stop.y),
    ];

    let color = prim.color.to_argb();
    corners.map(|(x, y, u0, v0)| Vertex {
        x: x - 0.5,
        y: y - 0.5,
        z: 0.0,
        rhw: 1.0,
        color,
        u0,
        v0,
        u1: length,
        v1: line_width,
    })
}

/// Orientation of the emulated screen and of the window's render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorOrientation {
    pub native: Orientation,
    pub target: Orientation,
}

impl<D: Device> GpuContext<D> {
    /// Batches a run of vector lines into one triangle list per vertex buffer fill.
    pub(crate) fn batch_vectors(
        &mut self,
        lines: &[Primitive],
        target: VectorTarget,
        orientation: VectorOrientation,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) {
        let capacity = self.stream.as_ref().map_or(0, |s| s.capacity());
        let reserved = if postfx_enabled { FSFX_QUAD_VERTICES } else { 0 };
        let per_batch = (capacity.saturating_sub(reserved) / VERTICES_PER_VECTOR).max(1) as usize;

        for chunk in lines.chunks(per_batch) {
            self.batch_vector_chunk(chunk, target, orientation, postfx, postfx_enabled);
        }
    }

    fn batch_vector_chunk(
        &mut self,
        lines: &[Primitive],
        target: VectorTarget,
        orientation: VectorOrientation,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) {
        let Some(last) = lines.last() else {
            return;
        };
        let flags = last.flags;
        let uv = (!postfx_enabled).then(|| self.default_uv());
        let transform = postfx_enabled.then(|| {
            VectorTransform::new(
                self.params.back_buffer_width as f32,
                self.params.back_buffer_height as f32,
                target.full_width,
                target.full_height,
                orientation.native,
                orientation.target,
            )
        });

        let count = lines.len() as u32;
        let vertex_count = count * VERTICES_PER_VECTOR;
        let Some(verts) = self.mesh_alloc(postfx, postfx_enabled, vertex_count) else {
            tracing::debug!(lines = count, "no room for vector batch");
            return;
        };

        for (slot, line) in verts.chunks_exact_mut(VERTICES_PER_VECTOR as usize).zip(lines) {
            slot.copy_from_slice(&vector_line_vertices(line, uv));
        }
        if let Some(transform) = transform {
            verts.iter_mut().for_each(|v| transform.apply(v));
        }

        self.queue_polygon(PolygonDescriptor {
            topology: PrimitiveTopology::TriangleList,
            primitive_count: count * 2,
            vertex_count,
            flags,
            texture: None,
            modulation: TextureOp::Modulate,
            quad_width: target.quad_width,
            quad_height: target.quad_height,
        });
    }

    /// Turns the frame's primitives into queued polygons.
    pub(crate) fn process_primitives(
        &mut self,
        prims: &[Primitive],
        orientation: VectorOrientation,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) {
        let target = VectorTarget::from_primitives(prims);

        let mut i = 0;
        while i < prims.len() {
            let prim = &prims[i];
            if prim.is_vector_line() {
                let run = prims[i..].iter().take_while(|p| p.is_vector_line()).count();
                self.batch_vectors(&prims[i..i + run], target, orientation, postfx, postfx_enabled);
                i += run;
                continue;
            }
            match prim.kind {
                PrimitiveKind::Line => self.draw_line(prim, postfx, postfx_enabled),
                PrimitiveKind::Quad => self.draw_quad(prim, postfx, postfx_enabled),
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::geometry::{Bounds, Color};
    use crate::postfx::NullPostProcessor;
    use crate::primitive::PrimFlags;
    use crate::sim::SimulatedDevice;

    fn vector_line(x0: f32, y0: f32, x1: f32, y1: f32) -> Primitive {
        Primitive::line(
            Bounds::new(x0, y0, x1, y1),
            1.0,
            Color::new(0.0, 1.0, 0.0, 1.0),
            PrimFlags::VECTOR,
        )
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    const UPRIGHT: VectorOrientation = VectorOrientation {
        native: Orientation::ROT0,
        target: Orientation::ROT0,
    };

    #[test]
    fn line_expands_to_two_triangles_with_length_and_width() {
        let prim = vector_line(10.0, 10.0, 20.0, 10.0);
        let v = vector_line_vertices(&prim, None);

        // Width floor of 2 extends the line by 1 at each end.
        assert_eq!((v[0].x, v[0].y), (8.5, 10.5));
        assert_eq!((v[5].x, v[5].y), (20.5, 8.5));
        assert_eq!(v[1], v[3]);
        assert_eq!(v[2], v[4]);
        assert!(v.iter().all(|p| approx(p.u1, 12.0) && approx(p.v1, 2.0)));
        assert_eq!((v[5].u0, v[5].v0), (1.0, 1.0));
        assert_eq!(v[0].color, 0xff00_ff00);
    }

    #[test]
    fn upright_target_is_identity() {
        let t = VectorTransform::new(640.0, 480.0, 640.0, 480.0, Orientation::ROT0, Orientation::ROT0);
        assert_eq!(t.flips(), (false, false));
        assert!(!t.swaps_xy());

        let prim = vector_line(100.0, 50.0, 300.0, 400.0);
        let before = vector_line_vertices(&prim, None);
        let mut after = before;
        after.iter_mut().for_each(|v| t.apply(v));
        for (a, b) in after.iter().zip(&before) {
            assert!(approx(a.x, b.x) && approx(a.y, b.y), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn rot180_mirrors_both_axes() {
        let t = VectorTransform::new(640.0, 480.0, 640.0, 480.0, Orientation::ROT0, Orientation::ROT180);
        assert_eq!(t.flips(), (true, true));
        let mut v = Vertex {
            x: 100.0,
            y: 40.0,
            ..Vertex::default()
        };
        t.apply(&mut v);
        assert_eq!((v.x, v.y), (540.0, 440.0));
    }

    #[test]
    fn rot90_swaps_with_aspect_correction() {
        let t = VectorTransform::new(400.0, 200.0, 400.0, 200.0, Orientation::ROT0, Orientation::ROT90);
        assert!(t.swaps_xy());
        assert_eq!(t.flips(), (false, true));

        let mut v = Vertex {
            x: 100.0,
            y: 50.0,
            ..Vertex::default()
        };
        t.apply(&mut v);
        // Scaled to (50, 100), swapped to (100, 50), then mirrored in y.
        assert!(approx(v.x, 100.0) && approx(v.y, 150.0), "{v:?}");
    }

    #[test]
    fn ratio_rescales_around_center() {
        let t = VectorTransform::new(640.0, 480.0, 320.0, 240.0, Orientation::ROT0, Orientation::ROT0);
        let mut v = Vertex {
            x: 420.0,
            y: 240.0,
            ..Vertex::default()
        };
        t.apply(&mut v);
        assert_eq!((v.x, v.y), (520.0, 240.0));
    }

    #[test]
    fn missing_vector_target_keeps_scale() {
        let t = VectorTransform::new(640.0, 480.0, 0.0, 0.0, Orientation::ROT0, Orientation::ROT0);
        let mut v = Vertex {
            x: 10.0,
            y: 20.0,
            ..Vertex::default()
        };
        t.apply(&mut v);
        assert_eq!((v.x, v.y), (10.0, 20.0));
    }

    #[test]
    fn consecutive_vectors_share_one_descriptor() {
        let mut ctx = GpuContext::<SimulatedDevice>::for_tests(1024);
        let mut prims: Vec<Primitive> = (0..5)
            .map(|i| vector_line(0.0, i as f32 * 10.0, 100.0, i as f32 * 10.0))
            .collect();
        prims.push(Primitive::quad(
            Bounds::new(0.0, 0.0, 640.0, 480.0),
            Color::WHITE,
            PrimFlags::VECTORBUF,
        ));

        ctx.process_primitives(&prims, UPRIGHT, &mut NullPostProcessor, false);

        let polys = ctx.stream.as_ref().unwrap().polygons().to_vec();
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].topology, PrimitiveTopology::TriangleList);
        assert_eq!(polys[0].vertex_count, 30);
        assert_eq!(polys[0].primitive_count, 10);
        assert_eq!(polys[0].texture, None);
        assert_eq!((polys[0].quad_width, polys[0].quad_height), (640.0, 480.0));
        assert_eq!(polys[1].vertex_count, 4);

        ctx.flush(&mut NullPostProcessor, false);
        let draws = ctx.device.take_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertices.len(), 30);
    }

    #[test]
    fn interrupted_runs_batch_separately() {
        let mut ctx = GpuContext::<SimulatedDevice>::for_tests(1024);
        let plain = Primitive::line(Bounds::new(0.0, 0.0, 5.0, 5.0), 1.0, Color::WHITE, PrimFlags::empty());
        let prims = vec![
            vector_line(0.0, 0.0, 10.0, 0.0),
            vector_line(0.0, 5.0, 10.0, 5.0),
            plain,
            vector_line(0.0, 9.0, 10.0, 9.0),
        ];
        ctx.process_primitives(&prims, UPRIGHT, &mut NullPostProcessor, false);

        let counts: Vec<u32> = ctx
            .stream
            .as_ref()
            .unwrap()
            .polygons()
            .iter()
            .map(|p| p.vertex_count)
            .collect();
        assert_eq!(counts, vec![12, 4, 6]);
    }

    #[test]
    fn oversized_run_is_split_across_batches() {
        let mut ctx = GpuContext::<SimulatedDevice>::for_tests(24);
        let prims: Vec<Primitive> = (0..10).map(|i| vector_line(0.0, i as f32, 10.0, i as f32)).collect();
        ctx.process_primitives(&prims, UPRIGHT, &mut NullPostProcessor, false);
        ctx.flush(&mut NullPostProcessor, false);

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.vertices_drawn, 60);
        assert_eq!(snap.dropped_allocations, 0);
    }
}
