//! Polygon batching.
//!
//! Primitives are expanded into vertices inside a CPU staging copy of the
//! vertex buffer and described by [`PolygonDescriptor`]s. The buffer is locked
//! by the first allocation of a batch and unlocked by [`GpuContext::flush`],
//! which replays the descriptors as draw calls. An allocation that does not
//! fit forces a flush and starts a new batch.

use crate::context::GpuContext;
use crate::device::{
    AddressMode, Device, DeviceResult, Filter, PrimitiveTopology, TextureOp, VertexFormat,
};
use crate::error::log_failure;
use crate::geometry::{line_to_quad, Vec2, Vertex};
use crate::postfx::{PostProcessor, FSFX_QUAD_VERTICES};
use crate::primitive::{BlendMode, PrimFlags, Primitive};
use crate::texture::TextureSlot;

/// One queued draw: a contiguous run of vertices sharing texture and blend state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonDescriptor {
    pub topology: PrimitiveTopology,
    pub primitive_count: u32,
    pub vertex_count: u32,
    pub flags: PrimFlags,
    /// `None` for untextured geometry, which samples the default texture
    /// without touching filter, wrap or modulation state.
    pub texture: Option<TextureSlot>,
    pub modulation: TextureOp,
    /// Size of the quad the polygon belongs to, for the post-processing chain.
    pub quad_width: f32,
    pub quad_height: f32,
}

/// The device vertex buffer together with the batch being built in it.
pub struct VertexStream<D: Device> {
    buffer: D::VertexBuffer,
    capacity: u32,
    format: VertexFormat,
    staging: Vec<Vertex>,
    locked: bool,
    polys: Vec<PolygonDescriptor>,
}

impl<D: Device> VertexStream<D> {
    pub(crate) fn new(device: &mut D, capacity: u32, format: VertexFormat) -> DeviceResult<Self> {
        let buffer = device.create_vertex_buffer(capacity, format)?;
        Ok(Self {
            buffer,
            capacity,
            format,
            staging: Vec::with_capacity(capacity as usize),
            locked: false,
            polys: Vec::new(),
        })
    }

    pub fn buffer(&self) -> &D::VertexBuffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn format(&self) -> VertexFormat {
        self.format
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Vertices allocated in the current batch.
    pub fn vertex_count(&self) -> u32 {
        self.staging.len() as u32
    }

    pub fn polygons(&self) -> &[PolygonDescriptor] {
        &self.polys
    }
}

impl<D: Device> GpuContext<D> {
    /// Reserves `count` vertices in the current batch, flushing first when
    /// they would not fit. Returns `None` when nothing could be reserved.
    pub(crate) fn mesh_alloc(
        &mut self,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
        count: u32,
    ) -> Option<&mut [Vertex]> {
        let Some(stream) = self.stream.as_ref() else {
            self.stats.inc_dropped_allocations();
            return None;
        };
        if count > stream.capacity {
            tracing::debug!(count, capacity = stream.capacity, "vertex request larger than buffer");
            self.stats.inc_dropped_allocations();
            return None;
        }

        if stream.locked && stream.vertex_count() + count > stream.capacity {
            self.stats.inc_implicit_flushes();
            self.flush(postfx, postfx_enabled);
            if postfx_enabled {
                self.init_fsfx_quad(postfx);
            }
        }

        let stream = self.stream.as_mut()?;
        if !stream.locked {
            if let Err(err) = self.device.lock_vertex_buffer(&stream.buffer) {
                tracing::debug!(error = %err, "vertex buffer lock failed");
                self.stats.inc_device_call_failures();
                self.stats.inc_dropped_allocations();
                return None;
            }
            stream.locked = true;
            stream.staging.clear();
        }

        let start = stream.staging.len();
        if start + count as usize > stream.capacity as usize {
            self.stats.inc_dropped_allocations();
            return None;
        }
        stream.staging.resize(start + count as usize, Vertex::default());
        Some(&mut stream.staging[start..])
    }

    pub(crate) fn queue_polygon(&mut self, poly: PolygonDescriptor) {
        if let Some(stream) = self.stream.as_mut() {
            stream.polys.push(poly);
        }
    }

    /// Reserves and fills the quad the post-processing chain draws each pass with.
    pub(crate) fn init_fsfx_quad(&mut self, postfx: &mut dyn PostProcessor<D>) {
        let width = self.params.back_buffer_width as f32;
        let height = self.params.back_buffer_height as f32;
        // Nested allocations never need to flush: the batch was just emptied.
        if let Some(quad) = self.mesh_alloc(postfx, true, FSFX_QUAD_VERTICES) {
            postfx.init_fsfx_quad(quad, width, height);
        }
    }

    /// Unlocks the vertex buffer and draws every queued polygon in order.
    pub(crate) fn flush(&mut self, postfx: &mut dyn PostProcessor<D>, postfx_enabled: bool) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if !stream.locked {
            return;
        }

        stream.locked = false;
        if !log_failure(
            self.device.unlock_vertex_buffer(&stream.buffer, &stream.staging),
            "UnlockVertexBuffer",
        ) {
            self.stats.inc_device_call_failures();
        }
        log_failure(self.device.set_stream_source(&stream.buffer), "SetStreamSource");

        postfx.begin_draw(&mut self.device);

        let total = stream.staging.len() as u32;
        let mut vertnum = if postfx_enabled { FSFX_QUAD_VERTICES } else { 0 };
        for poly in &stream.polys {
            let bound = match poly.texture {
                Some(TextureSlot::Cached(key)) => self.textures.get(key).map(|entry| (Some(key), entry)),
                _ => None,
            }
            .or_else(|| self.textures.default_texture().map(|entry| (None, entry)));
            if let Some((key, entry)) = bound {
                if self.state.set_texture(&mut self.device, key, entry.final_texture()) {
                    postfx.set_texture(key.map(|_| entry));
                }
            }

            if poly.texture.is_some() {
                let filter = if poly.flags.is_screen_texture() && self.filter {
                    Filter::Linear
                } else {
                    Filter::Point
                };
                self.state.set_filter(&mut self.device, filter);
                let wrap = if poly.flags.wraps() {
                    AddressMode::Wrap
                } else {
                    AddressMode::Clamp
                };
                self.state.set_wrap(&mut self.device, wrap);
                self.state.set_modulation(&mut self.device, poly.modulation);
            }

            if vertnum + poly.vertex_count > total {
                tracing::error!(
                    vertnum,
                    count = poly.vertex_count,
                    total,
                    "polygon runs past the committed vertices; dropping the rest of the batch"
                );
                break;
            }

            if postfx_enabled {
                self.state.set_blend_mode(&mut self.device, BlendMode::None);
                postfx.render_quad(&mut self.device, poly, vertnum);
            } else {
                self.state.set_blend_mode(&mut self.device, poly.flags.blend_mode());
                let result =
                    self.device
                        .draw_primitive(poly.topology, vertnum, poly.primitive_count);
                if log_failure(result, "DrawPrimitive") {
                    self.stats.add_draw(poly.vertex_count as u64);
                } else {
                    self.stats.inc_device_call_failures();
                }
            }
            vertnum += poly.vertex_count;
        }

        postfx.end_draw(&mut self.device);

        stream.polys.clear();
        stream.staging.clear();
    }

    /// Emits a two-triangle strip for a quad, sampling its cached texture or the default one.
    pub(crate) fn draw_quad(
        &mut self,
        prim: &Primitive,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) {
        let slot = prim
            .texture
            .as_ref()
            .and_then(|texture| self.textures.find(&texture.image, prim.flags))
            .map_or(TextureSlot::Default, TextureSlot::Cached);
        let (start, stop) = self
            .textures
            .resolve(slot)
            .map_or((Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)), |entry| {
                (entry.uv_start(), entry.uv_stop())
            });
        let coords = prim.texture.as_ref().map(|t| t.coords).unwrap_or_default();
        let color = prim.color.to_argb();
        let bounds = prim.bounds;

        let Some(verts) = self.mesh_alloc(postfx, postfx_enabled, 4) else {
            return;
        };

        let span = stop - start;
        let uv = |c: Vec2| (start.x + span.x * c.x, start.y + span.y * c.y);
        let corners = [
            (bounds.x0, bounds.y0, uv(coords.tl)),
            (bounds.x1, bounds.y0, uv(coords.tr)),
            (bounds.x0, bounds.y1, uv(coords.bl)),
            (bounds.x1, bounds.y1, uv(coords.br)),
        ];
        for (vertex, (x, y, (u, v))) in verts.iter_mut().zip(corners) {
            *vertex = Vertex {
                x: x - 0.5,
                y: y - 0.5,
                z: 0.0,
                rhw: 1.0,
                color,
                u0: u,
                v0: v,
                u1: 0.0,
                v1: 0.0,
            };
        }

        self.queue_polygon(PolygonDescriptor {
            topology: PrimitiveTopology::TriangleStrip,
            primitive_count: 2,
            vertex_count: 4,
            flags: prim.flags,
            texture: Some(slot),
            modulation: TextureOp::Modulate,
            quad_width: prim.quad_width(),
            quad_height: prim.quad_height(),
        });
    }

    /// Emits a non-vector line as a two-triangle strip at least one pixel wide.
    pub(crate) fn draw_line(
        &mut self,
        prim: &Primitive,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) {
        let width = prim.width.max(1.0);
        let (b0, b1) = line_to_quad(&prim.bounds, width, 0.0);
        let (start, stop) = self.default_uv();
        let color = prim.color.to_argb();

        let Some(verts) = self.mesh_alloc(postfx, postfx_enabled, 4) else {
            return;
        };

        let corners = [
            (b0.x0, b0.y0, start.x, start.y),
            (b0.x1, b0.y1, start.x, stop.y),
            (b1.x0, b1.y0, stop.x, start.y),
            (b1.x1, b1.y1, stop.x, stop.y),
        ];
        for (vertex, (x, y, u, v)) in verts.iter_mut().zip(corners) {
            *vertex = Vertex {
                x,
                y,
                z: 0.0,
                rhw: 1.0,
                color,
                u0: u,
                v0: v,
                u1: 0.0,
                v1: 0.0,
            };
        }

        self.queue_polygon(PolygonDescriptor {
            topology: PrimitiveTopology::TriangleStrip,
            primitive_count: 2,
            vertex_count: 4,
            flags: prim.flags,
            texture: None,
            modulation: TextureOp::Modulate,
            quad_width: 0.0,
            quad_height: 0.0,
        });
    }

    pub(crate) fn default_uv(&self) -> (Vec2, Vec2) {
        self.textures
            .default_texture()
            .map_or((Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)), |entry| {
                (entry.uv_start(), entry.uv_stop())
            })
    }
}
