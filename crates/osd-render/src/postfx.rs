use crate::batch::PolygonDescriptor;
use crate::device::Device;
use crate::error::RenderError;
use crate::geometry::Vertex;
use crate::primitive::Primitive;
use crate::texture::TextureObject;

/// Number of vertices reserved at the head of each batch for the full-screen quad.
pub const FSFX_QUAD_VERTICES: u32 = 6;

/// Shader-effect chain that takes over composition when enabled.
///
/// The renderer still batches geometry, but hands every queued polygon to
/// [`PostProcessor::render_quad`] instead of drawing it, and asks for one
/// render target per screen texture and vector buffer before the frame starts.
pub trait PostProcessor<D: Device> {
    fn enabled(&self) -> bool;
    fn toggle(&mut self);

    fn create_resources(&mut self, device: &mut D) -> Result<(), RenderError>;
    fn delete_resources(&mut self);

    /// Whether a render target already exists for this screen texture.
    fn get_texture_target(&mut self, prim: &Primitive, width: u32, height: u32, screen: u32) -> bool;
    fn create_texture_target(
        &mut self,
        device: &mut D,
        prim: &Primitive,
        width: u32,
        height: u32,
        screen: u32,
    ) -> bool;
    fn get_vector_target(&mut self, prim: &Primitive, screen: u32) -> bool;
    fn create_vector_target(&mut self, device: &mut D, prim: &Primitive, screen: u32) -> bool;

    fn begin_draw(&mut self, device: &mut D);
    fn end_draw(&mut self, device: &mut D);
    fn render_quad(&mut self, device: &mut D, poly: &PolygonDescriptor, start_vertex: u32);
    /// Follows every stage 0 rebind. `None` is the default texture.
    fn set_texture(&mut self, _texture: Option<&TextureObject<D::Texture>>) {}

    /// Fills the two-triangle quad covering a `width` x `height` target.
    fn init_fsfx_quad(&self, quad: &mut [Vertex], width: f32, height: f32) {
        let (x0, y0) = (-0.5, -0.5);
        let (x1, y1) = (width - 0.5, height - 0.5);
        let corners = [
            (x0, y0, 0.0, 0.0),
            (x1, y0, 1.0, 0.0),
            (x0, y1, 0.0, 1.0),
            (x1, y0, 1.0, 0.0),
            (x1, y1, 1.0, 1.0),
            (x0, y1, 0.0, 1.0),
        ];
        for (v, (x, y, u, t)) in quad.iter_mut().zip(corners) {
            *v = Vertex {
                x,
                y,
                z: 0.0,
                rhw: 1.0,
                color: 0xffff_ffff,
                u0: u,
                v0: t,
                u1: 0.0,
                v1: 0.0,
            };
        }
    }
}

/// Stand-in used when no effect chain is configured. Never enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPostProcessor;

impl<D: Device> PostProcessor<D> for NullPostProcessor {
    fn enabled(&self) -> bool {
        false
    }

    fn toggle(&mut self) {}

    fn create_resources(&mut self, _device: &mut D) -> Result<(), RenderError> {
        Ok(())
    }

    fn delete_resources(&mut self) {}

    fn get_texture_target(&mut self, _prim: &Primitive, _width: u32, _height: u32, _screen: u32) -> bool {
        false
    }

    fn create_texture_target(
        &mut self,
        _device: &mut D,
        _prim: &Primitive,
        _width: u32,
        _height: u32,
        _screen: u32,
    ) -> bool {
        false
    }

    fn get_vector_target(&mut self, _prim: &Primitive, _screen: u32) -> bool {
        false
    }

    fn create_vector_target(&mut self, _device: &mut D, _prim: &Primitive, _screen: u32) -> bool {
        false
    }

    fn begin_draw(&mut self, _device: &mut D) {}

    fn end_draw(&mut self, _device: &mut D) {}

    fn render_quad(&mut self, _device: &mut D, _poly: &PolygonDescriptor, _start_vertex: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDevice;

    #[test]
    fn fsfx_quad_covers_target() {
        let post = NullPostProcessor;
        let mut quad = [Vertex::default(); 6];
        PostProcessor::<SimulatedDevice>::init_fsfx_quad(&post, &mut quad, 640.0, 480.0);

        assert_eq!((quad[0].x, quad[0].y), (-0.5, -0.5));
        assert_eq!((quad[4].x, quad[4].y), (639.5, 479.5));
        assert_eq!((quad[4].u0, quad[4].v0), (1.0, 1.0));
        assert!(quad.iter().all(|v| v.rhw == 1.0 && v.color == 0xffff_ffff));
        assert!(!PostProcessor::<SimulatedDevice>::enabled(&post));
    }
}
