use std::sync::{Arc, Mutex, MutexGuard};

use bitflags::bitflags;

use crate::geometry::{Bounds, Color, Vec2};

bitflags! {
    /// Per-primitive flags word.
    ///
    /// Blend mode and texture format are small enumerations packed into the
    /// masked fields; use [`PrimFlags::blend_mode`] and [`PrimFlags::tex_format`]
    /// to decode them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrimFlags: u32 {
        const TEXORIENT_MASK = 0x0000_000f;
        const BLENDMODE_MASK = 0x0000_00f0;
        const ANTIALIAS = 0x0000_0100;
        const SCREENTEX = 0x0000_0200;
        const TEXFORMAT_MASK = 0x0000_f000;
        const TEXWRAP = 0x0001_0000;
        const VECTOR = 0x0004_0000;
        const VECTORBUF = 0x0008_0000;
    }
}

const BLENDMODE_SHIFT: u32 = 4;
const TEXFORMAT_SHIFT: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    None = 0,
    Alpha = 1,
    RgbMultiply = 2,
    Add = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexFormat {
    Undefined = 0,
    Palette16 = 1,
    Rgb32 = 3,
    Argb32 = 4,
    Yuy16 = 5,
}

impl PrimFlags {
    pub fn with_blend_mode(self, mode: BlendMode) -> Self {
        let bits = (self.bits() & !Self::BLENDMODE_MASK.bits()) | ((mode as u32) << BLENDMODE_SHIFT);
        Self::from_bits_retain(bits)
    }

    pub fn with_tex_format(self, format: TexFormat) -> Self {
        let bits =
            (self.bits() & !Self::TEXFORMAT_MASK.bits()) | ((format as u32) << TEXFORMAT_SHIFT);
        Self::from_bits_retain(bits)
    }

    /// Unknown encodings decode as [`BlendMode::None`].
    pub fn blend_mode(self) -> BlendMode {
        match (self.bits() & Self::BLENDMODE_MASK.bits()) >> BLENDMODE_SHIFT {
            1 => BlendMode::Alpha,
            2 => BlendMode::RgbMultiply,
            3 => BlendMode::Add,
            _ => BlendMode::None,
        }
    }

    pub fn tex_format(self) -> TexFormat {
        match (self.bits() & Self::TEXFORMAT_MASK.bits()) >> TEXFORMAT_SHIFT {
            1 => TexFormat::Palette16,
            3 => TexFormat::Rgb32,
            4 => TexFormat::Argb32,
            5 => TexFormat::Yuy16,
            _ => TexFormat::Undefined,
        }
    }

    /// Bits that distinguish cache entries for the same pixel buffer.
    pub fn cache_class(self) -> u32 {
        self.bits() & (Self::BLENDMODE_MASK.bits() | Self::TEXFORMAT_MASK.bits())
    }

    pub fn is_screen_texture(self) -> bool {
        self.contains(Self::SCREENTEX)
    }

    pub fn is_vector(self) -> bool {
        self.contains(Self::VECTOR)
    }

    pub fn is_vector_buffer(self) -> bool {
        self.contains(Self::VECTORBUF)
    }

    pub fn wraps(self) -> bool {
        self.contains(Self::TEXWRAP)
    }
}

/// Pixel storage of an [`ImageDescriptor`].
///
/// Indexed and YUV sources are 16 bits per pixel; RGB sources are 32.
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    Bits16(Arc<[u16]>),
    Bits32(Arc<[u32]>),
}

impl PixelBuffer {
    /// Address of the first pixel. Stable for as long as the buffer is alive,
    /// which makes it usable as the cache identity.
    pub fn identity(&self) -> usize {
        match self {
            PixelBuffer::Bits16(data) => data.as_ptr() as usize,
            PixelBuffer::Bits32(data) => data.as_ptr() as usize,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Bits16(data) => data.len(),
            PixelBuffer::Bits32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source image referenced by a textured primitive.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub pixels: PixelBuffer,
    /// Row stride in pixels.
    pub row_pixels: u32,
    pub width: u32,
    pub height: u32,
    /// 0x300 entries: blue/Y lookups at 0x000, green/Cb-Cr at 0x100, red at 0x200.
    pub palette: Option<Arc<[u32]>>,
    pub seq_id: u32,
    /// Screen index in bits 57..64, page in bit 56.
    pub unique_id: u64,
}

impl ImageDescriptor {
    pub fn base(&self) -> usize {
        self.pixels.identity()
    }

    pub fn screen(&self) -> u32 {
        (self.unique_id >> 57) as u32
    }

    pub fn page(&self) -> u32 {
        ((self.unique_id >> 56) & 1) as u32
    }

    pub fn make_unique_id(screen: u32, page: u32, low: u64) -> u64 {
        ((screen as u64 & 0x7f) << 57) | ((page as u64 & 1) << 56) | (low & ((1 << 56) - 1))
    }
}

/// Texture-space corners of a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoords {
    pub tl: Vec2,
    pub tr: Vec2,
    pub bl: Vec2,
    pub br: Vec2,
}

impl Default for TexCoords {
    fn default() -> Self {
        Self {
            tl: Vec2::new(0.0, 0.0),
            tr: Vec2::new(1.0, 0.0),
            bl: Vec2::new(0.0, 1.0),
            br: Vec2::new(1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Texture {
    pub image: ImageDescriptor,
    pub coords: TexCoords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Line,
    Quad,
}

#[derive(Debug, Clone)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub bounds: Bounds,
    /// Line width; unused for quads.
    pub width: f32,
    pub color: Color,
    pub flags: PrimFlags,
    pub texture: Option<Texture>,
}

impl Primitive {
    pub fn line(bounds: Bounds, width: f32, color: Color, flags: PrimFlags) -> Self {
        Self {
            kind: PrimitiveKind::Line,
            bounds,
            width,
            color,
            flags,
            texture: None,
        }
    }

    pub fn quad(bounds: Bounds, color: Color, flags: PrimFlags) -> Self {
        Self {
            kind: PrimitiveKind::Quad,
            bounds,
            width: 0.0,
            color,
            flags,
            texture: None,
        }
    }

    pub fn with_texture(mut self, image: ImageDescriptor, coords: TexCoords) -> Self {
        self.texture = Some(Texture { image, coords });
        self
    }

    pub fn is_vector_line(&self) -> bool {
        self.kind == PrimitiveKind::Line && self.flags.is_vector()
    }

    pub fn quad_width(&self) -> f32 {
        self.bounds.width()
    }

    pub fn quad_height(&self) -> f32 {
        self.bounds.height()
    }

    /// Width of the whole target when the quad only shows part of its texture.
    pub fn full_quad_width(&self) -> f32 {
        let span = self
            .texture
            .as_ref()
            .map_or(1.0, |t| (t.coords.br.x - t.coords.tl.x).abs());
        if span > 0.0 {
            self.quad_width() / span
        } else {
            self.quad_width()
        }
    }

    pub fn full_quad_height(&self) -> f32 {
        let span = self
            .texture
            .as_ref()
            .map_or(1.0, |t| (t.coords.br.y - t.coords.tl.y).abs());
        if span > 0.0 {
            self.quad_height() / span
        } else {
            self.quad_height()
        }
    }
}

/// Primitive list shared between the producer and the render thread.
///
/// The producer replaces the contents between frames; the renderer holds the
/// lock from texture refresh until the polygon queue is built.
#[derive(Debug, Default)]
pub struct PrimitiveList {
    inner: Mutex<Vec<Primitive>>,
}

impl PrimitiveList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> MutexGuard<'_, Vec<Primitive>> {
        // A panicking producer leaves a complete list behind; keep rendering it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn replace(&self, primitives: Vec<Primitive>) {
        *self.acquire() = primitives;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_fields_round_trip() {
        let flags = PrimFlags::SCREENTEX
            .with_blend_mode(BlendMode::Add)
            .with_tex_format(TexFormat::Yuy16);
        assert_eq!(flags.blend_mode(), BlendMode::Add);
        assert_eq!(flags.tex_format(), TexFormat::Yuy16);
        assert!(flags.is_screen_texture());
        assert!(!flags.wraps());

        let flags = flags.with_blend_mode(BlendMode::None);
        assert_eq!(flags.blend_mode(), BlendMode::None);
        assert_eq!(flags.tex_format(), TexFormat::Yuy16);
    }

    #[test]
    fn cache_class_ignores_unrelated_bits() {
        let a = PrimFlags::empty().with_blend_mode(BlendMode::Alpha);
        let b = (PrimFlags::SCREENTEX | PrimFlags::TEXWRAP).with_blend_mode(BlendMode::Alpha);
        assert_eq!(a.cache_class(), b.cache_class());
    }

    #[test]
    fn unique_id_encodes_screen_and_page() {
        let id = ImageDescriptor::make_unique_id(5, 1, 1234);
        let image = ImageDescriptor {
            pixels: PixelBuffer::Bits32(Arc::from(vec![0u32; 4])),
            row_pixels: 2,
            width: 2,
            height: 2,
            palette: None,
            seq_id: 0,
            unique_id: id,
        };
        assert_eq!(image.screen(), 5);
        assert_eq!(image.page(), 1);
    }

    #[test]
    fn full_quad_size_accounts_for_partial_texture() {
        let image = ImageDescriptor {
            pixels: PixelBuffer::Bits32(Arc::from(vec![0u32; 4])),
            row_pixels: 2,
            width: 2,
            height: 2,
            palette: None,
            seq_id: 0,
            unique_id: 0,
        };
        let coords = TexCoords {
            tl: Vec2::new(0.0, 0.0),
            tr: Vec2::new(0.5, 0.0),
            bl: Vec2::new(0.0, 0.25),
            br: Vec2::new(0.5, 0.25),
        };
        let prim = Primitive::quad(Bounds::new(0.0, 0.0, 100.0, 50.0), Color::WHITE, PrimFlags::VECTORBUF)
            .with_texture(image, coords);
        assert_eq!(prim.full_quad_width(), 200.0);
        assert_eq!(prim.full_quad_height(), 200.0);
    }
}
