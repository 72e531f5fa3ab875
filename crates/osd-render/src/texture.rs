//! Texture object cache.
//!
//! Every textured primitive maps to one cache entry, keyed by the identity of
//! its pixel buffer together with the screen, page and format class packed
//! into its flags and unique id. Entries are uploaded on creation and
//! re-uploaded when the producer bumps the image's sequence id. Screen
//! textures may carry a second, larger render target that the source is
//! blitted into ("prescale").

use std::sync::Arc;

use hashbrown::HashMap;

use crate::batch::VertexStream;
use crate::context::GpuContext;
use crate::convert;
use crate::device::{
    Device, DeviceTexture, Filter, PrimitiveTopology, TextureDesc, TextureFormat,
    TextureUsage,
};
use crate::error::{log_failure, DeviceError, RenderError};
use crate::geometry::{Vec2, Vertex};
use crate::postfx::PostProcessor;
use crate::primitive::{
    BlendMode, ImageDescriptor, PixelBuffer, PrimFlags, Primitive, TexFormat,
};
use crate::state::StateCache;
use crate::stats::RenderStats;

/// Handle to a cache entry. Keys from before the last [`TextureCache::clear`] never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    generation: u32,
    index: u32,
}

/// Texture a polygon samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// The 8x8 white texture used by untextured quads, lines and vectors.
    Default,
    Cached(TextureKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// Largest allowed ratio between the longer and the shorter side.
    pub max_aspect: u32,
}

/// Allocation size of a texture and where the image sits inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureLayout {
    pub raw_width: u32,
    pub raw_height: u32,
    pub xborder: u32,
    pub yborder: u32,
    pub uv_start: Vec2,
    pub uv_stop: Vec2,
}

impl TextureLayout {
    pub fn exceeds(&self, limits: &TextureLimits) -> bool {
        self.raw_width > limits.max_width || self.raw_height > limits.max_height
    }
}

fn fit_aspect(width: u32, height: u32, max_aspect: u32) -> (u32, u32) {
    let (mut w, mut h) = (width, height);
    if w == 0 || h == 0 {
        return (w, h);
    }
    while w < h && h / w > max_aspect {
        w *= 2;
    }
    while h < w && w / h > max_aspect {
        h *= 2;
    }
    (w, h)
}

/// Computes the allocation for a `width` x `height` image.
///
/// Without post-processing, non-wrapping textures get a replicated border
/// (two pixels wide horizontally for packed YUV) so bilinear sampling at the
/// edges stays inside the image. The border is dropped again if it alone
/// pushes the size past the device maximum. With post-processing the size is
/// taken as given.
pub fn compute_size(
    width: u32,
    height: u32,
    flags: PrimFlags,
    postfx_enabled: bool,
    limits: &TextureLimits,
) -> TextureLayout {
    let (mut xborder, mut yborder) = (0, 0);
    if !postfx_enabled && !flags.wraps() {
        xborder = if flags.tex_format() == TexFormat::Yuy16 {
            2
        } else {
            1
        };
        yborder = 1;
    }

    let (mut raw_width, mut raw_height) = (width + 2 * xborder, height + 2 * yborder);
    if !postfx_enabled {
        (raw_width, raw_height) = fit_aspect(raw_width, raw_height, limits.max_aspect);
        if raw_width > limits.max_width || raw_height > limits.max_height {
            xborder = 0;
            yborder = 0;
            (raw_width, raw_height) = fit_aspect(width, height, limits.max_aspect);
        }
    }

    let (fw, fh) = (raw_width.max(1) as f32, raw_height.max(1) as f32);
    TextureLayout {
        raw_width,
        raw_height,
        xborder,
        yborder,
        uv_start: Vec2::new(xborder as f32 / fw, yborder as f32 / fh),
        uv_stop: Vec2::new((width + xborder) as f32 / fw, (height + yborder) as f32 / fh),
    }
}

/// Largest prescale not above `requested` that keeps `raw * prescale` under
/// twice the screen size and within the texture limit. Halves on each step.
pub fn fit_prescale(raw: u32, requested: u32, max_screen_dim: u32, max_texture_dim: u32) -> u32 {
    let mut prescale = requested.max(1);
    while prescale > 1 {
        let scaled = raw as u64 * prescale as u64;
        if scaled < 2 * max_screen_dim as u64 && scaled <= max_texture_dim as u64 {
            break;
        }
        prescale /= 2;
    }
    prescale
}

/// One cached image and its GPU surfaces.
#[derive(Debug)]
pub struct TextureObject<T> {
    hash: u32,
    flags: PrimFlags,
    /// Holding the descriptor keeps the pixel buffer, and so its identity, alive.
    image: ImageDescriptor,
    layout: TextureLayout,
    xprescale: u32,
    yprescale: u32,
    source: T,
    /// Prescaled render target; `None` when the source is drawn directly.
    target: Option<T>,
}

impl<T> TextureObject<T> {
    pub fn final_texture(&self) -> &T {
        self.target.as_ref().unwrap_or(&self.source)
    }

    pub fn source_texture(&self) -> &T {
        &self.source
    }

    pub fn layout(&self) -> &TextureLayout {
        &self.layout
    }

    pub fn uv_start(&self) -> Vec2 {
        self.layout.uv_start
    }

    pub fn uv_stop(&self) -> Vec2 {
        self.layout.uv_stop
    }

    pub fn prescale(&self) -> (u32, u32) {
        (self.xprescale, self.yprescale)
    }

    pub fn seq_id(&self) -> u32 {
        self.image.seq_id
    }

    pub fn flags(&self) -> PrimFlags {
        self.flags
    }

    fn matches(&self, image: &ImageDescriptor, flags: PrimFlags, hash: u32) -> bool {
        if self.image.screen() != image.screen() || self.image.page() != image.page() {
            return false;
        }
        self.hash == hash
            && self.image.base() == image.base()
            && self.image.width == image.width
            && self.image.height == image.height
            && self.flags.cache_class() == flags.cache_class()
    }
}

pub fn compute_hash(image: &ImageDescriptor, flags: PrimFlags) -> u32 {
    (image.base() as u32) ^ flags.cache_class()
}

#[derive(Debug)]
pub struct TextureCache<T> {
    entries: Vec<TextureObject<T>>,
    /// Entry indices per hash, in insertion order.
    buckets: HashMap<u32, Vec<u32>>,
    default: Option<TextureObject<T>>,
    generation: u32,
    warned_too_big: bool,
    warned_alloc_failure: bool,
}

impl<T> Default for TextureCache<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            buckets: HashMap::new(),
            default: None,
            generation: 0,
            warned_too_big: false,
            warned_alloc_failure: false,
        }
    }
}

impl<T> TextureCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry matching `image` and the format class of `flags`.
    pub fn find(&self, image: &ImageDescriptor, flags: PrimFlags) -> Option<TextureKey> {
        let hash = compute_hash(image, flags);
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&index| self.entries[index as usize].matches(image, flags, hash))
            .map(|index| TextureKey {
                generation: self.generation,
                index,
            })
    }

    pub fn get(&self, key: TextureKey) -> Option<&TextureObject<T>> {
        if key.generation != self.generation {
            return None;
        }
        self.entries.get(key.index as usize)
    }

    fn get_mut(&mut self, key: TextureKey) -> Option<&mut TextureObject<T>> {
        if key.generation != self.generation {
            return None;
        }
        self.entries.get_mut(key.index as usize)
    }

    pub fn default_texture(&self) -> Option<&TextureObject<T>> {
        self.default.as_ref()
    }

    pub fn resolve(&self, slot: TextureSlot) -> Option<&TextureObject<T>> {
        match slot {
            TextureSlot::Default => self.default_texture(),
            TextureSlot::Cached(key) => self.get(key),
        }
    }

    fn insert(&mut self, object: TextureObject<T>) -> TextureKey {
        let index = self.entries.len() as u32;
        self.buckets.entry(object.hash).or_default().push(index);
        self.entries.push(object);
        TextureKey {
            generation: self.generation,
            index,
        }
    }

    /// Releases every entry, including the default texture.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
        self.default = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Outcome of [`GpuContext::update_textures`] the caller folds into its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureRefresh {
    pub disable_post_fx: bool,
}

/// Converted pixels ready for `write_texture`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadData {
    Bits16(Vec<u16>),
    Bits32(Vec<u32>),
}

impl UploadData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UploadData::Bits16(data) => bytemuck::cast_slice(data),
            UploadData::Bits32(data) => bytemuck::cast_slice(data),
        }
    }
}

/// Converts rows into `dst`, clamping source rows at the top and bottom and
/// replicating the first and last converted columns into the side borders.
fn fill_rows<S: Copy, P: Copy>(
    dst: &mut [P],
    src: &[S],
    image: &ImageDescriptor,
    layout: &TextureLayout,
    convert: impl Fn(&mut [P], &[S]),
) {
    let (width, height) = (image.width as usize, image.height as usize);
    if width == 0 || height == 0 {
        return;
    }
    let raw_width = layout.raw_width as usize;
    let (xborder, yborder) = (layout.xborder as usize, layout.yborder as usize);
    let stride = image.row_pixels as usize;

    for row_index in 0..height + 2 * yborder {
        let srcy = row_index.saturating_sub(yborder).min(height - 1);
        let Some(src_row) = src.get(srcy * stride..srcy * stride + width) else {
            continue;
        };
        let start = row_index * raw_width;
        let Some(row) = dst.get_mut(start..start + width + 2 * xborder) else {
            break;
        };

        convert(&mut row[xborder..xborder + width], src_row);
        if xborder > 0 {
            let n = xborder.min(width);
            row.copy_within(xborder..xborder + n, 0);
            row.copy_within(xborder + width - n..xborder + width, xborder + width);
        }
    }
}

/// Converts `image` into the upload layout of a `format` texture.
///
/// Returns `None` when the pixel storage does not match the declared format.
pub fn build_upload(
    image: &ImageDescriptor,
    tex_format: TexFormat,
    layout: &TextureLayout,
    format: TextureFormat,
) -> Option<UploadData> {
    let len = layout.raw_width as usize * layout.raw_height as usize;
    let palette = image.palette.as_deref();

    match (tex_format, &image.pixels) {
        (TexFormat::Palette16, PixelBuffer::Bits16(src)) => {
            let palette = palette.unwrap_or(&[]);
            let mut dst = vec![0u32; len];
            fill_rows(&mut dst, src, image, layout, |d, s| {
                convert::palette16_to_argb(d, s, palette)
            });
            Some(UploadData::Bits32(dst))
        }
        (TexFormat::Rgb32, PixelBuffer::Bits32(src)) => {
            let mut dst = vec![0u32; len];
            fill_rows(&mut dst, src, image, layout, |d, s| {
                convert::rgb32_to_argb(d, s, palette)
            });
            Some(UploadData::Bits32(dst))
        }
        (TexFormat::Argb32, PixelBuffer::Bits32(src)) => {
            let mut dst = vec![0u32; len];
            fill_rows(&mut dst, src, image, layout, |d, s| {
                convert::argb32_to_argb(d, s, palette)
            });
            Some(UploadData::Bits32(dst))
        }
        (TexFormat::Yuy16, PixelBuffer::Bits16(src)) => match format {
            TextureFormat::Uyvy => {
                let mut dst = vec![0u16; len];
                fill_rows(&mut dst, src, image, layout, |d, s| {
                    convert::yuy16_to_uyvy(d, s, palette)
                });
                Some(UploadData::Bits16(dst))
            }
            TextureFormat::Yuy2 => {
                let mut dst = vec![0u16; len];
                fill_rows(&mut dst, src, image, layout, |d, s| {
                    convert::yuy16_to_yuy2(d, s, palette)
                });
                Some(UploadData::Bits16(dst))
            }
            _ => {
                let mut dst = vec![0u32; len];
                fill_rows(&mut dst, src, image, layout, |d, s| {
                    convert::yuy16_to_argb(d, s, palette)
                });
                Some(UploadData::Bits32(dst))
            }
        },
        _ => None,
    }
}

/// Writes `image` into the object's source texture, then refreshes the
/// prescaled target if there is one.
fn refresh_contents<D: Device>(
    device: &mut D,
    stream: Option<&VertexStream<D>>,
    state: &mut StateCache,
    stats: &RenderStats,
    object: &TextureObject<D::Texture>,
    image: &ImageDescriptor,
) {
    let desc = object.source.desc();
    let Some(upload) = build_upload(image, object.flags.tex_format(), &object.layout, desc.format)
    else {
        tracing::debug!(
            format = ?object.flags.tex_format(),
            "pixel storage does not match texture format; skipping upload"
        );
        return;
    };

    let pitch = object.layout.raw_width * desc.format.bytes_per_pixel();
    if !log_failure(
        device.write_texture(&object.source, upload.as_bytes(), pitch),
        "WriteTexture",
    ) {
        stats.inc_device_call_failures();
        return;
    }
    stats.inc_textures_updated();

    if let Some(target) = &object.target {
        match stream {
            Some(stream) if !stream.is_locked() => {
                prescale_blit(device, stream, state, object, target);
                stats.inc_prescale_blits();
            }
            _ => tracing::debug!("vertex buffer unavailable; prescale target left stale"),
        }
    }
}

/// Point-samples the source texture into the prescaled render target.
fn prescale_blit<D: Device>(
    device: &mut D,
    stream: &VertexStream<D>,
    state: &mut StateCache,
    object: &TextureObject<D::Texture>,
    target: &D::Texture,
) {
    let saved = device.render_target();
    log_failure(device.set_render_target(Some(target)), "SetRenderTarget");
    state.invalidate_all();

    log_failure(device.begin_scene(), "BeginScene");
    state.set_filter(device, Filter::Point);
    state.set_blend_mode(device, BlendMode::None);
    log_failure(device.set_texture(0, Some(&object.source)), "SetTexture");

    let layout = &object.layout;
    let image_width = (object.image.width + 2 * layout.xborder) as f32;
    let image_height = (object.image.height + 2 * layout.yborder) as f32;
    let x1 = image_width * object.xprescale as f32 - 0.5;
    let y1 = image_height * object.yprescale as f32 - 0.5;
    let u1 = image_width / layout.raw_width as f32;
    let v1 = image_height / layout.raw_height as f32;

    let corner = |x: f32, y: f32, u0: f32, v0: f32| Vertex {
        x,
        y,
        z: 0.0,
        rhw: 1.0,
        color: 0xffff_ffff,
        u0,
        v0,
        u1: 0.0,
        v1: 0.0,
    };
    let quad = [
        corner(-0.5, -0.5, 0.0, 0.0),
        corner(x1, -0.5, u1, 0.0),
        corner(-0.5, y1, 0.0, v1),
        corner(x1, y1, u1, v1),
    ];

    if log_failure(device.lock_vertex_buffer(stream.buffer()), "LockVertexBuffer") {
        log_failure(
            device.unlock_vertex_buffer(stream.buffer(), &quad),
            "UnlockVertexBuffer",
        );
        log_failure(device.set_stream_source(stream.buffer()), "SetStreamSource");
        log_failure(
            device.draw_primitive(PrimitiveTopology::TriangleStrip, 0, 2),
            "DrawPrimitive",
        );
    }
    log_failure(device.end_scene(), "EndScene");

    if !log_failure(device.restore_render_target(saved), "SetRenderTarget") {
        log_failure(device.set_render_target(None), "SetRenderTarget");
    }
    state.invalidate_all();
}

fn default_image() -> ImageDescriptor {
    ImageDescriptor {
        pixels: PixelBuffer::Bits32(Arc::from(vec![0xffff_ffffu32; 64])),
        row_pixels: 8,
        width: 8,
        height: 8,
        palette: None,
        seq_id: 0,
        unique_id: !0,
    }
}

impl<D: Device> GpuContext<D> {
    fn texture_allocation_error(
        width: u32,
        height: u32,
        source: DeviceError,
    ) -> RenderError {
        RenderError::TextureAllocation {
            width,
            height,
            source,
        }
    }

    /// Allocates the surfaces for a new cache entry. Contents are not uploaded.
    pub(crate) fn allocate_texture_object(
        &mut self,
        image: &ImageDescriptor,
        flags: PrimFlags,
        prescale: u32,
        postfx_enabled: bool,
    ) -> Result<TextureObject<D::Texture>, RenderError> {
        let layout = compute_size(image.width, image.height, flags, postfx_enabled, &self.limits);
        if layout.exceeds(&self.limits) && !self.textures.warned_too_big {
            tracing::warn!(
                wanted_width = layout.raw_width,
                wanted_height = layout.raw_height,
                max_width = self.limits.max_width,
                max_height = self.limits.max_height,
                "texture too big"
            );
            self.textures.warned_too_big = true;
        }

        let object = |source, target, xprescale, yprescale| TextureObject {
            hash: compute_hash(image, flags),
            flags,
            image: image.clone(),
            layout,
            xprescale,
            yprescale,
            source,
            target,
        };

        if !flags.is_screen_texture() {
            let desc = TextureDesc {
                width: layout.raw_width,
                height: layout.raw_height,
                format: TextureFormat::A8R8G8B8,
                usage: TextureUsage::Dynamic,
            };
            let source = self.device.create_texture(&desc).map_err(|err| {
                Self::texture_allocation_error(desc.width, desc.height, err)
            })?;
            self.stats.inc_textures_created();
            return Ok(object(source, None, 1, 1));
        }

        let format = match flags.tex_format() {
            TexFormat::Yuy16 => self.formats.yuv,
            TexFormat::Argb32 => TextureFormat::A8R8G8B8,
            _ => self.formats.screen,
        };
        let max_screen_dim = self.params.back_buffer_width.max(self.params.back_buffer_height);
        let mut xprescale =
            fit_prescale(layout.raw_width, prescale, max_screen_dim, self.limits.max_width);
        let mut yprescale =
            fit_prescale(layout.raw_height, prescale, max_screen_dim, self.limits.max_height);
        if xprescale != prescale || yprescale != prescale {
            tracing::debug!(
                requested = prescale,
                xprescale,
                yprescale,
                "adjusting prescale"
            );
        }

        let source_desc = TextureDesc {
            width: layout.raw_width,
            height: layout.raw_height,
            format,
            usage: TextureUsage::Dynamic,
        };
        let mut last_error = None;
        for attempt in 0..2 {
            // The second attempt is always 1:1.
            if attempt == 1 {
                xprescale = 1;
                yprescale = 1;
            }

            let source = match self.device.create_texture(&source_desc) {
                Ok(source) => source,
                Err(err) => {
                    last_error = Some(Self::texture_allocation_error(
                        source_desc.width,
                        source_desc.height,
                        err,
                    ));
                    continue;
                }
            };
            if xprescale == 1 && yprescale == 1 {
                self.stats.inc_textures_created();
                return Ok(object(source, None, 1, 1));
            }

            // Render targets cannot be YCbCr.
            let target_desc = TextureDesc {
                width: layout.raw_width * xprescale,
                height: layout.raw_height * yprescale,
                format: if format.is_yuv() {
                    TextureFormat::A8R8G8B8
                } else {
                    format
                },
                usage: TextureUsage::RenderTarget,
            };
            match self.device.create_texture(&target_desc) {
                Ok(target) => {
                    self.stats.inc_textures_created();
                    return Ok(object(source, Some(target), xprescale, yprescale));
                }
                Err(err) => {
                    tracing::debug!(
                        width = target_desc.width,
                        height = target_desc.height,
                        error = %err,
                        "prescale target allocation failed; retrying at 1:1"
                    );
                    last_error = Some(Self::texture_allocation_error(
                        target_desc.width,
                        target_desc.height,
                        err,
                    ));
                }
            }
        }

        Err(last_error.unwrap_or(Self::texture_allocation_error(
            source_desc.width,
            source_desc.height,
            DeviceError::OutOfVideoMemory,
        )))
    }

    /// Looks up or creates the entry for `image` and uploads its contents.
    pub(crate) fn upsert_texture(
        &mut self,
        image: &ImageDescriptor,
        flags: PrimFlags,
        prescale: u32,
        postfx_enabled: bool,
    ) -> Result<TextureKey, RenderError> {
        if let Some(key) = self.textures.find(image, flags) {
            let stale = self
                .textures
                .get(key)
                .is_some_and(|entry| entry.image.seq_id != image.seq_id);
            if stale {
                if let Some(entry) = self.textures.get(key) {
                    refresh_contents(
                        &mut self.device,
                        self.stream.as_ref(),
                        &mut self.state,
                        &self.stats,
                        entry,
                        image,
                    );
                }
                if let Some(entry) = self.textures.get_mut(key) {
                    entry.image.seq_id = image.seq_id;
                }
            }
            return Ok(key);
        }

        let object = self.allocate_texture_object(image, flags, prescale, postfx_enabled)?;
        refresh_contents(
            &mut self.device,
            self.stream.as_ref(),
            &mut self.state,
            &self.stats,
            &object,
            image,
        );
        tracing::debug!(
            width = image.width,
            height = image.height,
            raw_width = object.layout.raw_width,
            raw_height = object.layout.raw_height,
            screen = flags.is_screen_texture(),
            "texture created"
        );
        Ok(self.textures.insert(object))
    }

    /// Brings the cache up to date with the frame's primitives and makes sure
    /// the post-processing chain has a target for every screen and vector buffer.
    pub(crate) fn update_textures(
        &mut self,
        prims: &[Primitive],
        window_prescale: u32,
        postfx: &mut dyn PostProcessor<D>,
        postfx_enabled: bool,
    ) -> TextureRefresh {
        let mut refresh = TextureRefresh::default();
        let prescale = if postfx_enabled { 1 } else { window_prescale };

        for prim in prims {
            let Some(texture) = &prim.texture else {
                continue;
            };
            if let Err(err) = self.upsert_texture(&texture.image, prim.flags, prescale, postfx_enabled)
            {
                if !self.textures.warned_alloc_failure {
                    tracing::error!(error = %err, "texture allocation failed; expect degraded output");
                    self.textures.warned_alloc_failure = true;
                }
                refresh.disable_post_fx = true;
            }
        }

        if !postfx_enabled || refresh.disable_post_fx {
            return refresh;
        }

        let mut screen = 0;
        for prim in prims {
            let (width, height) = prim
                .texture
                .as_ref()
                .map_or((0, 0), |t| (t.image.width, t.image.height));
            if prim.flags.is_screen_texture() {
                if !postfx.get_texture_target(prim, width, height, screen)
                    && !postfx.create_texture_target(&mut self.device, prim, width, height, screen)
                {
                    tracing::warn!(screen, "screen render target creation failed; disabling post-processing");
                    refresh.disable_post_fx = true;
                    break;
                }
                screen += 1;
            } else if prim.flags.is_vector_buffer() {
                if !postfx.get_vector_target(prim, screen)
                    && !postfx.create_vector_target(&mut self.device, prim, screen)
                {
                    tracing::warn!(screen, "vector render target creation failed; disabling post-processing");
                    refresh.disable_post_fx = true;
                    break;
                }
                screen += 1;
            }
        }
        refresh
    }

    /// Creates the 8x8 opaque white texture used for untextured geometry.
    pub(crate) fn create_default_texture(
        &mut self,
        prescale: u32,
        postfx_enabled: bool,
    ) -> Result<(), RenderError> {
        let image = default_image();
        let flags = PrimFlags::empty()
            .with_blend_mode(BlendMode::Alpha)
            .with_tex_format(TexFormat::Argb32);
        let object = self.allocate_texture_object(&image, flags, prescale, postfx_enabled)?;
        refresh_contents(
            &mut self.device,
            self.stream.as_ref(),
            &mut self.state,
            &self.stats,
            &object,
            &image,
        );
        self.textures.default = Some(object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::{RenderTargetId, SamplerState};
    use crate::primitive::BlendMode;
    use crate::sim::DeviceCall;

    const LIMITS: TextureLimits = TextureLimits {
        max_width: 4096,
        max_height: 4096,
        max_aspect: 8,
    };

    fn image16(width: u32, height: u32, pixels: Vec<u16>) -> ImageDescriptor {
        ImageDescriptor {
            pixels: PixelBuffer::Bits16(Arc::from(pixels)),
            row_pixels: width,
            width,
            height,
            palette: None,
            seq_id: 0,
            unique_id: 0,
        }
    }

    #[test]
    fn border_is_added_without_postfx() {
        let flags = PrimFlags::empty().with_tex_format(TexFormat::Rgb32);
        let layout = compute_size(64, 32, flags, false, &LIMITS);
        assert_eq!((layout.raw_width, layout.raw_height), (66, 34));
        assert_eq!((layout.xborder, layout.yborder), (1, 1));
        assert_eq!(layout.uv_start, Vec2::new(1.0 / 66.0, 1.0 / 34.0));
        assert_eq!(layout.uv_stop, Vec2::new(65.0 / 66.0, 33.0 / 34.0));
    }

    #[test]
    fn yuy_gets_wider_border_and_wrap_gets_none() {
        let yuy = PrimFlags::empty().with_tex_format(TexFormat::Yuy16);
        assert_eq!(compute_size(64, 32, yuy, false, &LIMITS).xborder, 2);

        let wrapped = PrimFlags::TEXWRAP.with_tex_format(TexFormat::Rgb32);
        let layout = compute_size(64, 32, wrapped, false, &LIMITS);
        assert_eq!((layout.raw_width, layout.raw_height), (64, 32));
    }

    #[test]
    fn postfx_takes_size_as_given() {
        let flags = PrimFlags::empty().with_tex_format(TexFormat::Rgb32);
        let layout = compute_size(1000, 10, flags, true, &LIMITS);
        assert_eq!((layout.raw_width, layout.raw_height), (1000, 10));
        assert_eq!(layout.uv_start, Vec2::new(0.0, 0.0));
        assert_eq!(layout.uv_stop, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn aspect_correction_doubles_short_side() {
        let flags = PrimFlags::TEXWRAP;
        let layout = compute_size(256, 4, flags, false, &LIMITS);
        assert_eq!((layout.raw_width, layout.raw_height), (256, 32));
        assert_eq!(layout.uv_stop, Vec2::new(1.0, 4.0 / 32.0));
    }

    #[test]
    fn border_is_dropped_when_it_overflows() {
        let flags = PrimFlags::empty();
        let layout = compute_size(4096, 100, flags, false, &LIMITS);
        assert_eq!((layout.xborder, layout.yborder), (0, 0));
        assert_eq!((layout.raw_width, layout.raw_height), (4096, 800));
        assert!(!layout.exceeds(&LIMITS));
    }

    #[test]
    fn prescale_halves_until_it_fits() {
        assert_eq!(fit_prescale(320, 4, 1024, 4096), 4);
        assert_eq!(fit_prescale(320, 8, 1024, 4096), 4);
        // 2 * 3000 > 4096
        assert_eq!(fit_prescale(3000, 2, 4096, 4096), 1);
        assert_eq!(fit_prescale(100, 0, 1024, 4096), 1);
    }

    #[test]
    fn palette_upload_replicates_edges() {
        let mut image = image16(2, 2, vec![0, 1, 2, 3]);
        image.palette = Some(Arc::from(vec![0x10, 0x20, 0x30, 0x40]));
        let flags = PrimFlags::empty().with_tex_format(TexFormat::Palette16);
        let layout = compute_size(2, 2, flags, false, &LIMITS);
        assert_eq!((layout.raw_width, layout.raw_height), (4, 4));

        let Some(UploadData::Bits32(data)) =
            build_upload(&image, TexFormat::Palette16, &layout, TextureFormat::A8R8G8B8)
        else {
            panic!("expected 32-bit upload");
        };
        let o = |c: u32| 0xff00_0000 | c;
        assert_eq!(
            data,
            vec![
                o(0x10), o(0x10), o(0x20), o(0x20),
                o(0x10), o(0x10), o(0x20), o(0x20),
                o(0x30), o(0x30), o(0x40), o(0x40),
                o(0x30), o(0x30), o(0x40), o(0x40),
            ]
        );
    }

    #[test]
    fn yuy_border_copies_whole_pairs() {
        let image = image16(2, 1, vec![0x1080, 0x2090]);
        let flags = PrimFlags::empty().with_tex_format(TexFormat::Yuy16);
        let layout = compute_size(2, 1, flags, false, &LIMITS);
        assert_eq!(layout.raw_width, 6);

        let Some(UploadData::Bits16(data)) =
            build_upload(&image, TexFormat::Yuy16, &layout, TextureFormat::Uyvy)
        else {
            panic!("expected 16-bit upload");
        };
        assert_eq!(&data[6..12], &[0x1080, 0x2090, 0x1080, 0x2090, 0x1080, 0x2090]);
    }

    #[test]
    fn mismatched_storage_is_rejected() {
        let image = image16(2, 2, vec![0; 4]);
        let layout = compute_size(2, 2, PrimFlags::TEXWRAP, false, &LIMITS);
        assert!(build_upload(&image, TexFormat::Rgb32, &layout, TextureFormat::A8R8G8B8).is_none());
    }

    #[test]
    fn find_disambiguates_screen_and_page() {
        let pixels: Arc<[u32]> = Arc::from(vec![0u32; 16]);
        let make = |unique_id| ImageDescriptor {
            pixels: PixelBuffer::Bits32(pixels.clone()),
            row_pixels: 4,
            width: 4,
            height: 4,
            palette: None,
            seq_id: 0,
            unique_id,
        };
        let flags = PrimFlags::empty().with_blend_mode(BlendMode::Alpha);
        let mut cache = TextureCache::<()>::new();
        let first = make(ImageDescriptor::make_unique_id(0, 0, 1));
        let layout = compute_size(4, 4, flags, false, &LIMITS);
        let key = cache.insert(TextureObject {
            hash: compute_hash(&first, flags),
            flags,
            image: first.clone(),
            layout,
            xprescale: 1,
            yprescale: 1,
            source: (),
            target: None,
        });

        assert_eq!(cache.find(&first, flags), Some(key));
        assert_eq!(cache.find(&make(ImageDescriptor::make_unique_id(1, 0, 1)), flags), None);
        assert_eq!(cache.find(&make(ImageDescriptor::make_unique_id(0, 1, 1)), flags), None);
        assert_eq!(
            cache.find(&first, flags.with_blend_mode(BlendMode::Add)),
            None,
            "format class is part of the identity"
        );

        cache.clear();
        assert!(cache.get(key).is_none());
    }

    fn screen_image() -> ImageDescriptor {
        ImageDescriptor {
            pixels: PixelBuffer::Bits32(Arc::from(vec![0xff20_4060u32; 64])),
            row_pixels: 8,
            width: 8,
            height: 8,
            palette: None,
            seq_id: 1,
            unique_id: ImageDescriptor::make_unique_id(0, 0, 1),
        }
    }

    fn min_filter_calls(calls: &[DeviceCall]) -> usize {
        calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::SetSamplerState(_, SamplerState::MinFilter(_))))
            .count()
    }

    #[test]
    fn prescale_blit_restores_a_bound_texture_target() {
        let mut ctx = GpuContext::for_tests(64);
        let bound = ctx
            .device
            .create_texture(&TextureDesc {
                width: 32,
                height: 32,
                format: TextureFormat::A8R8G8B8,
                usage: TextureUsage::RenderTarget,
            })
            .unwrap();
        ctx.device.set_render_target(Some(&bound)).unwrap();
        ctx.state.set_filter(&mut ctx.device, Filter::Point);
        ctx.device.take_calls();
        ctx.device.take_draws();

        let flags = PrimFlags::SCREENTEX.with_tex_format(TexFormat::Rgb32);
        let key = ctx.upsert_texture(&screen_image(), flags, 2, false).unwrap();
        let prescaled = ctx.textures.get(key).and_then(|entry| entry.target.as_ref()).map(DeviceTexture::id);
        assert!(prescaled.is_some());

        let draws = ctx.device.take_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].render_target, RenderTargetId::Texture(prescaled.unwrap()));

        assert_eq!(ctx.device.render_target(), RenderTargetId::Texture(bound.id()));
        let calls = ctx.device.take_calls();
        assert_eq!(
            calls.last(),
            Some(&DeviceCall::SetRenderTarget(RenderTargetId::Texture(bound.id())))
        );

        // The cached filter was Point before and after the blit; it must still be re-sent.
        ctx.state.set_filter(&mut ctx.device, Filter::Point);
        assert_eq!(min_filter_calls(&ctx.device.take_calls()), 2);
    }

    #[test]
    fn prescale_blit_skips_the_draw_when_the_stream_cannot_lock() {
        let mut ctx = GpuContext::for_tests(64);
        ctx.device.take_calls();
        ctx.device.take_draws();
        ctx.device.fail_vertex_locks(1);

        let flags = PrimFlags::SCREENTEX.with_tex_format(TexFormat::Rgb32);
        ctx.upsert_texture(&screen_image(), flags, 2, false).unwrap();

        assert!(ctx.device.draws().is_empty());
        let calls = ctx.device.take_calls();
        assert!(!calls.iter().any(|call| matches!(
            call,
            DeviceCall::UnlockVertexBuffer(_) | DeviceCall::DrawPrimitive { .. }
        )));
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                DeviceCall::EndScene,
                DeviceCall::SetRenderTarget(RenderTargetId::BackBuffer)
            ]
        );
        assert_eq!(ctx.device.render_target(), RenderTargetId::BackBuffer);
    }
}
