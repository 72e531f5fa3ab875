use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_intrusive::channel::shared::oneshot_channel;
use hashbrown::HashMap;
use lru::LruCache;
use osd_render::device::{
    CooperativeLevel, Device, DeviceResult, DeviceTexture, DisplayMode, Filter, AddressMode,
    GammaRamp, PresentInterval, PresentParams, PresentStats, PrimitiveTopology, QueryStatus,
    RasterStatus, RenderState, RenderTargetId, SamplerState, TextureDesc, TextureFormat, TextureId,
    TextureOp, TextureStageState, TextureUsage, VertexFormat,
};
use osd_render::geometry::Vertex;
use osd_render::DeviceError;
use wgpu::util::DeviceExt;

use crate::error::{map_surface_error, WgpuBackendError};
use crate::pipeline::{create_blit_pipeline, create_render_pipeline, BlendKey, PipelineKey, SamplerKey};
use crate::shader::{texture_op_code, DrawUniforms, BLIT_WGSL, FIXED_FUNCTION_WGSL};

/// Every texture and the back buffer are stored as BGRA8, which matches the
/// little-endian byte order of `0xAARRGGBB` texels.
pub const BACK_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

const BIND_GROUP_CACHE_CAPACITY: usize = 64;

/// Stands in for "no texture" so untextured draws can share the textured pipeline.
const WHITE_TEXTURE_ID: TextureId = TextureId(0);

const BLIT_SAMPLER: SamplerKey = SamplerKey {
    min_filter: Filter::Linear,
    mag_filter: Filter::Linear,
    address_u: AddressMode::Clamp,
    address_v: AddressMode::Clamp,
};

/// Window surface the device presents to.
pub struct SurfaceTarget {
    pub(crate) surface: Arc<wgpu::Surface<'static>>,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) alpha_mode: wgpu::CompositeAlphaMode,
}

#[derive(Debug)]
pub struct WgpuTexture {
    id: TextureId,
    desc: TextureDesc,
    texture: Arc<wgpu::Texture>,
    view: Arc<wgpu::TextureView>,
}

impl DeviceTexture for WgpuTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn desc(&self) -> TextureDesc {
        self.desc
    }
}

impl WgpuTexture {
    fn bound(&self) -> BoundTexture {
        BoundTexture {
            id: self.id,
            size: (self.desc.width, self.desc.height),
            view: self.view.clone(),
        }
    }
}

#[derive(Debug)]
pub struct WgpuVertexBuffer {
    buffer: Arc<wgpu::Buffer>,
    capacity: u32,
}

#[derive(Debug, Default)]
pub struct WgpuQuery {
    done: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
struct BoundTexture {
    id: TextureId,
    size: (u32, u32),
    view: Arc<wgpu::TextureView>,
}

#[derive(Debug, Clone)]
struct BoundStream {
    buffer: Arc<wgpu::Buffer>,
    capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct UniformKey {
    width: u32,
    height: u32,
    color_op: TextureOp,
    alpha_op: TextureOp,
}

/// [`Device`] implementation on wgpu.
///
/// Draws are recorded into a pending command encoder, one render pass each, and
/// submitted at present. Queue writes (texture uploads and vertex buffer
/// commits) submit the pending encoder first so earlier draws observe the
/// previous contents.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<SurfaceTarget>,
    params: PresentParams,
    max_frame_latency: u32,
    lost: bool,

    back_buffer: Arc<wgpu::Texture>,
    back_buffer_view: Arc<wgpu::TextureView>,
    encoder: Option<wgpu::CommandEncoder>,
    next_texture_id: u64,

    module: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    uniforms: HashMap<UniformKey, (wgpu::Buffer, wgpu::BindGroup)>,
    bind_groups: LruCache<(TextureId, SamplerKey), wgpu::BindGroup>,
    blit: Option<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
    white: BoundTexture,

    blend: BlendKey,
    sampler: SamplerKey,
    color_op: TextureOp,
    alpha_op: TextureOp,
    vertex_format: VertexFormat,
    stream: Option<BoundStream>,
    texture: Option<BoundTexture>,
    target: Option<BoundTexture>,
    /// Render target views by id, so a reported target can be rebound.
    render_targets: HashMap<TextureId, ((u32, u32), Weak<wgpu::TextureView>)>,
    locked: bool,
}

impl WgpuDevice {
    pub(crate) fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<SurfaceTarget>,
        params: PresentParams,
    ) -> DeviceResult<Self> {
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!(error = %err, "wgpu validation error");
        }));

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("osd-render fixed function"),
            source: wgpu::ShaderSource::Wgsl(FIXED_FUNCTION_WGSL.into()),
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("osd-render uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("osd-render texture"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("osd-render pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let white = create_texture_object(&device, 1, 1, TextureUsage::Dynamic);
        queue.write_texture(
            white.as_image_copy(),
            &[0xff; 4],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            extent(1, 1),
        );
        let white = BoundTexture {
            id: WHITE_TEXTURE_ID,
            size: (1, 1),
            view: Arc::new(white.create_view(&wgpu::TextureViewDescriptor::default())),
        };

        let (back_buffer, back_buffer_view) = create_back_buffer(&device, &params);
        let mut this = Self {
            device,
            queue,
            surface,
            params,
            max_frame_latency: 2,
            lost: false,
            back_buffer,
            back_buffer_view,
            encoder: None,
            next_texture_id: WHITE_TEXTURE_ID.0 + 1,
            module,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            samplers: HashMap::new(),
            uniforms: HashMap::new(),
            bind_groups: LruCache::new(
                std::num::NonZeroUsize::new(BIND_GROUP_CACHE_CAPACITY)
                    .ok_or(DeviceError::InvalidCall("bind group cache capacity"))?,
            ),
            blit: None,
            white,
            blend: BlendKey::default(),
            sampler: SamplerKey::default(),
            color_op: TextureOp::Modulate,
            alpha_op: TextureOp::Modulate,
            vertex_format: VertexFormat::PreTransformed,
            stream: None,
            texture: None,
            target: None,
            render_targets: HashMap::new(),
            locked: false,
        };
        this.configure_surface();
        Ok(this)
    }

    pub fn params(&self) -> &PresentParams {
        &self.params
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Submits pending work and waits for the queue to drain.
    pub async fn wait_idle(&mut self) {
        self.submit();
        let (sender, receiver) = oneshot_channel();
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        // Callbacks only fire while the device is polled.
        #[cfg(not(target_arch = "wasm32"))]
        self.device.poll(wgpu::Maintain::Wait);
        #[cfg(target_arch = "wasm32")]
        self.device.poll(wgpu::Maintain::Poll);
        let _ = receiver.receive().await;
    }

    /// Copies the back buffer to the CPU as tightly packed BGRA8 rows.
    pub async fn read_back_buffer(&mut self) -> Result<(u32, u32, Vec<u8>), WgpuBackendError> {
        let width = self.params.back_buffer_width.max(1);
        let height = self.params.back_buffer_height.max(1);
        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row =
            unpadded_bytes_per_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("osd-render readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("osd-render frame"),
                })
        });
        encoder.copy_texture_to_buffer(
            self.back_buffer.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.submit();

        let slice = readback.slice(..);
        let (sender, receiver) = oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result.map_err(|e| e.to_string()));
        });

        #[cfg(not(target_arch = "wasm32"))]
        self.device.poll(wgpu::Maintain::Wait);
        #[cfg(target_arch = "wasm32")]
        self.device.poll(wgpu::Maintain::Poll);

        let mapped = receiver
            .receive()
            .await
            .ok_or(WgpuBackendError::MapAsyncDropped)?;
        mapped.map_err(WgpuBackendError::MapAsync)?;

        let data = slice.get_mapped_range();
        let mut pixels = vec![0u8; (unpadded_bytes_per_row * height) as usize];
        for (y, row) in pixels
            .chunks_exact_mut(unpadded_bytes_per_row as usize)
            .enumerate()
        {
            let src = y * padded_bytes_per_row as usize;
            row.copy_from_slice(&data[src..src + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        readback.unmap();
        Ok((width, height, pixels))
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit([encoder.finish()]);
        }
    }

    fn configure_surface(&mut self) {
        let Some(target) = &self.surface else {
            return;
        };
        let present_mode = match self.params.interval {
            PresentInterval::One => wgpu::PresentMode::AutoVsync,
            PresentInterval::Immediate => wgpu::PresentMode::AutoNoVsync,
        };
        target.surface.configure(
            &self.device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: target.format,
                width: self.params.back_buffer_width.max(1),
                height: self.params.back_buffer_height.max(1),
                present_mode,
                desired_maximum_frame_latency: self.max_frame_latency,
                alpha_mode: target.alpha_mode,
                view_formats: vec![],
            },
        );
    }

    fn reset_swap_chain(&mut self, params: &PresentParams) {
        self.submit();
        self.params = *params;
        let (back_buffer, back_buffer_view) = create_back_buffer(&self.device, params);
        self.back_buffer = back_buffer;
        self.back_buffer_view = back_buffer_view;
        self.target = None;
        self.texture = None;
        self.stream = None;
        self.locked = false;
        self.bind_groups.clear();
        self.configure_surface();
        self.lost = false;
        tracing::debug!(
            width = params.back_buffer_width,
            height = params.back_buffer_height,
            "swap chain reset"
        );
    }

    fn current_target(&self) -> BoundTexture {
        self.target.clone().unwrap_or_else(|| BoundTexture {
            id: WHITE_TEXTURE_ID,
            size: (self.params.back_buffer_width, self.params.back_buffer_height),
            view: self.back_buffer_view.clone(),
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let pipeline =
            create_render_pipeline(&self.device, &self.pipeline_layout, &self.module, &key);
        tracing::debug!(?key, "created render pipeline");
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_uniforms(&mut self, key: UniformKey) {
        if self.uniforms.contains_key(&key) {
            return;
        }
        let data = DrawUniforms {
            target_size: [key.width.max(1) as f32, key.height.max(1) as f32],
            color_op: texture_op_code(key.color_op),
            alpha_op: texture_op_code(key.alpha_op),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("osd-render draw uniforms"),
                contents: bytemuck::bytes_of(&data),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("osd-render draw uniforms"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        self.uniforms.insert(key, (buffer, bind_group));
    }

    fn texture_bind_group(&mut self, view: &wgpu::TextureView, sampler_key: SamplerKey) -> wgpu::BindGroup {
        let sampler = self
            .samplers
            .entry(sampler_key)
            .or_insert_with(|| self.device.create_sampler(&sampler_key.descriptor()));
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("osd-render texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn ensure_texture_bind_group(&mut self, texture: &BoundTexture) {
        let key = (texture.id, self.sampler);
        if self.bind_groups.get(&key).is_some() {
            return;
        }
        let bind_group = self.texture_bind_group(&texture.view, self.sampler);
        self.bind_groups.put(key, bind_group);
    }

    fn record_blit(&mut self, view: &wgpu::TextureView, format: wgpu::TextureFormat) {
        if !matches!(&self.blit, Some((cached, _)) if *cached == format) {
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("osd-render blit"),
                source: wgpu::ShaderSource::Wgsl(BLIT_WGSL.into()),
            });
            let layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("osd-render blit layout"),
                    bind_group_layouts: &[&self.texture_layout],
                    push_constant_ranges: &[],
                });
            let pipeline = create_blit_pipeline(&self.device, &layout, &module, format);
            self.blit = Some((format, pipeline));
        }
        let source = self.back_buffer_view.clone();
        let bind_group = self.texture_bind_group(&source, BLIT_SAMPLER);
        let Some((_, pipeline)) = &self.blit else {
            return;
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("osd-render frame"),
                })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("osd-render blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn create_texture_object(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    usage: TextureUsage,
) -> wgpu::Texture {
    let usage = match usage {
        TextureUsage::Dynamic => {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        }
        TextureUsage::RenderTarget => {
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
        }
    };
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("osd-render texture"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: BACK_BUFFER_FORMAT,
        usage,
        view_formats: &[],
    })
}

fn create_back_buffer(
    device: &wgpu::Device,
    params: &PresentParams,
) -> (Arc<wgpu::Texture>, Arc<wgpu::TextureView>) {
    let texture = create_texture_object(
        device,
        params.back_buffer_width.max(1),
        params.back_buffer_height.max(1),
        TextureUsage::RenderTarget,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (Arc::new(texture), Arc::new(view))
}

fn argb_to_color(argb: u32) -> wgpu::Color {
    let channel = |shift: u32| ((argb >> shift) & 0xff) as f64 / 255.0;
    wgpu::Color {
        r: channel(16),
        g: channel(8),
        b: channel(0),
        a: channel(24),
    }
}

impl Device for WgpuDevice {
    type Texture = WgpuTexture;
    type VertexBuffer = WgpuVertexBuffer;
    type Query = WgpuQuery;

    fn test_cooperative_level(&mut self) -> CooperativeLevel {
        // A lost or outdated surface only needs reconfiguring.
        if self.lost {
            CooperativeLevel::NotReset
        } else {
            CooperativeLevel::Ok
        }
    }

    fn reset(&mut self, params: &PresentParams) -> DeviceResult<()> {
        self.reset_swap_chain(params);
        Ok(())
    }

    fn reset_ex(
        &mut self,
        params: &PresentParams,
        _fullscreen_mode: Option<&DisplayMode>,
    ) -> DeviceResult<()> {
        self.reset_swap_chain(params);
        Ok(())
    }

    fn set_maximum_frame_latency(&mut self, frames: u32) -> DeviceResult<()> {
        self.max_frame_latency = frames.max(1);
        self.configure_surface();
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> DeviceResult<WgpuTexture> {
        if !matches!(desc.format, TextureFormat::A8R8G8B8 | TextureFormat::X8R8G8B8) {
            return Err(DeviceError::InvalidCall("unsupported texture format"));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DeviceError::InvalidCall("texture size out of range"));
        }

        let texture = create_texture_object(&self.device, desc.width, desc.height, desc.usage);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        tracing::trace!(texture_id = id.0, width = desc.width, height = desc.height, usage = ?desc.usage, "created texture");
        let view = Arc::new(view);
        if desc.usage == TextureUsage::RenderTarget {
            self.render_targets
                .retain(|_, (_, view)| view.strong_count() > 0);
            self.render_targets
                .insert(id, ((desc.width, desc.height), Arc::downgrade(&view)));
        }
        Ok(WgpuTexture {
            id,
            desc: *desc,
            texture: Arc::new(texture),
            view,
        })
    }

    fn write_texture(&mut self, texture: &WgpuTexture, data: &[u8], pitch: u32) -> DeviceResult<()> {
        let TextureDesc {
            width,
            height,
            format,
            usage,
        } = texture.desc;
        if usage != TextureUsage::Dynamic {
            return Err(DeviceError::InvalidCall("texture is not CPU writable"));
        }
        if pitch < width * 4 || pitch % 4 != 0 || (data.len() as u64) < pitch as u64 * height as u64 {
            return Err(DeviceError::InvalidCall("texture data too small"));
        }

        self.submit();
        let opaque;
        let bytes = if format == TextureFormat::X8R8G8B8 {
            let mut owned = data.to_vec();
            for texel in owned.chunks_exact_mut(4) {
                texel[3] = 0xff;
            }
            opaque = owned;
            &opaque[..]
        } else {
            data
        };
        self.queue.write_texture(
            texture.texture.as_image_copy(),
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(height),
            },
            extent(width, height),
        );
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        capacity: u32,
        _format: VertexFormat,
    ) -> DeviceResult<WgpuVertexBuffer> {
        if capacity == 0 {
            return Err(DeviceError::InvalidCall("empty vertex buffer"));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("osd-render vertices"),
            size: capacity as u64 * Vertex::STRIDE as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(WgpuVertexBuffer {
            buffer: Arc::new(buffer),
            capacity,
        })
    }

    fn lock_vertex_buffer(&mut self, _buffer: &WgpuVertexBuffer) -> DeviceResult<()> {
        if self.locked {
            return Err(DeviceError::InvalidCall("vertex buffer already locked"));
        }
        self.locked = true;
        Ok(())
    }

    fn unlock_vertex_buffer(
        &mut self,
        buffer: &WgpuVertexBuffer,
        vertices: &[Vertex],
    ) -> DeviceResult<()> {
        self.locked = false;
        if vertices.len() > buffer.capacity as usize {
            return Err(DeviceError::InvalidCall("too many vertices for the buffer"));
        }
        if vertices.is_empty() {
            return Ok(());
        }
        self.submit();
        self.queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(vertices));
        Ok(())
    }

    fn set_stream_source(&mut self, buffer: &WgpuVertexBuffer) -> DeviceResult<()> {
        self.stream = Some(BoundStream {
            buffer: buffer.buffer.clone(),
            capacity: buffer.capacity,
        });
        Ok(())
    }

    fn set_vertex_format(&mut self, format: VertexFormat) -> DeviceResult<()> {
        self.vertex_format = format;
        Ok(())
    }

    fn set_render_state(&mut self, state: RenderState) -> DeviceResult<()> {
        match state {
            RenderState::AlphaBlendEnable(enabled) => self.blend.enabled = enabled,
            RenderState::BlendOp(op) => self.blend.op = op,
            RenderState::SrcBlend(factor) => self.blend.src = factor,
            RenderState::DestBlend(factor) => self.blend.dst = factor,
            // No depth, stencil, lighting or fog in this pipeline.
            _ => {}
        }
        Ok(())
    }

    fn set_sampler_state(&mut self, stage: u32, state: SamplerState) -> DeviceResult<()> {
        if stage != 0 {
            return Ok(());
        }
        match state {
            SamplerState::MinFilter(filter) => self.sampler.min_filter = filter,
            SamplerState::MagFilter(filter) => self.sampler.mag_filter = filter,
            SamplerState::AddressU(mode) => self.sampler.address_u = mode,
            SamplerState::AddressV(mode) => self.sampler.address_v = mode,
        }
        Ok(())
    }

    fn set_texture_stage_state(&mut self, stage: u32, state: TextureStageState) -> DeviceResult<()> {
        if stage != 0 {
            return Ok(());
        }
        match state {
            TextureStageState::ColorOp(op) => self.color_op = op,
            TextureStageState::AlphaOp(op) => self.alpha_op = op,
        }
        Ok(())
    }

    fn set_texture(&mut self, stage: u32, texture: Option<&WgpuTexture>) -> DeviceResult<()> {
        if stage == 0 {
            self.texture = texture.map(WgpuTexture::bound);
        }
        Ok(())
    }

    fn render_target(&self) -> RenderTargetId {
        match &self.target {
            Some(target) => RenderTargetId::Texture(target.id),
            None => RenderTargetId::BackBuffer,
        }
    }

    fn set_render_target(&mut self, texture: Option<&WgpuTexture>) -> DeviceResult<()> {
        match texture {
            Some(texture) if texture.desc.usage != TextureUsage::RenderTarget => {
                Err(DeviceError::InvalidCall("texture is not a render target"))
            }
            texture => {
                self.target = texture.map(WgpuTexture::bound);
                Ok(())
            }
        }
    }

    fn restore_render_target(&mut self, target: RenderTargetId) -> DeviceResult<()> {
        self.target = match target {
            RenderTargetId::BackBuffer => None,
            RenderTargetId::Texture(id) => {
                let (size, view) = self
                    .render_targets
                    .get(&id)
                    .and_then(|(size, view)| Some((*size, view.upgrade()?)))
                    .ok_or(DeviceError::InvalidCall("render target was released"))?;
                Some(BoundTexture { id, size, view })
            }
        };
        Ok(())
    }

    fn clear(&mut self, argb: u32) -> DeviceResult<()> {
        let target = self.current_target();
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("osd-render frame"),
                })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("osd-render clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(argb_to_color(argb)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn begin_scene(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn end_scene(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn draw_primitive(
        &mut self,
        topology: PrimitiveTopology,
        start_vertex: u32,
        primitive_count: u32,
    ) -> DeviceResult<()> {
        if primitive_count == 0 {
            return Ok(());
        }
        let vertex_count = match topology {
            PrimitiveTopology::TriangleList => primitive_count * 3,
            PrimitiveTopology::TriangleStrip => primitive_count + 2,
        };
        let stream = self
            .stream
            .clone()
            .ok_or(DeviceError::InvalidCall("no stream source"))?;
        if self.locked {
            return Err(DeviceError::InvalidCall("vertex buffer is locked"));
        }
        if start_vertex.saturating_add(vertex_count) > stream.capacity {
            return Err(DeviceError::InvalidCall("draw exceeds the vertex buffer"));
        }

        let target = self.current_target();
        let texture = self.texture.clone().unwrap_or_else(|| self.white.clone());
        let pipeline_key = PipelineKey {
            blend: self.blend,
            topology,
            vertex_format: self.vertex_format,
            target_format: BACK_BUFFER_FORMAT,
        };
        let uniform_key = UniformKey {
            width: target.size.0,
            height: target.size.1,
            color_op: self.color_op,
            alpha_op: self.alpha_op,
        };
        let bind_key = (texture.id, self.sampler);
        self.ensure_pipeline(pipeline_key);
        self.ensure_uniforms(uniform_key);
        self.ensure_texture_bind_group(&texture);

        let (Some(pipeline), Some((_, uniforms)), Some(textures)) = (
            self.pipelines.get(&pipeline_key),
            self.uniforms.get(&uniform_key),
            self.bind_groups.peek(&bind_key),
        ) else {
            return Err(DeviceError::Backend("draw resources missing".into()));
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("osd-render frame"),
                })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("osd-render draw"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, uniforms, &[]);
        pass.set_bind_group(1, textures, &[]);
        pass.set_vertex_buffer(0, stream.buffer.slice(..));
        pass.draw(start_vertex..start_vertex + vertex_count, 0..1);
        Ok(())
    }

    fn present(&mut self) -> DeviceResult<()> {
        let Some((surface, format)) = self
            .surface
            .as_ref()
            .map(|target| (target.surface.clone(), target.format))
        else {
            self.submit();
            return Ok(());
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                self.submit();
                if matches!(err, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) {
                    tracing::debug!(error = %err, "surface needs reconfiguring");
                    self.lost = true;
                }
                return Err(map_surface_error(err));
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.record_blit(&view, format);
        self.submit();
        frame.present();
        Ok(())
    }

    fn raster_status(&mut self) -> DeviceResult<RasterStatus> {
        Err(DeviceError::NotAvailable)
    }

    fn present_stats(&mut self) -> Option<PresentStats> {
        None
    }

    fn set_gamma_ramp(&mut self, _ramp: &GammaRamp) -> DeviceResult<()> {
        Err(DeviceError::NotAvailable)
    }

    fn create_query(&mut self) -> DeviceResult<WgpuQuery> {
        Ok(WgpuQuery::default())
    }

    fn issue_query_end(&mut self, query: &WgpuQuery) -> DeviceResult<()> {
        self.submit();
        query.done.store(false, Ordering::Release);
        let done = query.done.clone();
        self.queue.on_submitted_work_done(move || {
            done.store(true, Ordering::Release);
        });
        Ok(())
    }

    fn query_status(&mut self, query: &WgpuQuery) -> DeviceResult<QueryStatus> {
        self.device.poll(wgpu::Maintain::Poll);
        if query.done.load(Ordering::Acquire) {
            Ok(QueryStatus::Done)
        } else {
            Ok(QueryStatus::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clear_color_unpacks_argb() {
        assert_eq!(
            argb_to_color(0xff80_0040),
            wgpu::Color {
                r: 128.0 / 255.0,
                g: 0.0,
                b: 64.0 / 255.0,
                a: 1.0,
            }
        );
    }

    #[test]
    fn extent_is_single_layer() {
        assert_eq!(extent(3, 5).depth_or_array_layers, 1);
    }
}
