//! Render pipeline keys and creation for the fixed-function shader.

use osd_render::device::{AddressMode, BlendFactor, BlendOp, Filter, PrimitiveTopology, VertexFormat};
use osd_render::geometry::Vertex;

/// Blend state as set through the render state calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendKey {
    pub enabled: bool,
    pub op: BlendOp,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl Default for BlendKey {
    fn default() -> Self {
        Self {
            enabled: false,
            op: BlendOp::Add,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
        }
    }
}

impl BlendKey {
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        if !self.enabled {
            return None;
        }
        let operation = map_blend_op(self.op);
        // Min and max ignore the factors; wgpu requires them to be one.
        let (src, dst) = match self.op {
            BlendOp::Min | BlendOp::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            _ => (map_blend_factor(self.src), map_blend_factor(self.dst)),
        };
        let component = wgpu::BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation,
        };
        Some(wgpu::BlendState {
            color: component,
            alpha: component,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub blend: BlendKey,
    pub topology: PrimitiveTopology,
    pub vertex_format: VertexFormat,
    pub target_format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

impl Default for SamplerKey {
    fn default() -> Self {
        Self {
            min_filter: Filter::Point,
            mag_filter: Filter::Point,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
        }
    }
}

impl SamplerKey {
    pub fn descriptor(self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("osd-render sampler"),
            address_mode_u: map_address_mode(self.address_u),
            address_mode_v: map_address_mode(self.address_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: map_filter(self.mag_filter),
            min_filter: map_filter(self.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }
}

pub fn map_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::InvSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DestAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::InvDestAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::DestColor => wgpu::BlendFactor::Dst,
        BlendFactor::InvDestColor => wgpu::BlendFactor::OneMinusDst,
    }
}

pub fn map_blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::RevSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

fn map_filter(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Point => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn map_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
    }
}

fn map_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Unorm8x4,
        offset: 16,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 20,
        shader_location: 2,
    },
];

pub fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let vs_entry = match key.vertex_format {
        VertexFormat::PreTransformed => "vs_pretransformed",
        VertexFormat::Homogeneous => "vs_homogeneous",
    };
    let buffers = [wgpu::VertexBufferLayout {
        array_stride: Vertex::STRIDE as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }];

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("osd-render pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: vs_entry,
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: key.target_format,
                blend: key.blend.to_wgpu(),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: map_topology(key.topology),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Cw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

pub fn create_blit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    target_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("osd-render blit"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: "vs_blit",
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: "fs_blit",
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}
