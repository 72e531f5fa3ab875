use std::sync::Arc;

use crate::device::{
    AddressMode, BlendFactor, BlendOp, Device, Filter, RenderState, SamplerState, TextureOp,
    TextureStageState,
};
use crate::error::log_failure;
use crate::primitive::BlendMode;
use crate::stats::RenderStats;
use crate::texture::TextureKey;

/// Last value pushed to the device, or `Unknown` after an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked<T> {
    Unknown,
    Known(T),
}

impl<T: PartialEq + Copy> Tracked<T> {
    /// Records `value`; returns whether the device needs to be told.
    fn update(&mut self, value: T) -> bool {
        if *self == Tracked::Known(value) {
            return false;
        }
        *self = Tracked::Known(value);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendParams {
    pub enable: bool,
    pub op: BlendOp,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendParams {
    pub fn for_mode(mode: BlendMode) -> Self {
        let (enable, src, dst) = match mode {
            BlendMode::None => (false, BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha),
            BlendMode::Alpha => (true, BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha),
            BlendMode::RgbMultiply => (true, BlendFactor::DestColor, BlendFactor::Zero),
            BlendMode::Add => (true, BlendFactor::SrcAlpha, BlendFactor::One),
        };
        Self {
            enable,
            op: BlendOp::Add,
            src,
            dst,
        }
    }
}

/// Device state snapshot with diffing setters.
///
/// Sampler and texture-stage settings are mirrored to stages 0 and 1, which
/// the post-processing chain samples from.
#[derive(Debug)]
pub struct StateCache {
    texture: Tracked<Option<TextureKey>>,
    filter: Tracked<Filter>,
    wrap: Tracked<AddressMode>,
    modulation: Tracked<TextureOp>,
    blend_enable: Tracked<bool>,
    blend_op: Tracked<BlendOp>,
    blend_src: Tracked<BlendFactor>,
    blend_dst: Tracked<BlendFactor>,
    stats: Arc<RenderStats>,
}

impl StateCache {
    pub fn new(stats: Arc<RenderStats>) -> Self {
        Self {
            texture: Tracked::Unknown,
            filter: Tracked::Unknown,
            wrap: Tracked::Unknown,
            modulation: Tracked::Unknown,
            blend_enable: Tracked::Unknown,
            blend_op: Tracked::Unknown,
            blend_src: Tracked::Unknown,
            blend_dst: Tracked::Unknown,
            stats,
        }
    }

    /// Forces every setter to reach the device on its next call.
    pub fn invalidate_all(&mut self) {
        self.texture = Tracked::Unknown;
        self.filter = Tracked::Unknown;
        self.wrap = Tracked::Unknown;
        self.modulation = Tracked::Unknown;
        self.blend_enable = Tracked::Unknown;
        self.blend_op = Tracked::Unknown;
        self.blend_src = Tracked::Unknown;
        self.blend_dst = Tracked::Unknown;
    }

    fn changed<T: PartialEq + Copy>(stats: &RenderStats, slot: &mut Tracked<T>, value: T) -> bool {
        let changed = slot.update(value);
        if changed {
            stats.inc_state_changes_applied();
        } else {
            stats.inc_state_changes_suppressed();
        }
        changed
    }

    fn check(&self, result: Result<(), crate::error::DeviceError>, call: &'static str) {
        if !log_failure(result, call) {
            self.stats.inc_device_call_failures();
        }
    }

    /// Binds `texture` on stage 0. `key` identifies the cache entry it came
    /// from, `None` meaning the default texture; returns whether the device was called.
    pub fn set_texture<D: Device>(
        &mut self,
        device: &mut D,
        key: Option<TextureKey>,
        texture: &D::Texture,
    ) -> bool {
        if !Self::changed(&self.stats, &mut self.texture, key) {
            return false;
        }
        self.check(device.set_texture(0, Some(texture)), "SetTexture");
        true
    }

    pub fn set_filter<D: Device>(&mut self, device: &mut D, filter: Filter) {
        if !Self::changed(&self.stats, &mut self.filter, filter) {
            return;
        }
        for stage in 0..2 {
            self.check(
                device.set_sampler_state(stage, SamplerState::MinFilter(filter)),
                "SetSamplerState",
            );
            self.check(
                device.set_sampler_state(stage, SamplerState::MagFilter(filter)),
                "SetSamplerState",
            );
        }
    }

    pub fn set_wrap<D: Device>(&mut self, device: &mut D, wrap: AddressMode) {
        if !Self::changed(&self.stats, &mut self.wrap, wrap) {
            return;
        }
        for stage in 0..2 {
            self.check(
                device.set_sampler_state(stage, SamplerState::AddressU(wrap)),
                "SetSamplerState",
            );
            self.check(
                device.set_sampler_state(stage, SamplerState::AddressV(wrap)),
                "SetSamplerState",
            );
        }
    }

    pub fn set_modulation<D: Device>(&mut self, device: &mut D, op: TextureOp) {
        if !Self::changed(&self.stats, &mut self.modulation, op) {
            return;
        }
        for stage in 0..2 {
            self.check(
                device.set_texture_stage_state(stage, TextureStageState::ColorOp(op)),
                "SetTextureStageState",
            );
        }
    }

    pub fn set_blend_mode<D: Device>(&mut self, device: &mut D, mode: BlendMode) {
        let params = BlendParams::for_mode(mode);

        if Self::changed(&self.stats, &mut self.blend_enable, params.enable) {
            self.check(
                device.set_render_state(RenderState::AlphaBlendEnable(params.enable)),
                "SetRenderState",
            );
        }
        if Self::changed(&self.stats, &mut self.blend_op, params.op) {
            self.check(device.set_render_state(RenderState::BlendOp(params.op)), "SetRenderState");
        }
        if Self::changed(&self.stats, &mut self.blend_src, params.src) {
            self.check(
                device.set_render_state(RenderState::SrcBlend(params.src)),
                "SetRenderState",
            );
        }
        if Self::changed(&self.stats, &mut self.blend_dst, params.dst) {
            self.check(
                device.set_render_state(RenderState::DestBlend(params.dst)),
                "SetRenderState",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sim::{DeviceCall, SimulatedAdapter};

    fn device() -> crate::sim::SimulatedDevice {
        SimulatedAdapter::new().create_default_device()
    }

    #[test]
    fn blend_table_matches_modes() {
        assert_eq!(
            BlendParams::for_mode(BlendMode::RgbMultiply),
            BlendParams {
                enable: true,
                op: BlendOp::Add,
                src: BlendFactor::DestColor,
                dst: BlendFactor::Zero,
            }
        );
        assert_eq!(
            BlendParams::for_mode(BlendMode::Add).dst,
            BlendFactor::One
        );
        assert!(!BlendParams::for_mode(BlendMode::None).enable);
    }

    #[test]
    fn repeated_setters_issue_one_call() {
        let mut device = device();
        let mut cache = StateCache::new(Arc::new(RenderStats::new()));

        cache.set_filter(&mut device, Filter::Linear);
        cache.set_filter(&mut device, Filter::Linear);
        cache.set_wrap(&mut device, AddressMode::Wrap);
        cache.set_wrap(&mut device, AddressMode::Wrap);

        let calls = device.take_calls();
        assert_eq!(
            calls,
            vec![
                DeviceCall::SetSamplerState(0, SamplerState::MinFilter(Filter::Linear)),
                DeviceCall::SetSamplerState(0, SamplerState::MagFilter(Filter::Linear)),
                DeviceCall::SetSamplerState(1, SamplerState::MinFilter(Filter::Linear)),
                DeviceCall::SetSamplerState(1, SamplerState::MagFilter(Filter::Linear)),
                DeviceCall::SetSamplerState(0, SamplerState::AddressU(AddressMode::Wrap)),
                DeviceCall::SetSamplerState(0, SamplerState::AddressV(AddressMode::Wrap)),
                DeviceCall::SetSamplerState(1, SamplerState::AddressU(AddressMode::Wrap)),
                DeviceCall::SetSamplerState(1, SamplerState::AddressV(AddressMode::Wrap)),
            ]
        );
    }

    #[test]
    fn blend_mode_only_touches_changed_fields() {
        let mut device = device();
        let mut cache = StateCache::new(Arc::new(RenderStats::new()));

        cache.set_blend_mode(&mut device, BlendMode::Alpha);
        device.take_calls();

        // Alpha -> None only flips the enable bit.
        cache.set_blend_mode(&mut device, BlendMode::None);
        assert_eq!(
            device.take_calls(),
            vec![DeviceCall::SetRenderState(RenderState::AlphaBlendEnable(false))]
        );

        // None -> Add enables and swaps the destination factor.
        cache.set_blend_mode(&mut device, BlendMode::Add);
        assert_eq!(
            device.take_calls(),
            vec![
                DeviceCall::SetRenderState(RenderState::AlphaBlendEnable(true)),
                DeviceCall::SetRenderState(RenderState::DestBlend(BlendFactor::One)),
            ]
        );
    }

    #[test]
    fn invalidate_forces_reapply() {
        let mut device = device();
        let stats = Arc::new(RenderStats::new());
        let mut cache = StateCache::new(stats.clone());

        cache.set_modulation(&mut device, TextureOp::Modulate);
        cache.set_modulation(&mut device, TextureOp::Modulate);
        assert_eq!(device.take_calls().len(), 2);

        cache.invalidate_all();
        cache.set_modulation(&mut device, TextureOp::Modulate);
        assert_eq!(device.take_calls().len(), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.state_changes_applied, 2);
        assert_eq!(snap.state_changes_suppressed, 1);
    }

    #[test]
    fn failed_setter_is_counted_and_snapshot_still_updates() {
        let mut device = device();
        let stats = Arc::new(RenderStats::new());
        let mut cache = StateCache::new(stats.clone());

        device.fail_next_state_call();
        cache.set_filter(&mut device, Filter::Point);
        cache.set_filter(&mut device, Filter::Point);

        assert_eq!(stats.snapshot().device_call_failures, 1);
        assert_eq!(device.take_calls().len(), 4);
    }
}
