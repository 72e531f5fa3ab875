use crate::device::GammaRamp;

/// Maps an 8-bit intensity through gamma, then contrast and brightness.
pub fn apply_brightness_contrast_gamma(value: u8, brightness: f32, contrast: f32, gamma: f32) -> u8 {
    let gamma = if gamma > 0.0 { gamma } else { 1.0 };
    let v = (value as f32 / 255.0).powf(1.0 / gamma);
    let v = (v * contrast + brightness - 1.0).clamp(0.0, 1.0);
    (v * 255.0 + 0.5) as u8
}

/// Identical ramp for all three channels, or `None` when every control is neutral.
pub fn build_gamma_ramp(brightness: f32, contrast: f32, gamma: f32) -> Option<GammaRamp> {
    if brightness == 1.0 && contrast == 1.0 && gamma == 1.0 {
        return None;
    }

    let mut channel = [0u16; 256];
    for (i, entry) in channel.iter_mut().enumerate() {
        *entry = (apply_brightness_contrast_gamma(i as u8, brightness, contrast, gamma) as u16) << 8;
    }
    Some(GammaRamp {
        red: channel,
        green: channel,
        blue: channel,
    })
}

/// Ramp that leaves every intensity unchanged.
pub fn identity_gamma_ramp() -> GammaRamp {
    let mut channel = [0u16; 256];
    for (i, entry) in channel.iter_mut().enumerate() {
        *entry = (i as u16) << 8;
    }
    GammaRamp {
        red: channel,
        green: channel,
        blue: channel,
    }
}
