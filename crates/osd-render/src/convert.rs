//! Per-row pixel conversion into texture upload formats.
//!
//! Every converter writes exactly `src.len()` pixels into the front of `dst`.
//! Palettes hold three 256-entry lookups: blue (or luma) at 0x000, green
//! (or chroma) at 0x100 and red at 0x200.

#[inline]
fn lookup(palette: &[u32], index: usize) -> u32 {
    palette.get(index).copied().unwrap_or(0)
}

#[inline]
fn remap_rgb(palette: &[u32], pixel: u32) -> u32 {
    let r = ((pixel >> 16) & 0xff) as usize;
    let g = ((pixel >> 8) & 0xff) as usize;
    let b = (pixel & 0xff) as usize;
    lookup(palette, 0x200 + r) | lookup(palette, 0x100 + g) | lookup(palette, b)
}

pub fn palette16_to_argb(dst: &mut [u32], src: &[u16], palette: &[u32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = 0xff00_0000 | lookup(palette, s as usize);
    }
}

pub fn rgb32_to_argb(dst: &mut [u32], src: &[u32], palette: Option<&[u32]>) {
    match palette {
        Some(palette) => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = 0xff00_0000 | remap_rgb(palette, s);
            }
        }
        None => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = 0xff00_0000 | s;
            }
        }
    }
}

pub fn argb32_to_argb(dst: &mut [u32], src: &[u32], palette: Option<&[u32]>) {
    match palette {
        Some(palette) => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = (s & 0xff00_0000) | remap_rgb(palette, s);
            }
        }
        None => {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
}

/// Source pixels are `Y << 8 | C`; YUY2 wants the bytes the other way round.
pub fn yuy16_to_yuy2(dst: &mut [u16], src: &[u16], palette: Option<&[u32]>) {
    match palette {
        Some(palette) => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = (lookup(palette, (s >> 8) as usize) as u16) | (s << 8);
            }
        }
        None => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = s.rotate_left(8);
            }
        }
    }
}

pub fn yuy16_to_uyvy(dst: &mut [u16], src: &[u16], palette: Option<&[u32]>) {
    match palette {
        Some(palette) => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = (lookup(palette, 0x100 + (s >> 8) as usize) as u16) | (s & 0xff);
            }
        }
        None => {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
}

/// Expands 4:2:2 pairs to opaque ARGB. A trailing unpaired pixel is dropped.
pub fn yuy16_to_argb(dst: &mut [u32], src: &[u16], palette: Option<&[u32]>) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let cb = (s[0] & 0xff) as u8;
        let cr = (s[1] & 0xff) as u8;
        let (y0, y1) = match palette {
            Some(palette) => (
                lookup(palette, (s[0] >> 8) as usize) as u8,
                lookup(palette, (s[1] >> 8) as usize) as u8,
            ),
            None => ((s[0] >> 8) as u8, (s[1] >> 8) as u8),
        };
        d[0] = ycc_to_rgb(y0, cb, cr);
        d[1] = ycc_to_rgb(y1, cb, cr);
    }
}

/// BT.601 studio-swing YCbCr to opaque ARGB.
pub fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> u32 {
    let (y, cb, cr) = (y as i32, cb as i32, cr as i32);
    let common = 298 * y - 298 * 16;
    let r = (common + 409 * cr - 409 * 128 + 128) >> 8;
    let g = (common - 100 * cb + 100 * 128 - 208 * cr + 208 * 128 + 128) >> 8;
    let b = (common + 516 * cb - 516 * 128 + 128) >> 8;

    let clamp = |c: i32| c.clamp(0, 255) as u32;
    0xff00_0000 | (clamp(r) << 16) | (clamp(g) << 8) | clamp(b)
}
