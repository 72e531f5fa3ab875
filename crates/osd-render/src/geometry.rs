use bytemuck::{Pod, Zeroable};

/// Vertex layout shared by every draw: position, diffuse color and two UV sets.
///
/// The second UV set carries per-vertex line length and width for vector
/// primitives; other primitives leave it at zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rhw: f32,
    /// Packed `0xAARRGGBB`.
    pub color: u32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Bounds {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Normalized color; components may exceed 1.0 for over-modulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Packs into `0xAARRGGBB`, truncating each scaled component to its low byte.
    pub fn to_argb(self) -> u32 {
        let channel = |c: f32| ((c * 255.0) as i32 as u32) & 0xff;
        (channel(self.a) << 24) | (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Converts a line segment into the two edges of a quad.
///
/// `first` spans the start point and `second` the end point; each edge is
/// `width` wide, perpendicular to the segment. The segment grows by
/// `length_extension` in total, split evenly between both ends. A zero-length segment uses a
/// diagonal unit vector so points still cover a diamond.
pub fn line_to_quad(line: &Bounds, width: f32, length_extension: f32) -> (Bounds, Bounds) {
    let half_width = width * 0.5;

    let mut unit_x = line.x1 - line.x0;
    let mut unit_y = line.y1 - line.y0;
    if unit_x == 0.0 && unit_y == 0.0 {
        unit_x = std::f32::consts::FRAC_1_SQRT_2;
        unit_y = std::f32::consts::FRAC_1_SQRT_2;
    } else {
        let inv_len = 1.0 / (unit_x * unit_x + unit_y * unit_y).sqrt();
        unit_x *= inv_len;
        unit_y *= inv_len;
    }

    let ext_x = unit_x * length_extension * 0.5;
    let ext_y = unit_y * length_extension * 0.5;
    let (sx, sy) = (line.x0 - ext_x, line.y0 - ext_y);
    let (ex, ey) = (line.x1 + ext_x, line.y1 + ext_y);

    let off_x = unit_x * half_width;
    let off_y = unit_y * half_width;

    let first = Bounds::new(sx - off_y, sy + off_x, sx + off_y, sy - off_x);
    let second = Bounds::new(ex - off_y, ey + off_x, ex + off_y, ey - off_x);
    (first, second)
}
