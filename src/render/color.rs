use crate::traits::render::Color;

/// Convert Color to a [f32; 4] array suitable for vertex data.
pub fn color_to_array(c: Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

/// Convert Color to wgpu::Color.
pub fn color_to_wgpu(c: Color) -> wgpu::Color {
    wgpu::Color {
        r: c.r as f64,
        g: c.g as f64,
        b: c.b as f64,
        a: c.a as f64,
    }
}
