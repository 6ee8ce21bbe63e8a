//! Stock interpolators over little-endian byte images.

/// Linear blend of one little-endian `f32`.
pub fn lerp_f32(from: &[u8], to: &[u8], out: &mut [u8], t: f32) {
    let a = read_f32(from);
    let b = read_f32(to);
    out[..4].copy_from_slice(&(a + (b - a) * t).to_le_bytes());
}

/// Linear blend of two consecutive little-endian `f32`s (e.g. a 2D
/// position).
pub fn lerp_f32x2(from: &[u8], to: &[u8], out: &mut [u8], t: f32) {
    lerp_f32(from, to, out, t);
    lerp_f32(&from[4..], &to[4..], &mut out[4..], t);
}

/// Linear blend of three consecutive little-endian `f32`s.
pub fn lerp_f32x3(from: &[u8], to: &[u8], out: &mut [u8], t: f32) {
    lerp_f32(from, to, out, t);
    lerp_f32(&from[4..], &to[4..], &mut out[4..], t);
    lerp_f32(&from[8..], &to[8..], &mut out[8..], t);
}

/// Shortest-arc blend of one little-endian `f32` angle in degrees.
pub fn lerp_angle_deg(from: &[u8], to: &[u8], out: &mut [u8], t: f32) {
    let a = read_f32(from);
    let b = read_f32(to);
    let mut delta = (b - a) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    out[..4].copy_from_slice(&(a + delta * t).to_le_bytes());
}

/// No blending: holds the window-start value until the window ends.
pub fn snap(from: &[u8], to: &[u8], out: &mut [u8], t: f32) {
    let src = if t < 1.0 { from } else { to };
    let n = src.len().min(out.len());
    out[..n].copy_from_slice(&src[..n]);
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
