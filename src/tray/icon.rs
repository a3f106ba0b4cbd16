//! Tray bitmap, drawn in code so no image asset ships with the binary.

pub const ICON_SIZE: u32 = 64;
pub const ICON_COLOR: [u8; 3] = [30, 144, 255];

const INSET: u32 = 8;

/// 64×64 RGBA: transparent background with a filled circle.
pub fn circle_rgba() -> Vec<u8> {
    let center = ICON_SIZE as f32 / 2.0;
    let radius = (ICON_SIZE - 2 * INSET) as f32 / 2.0;
    let [r, g, b] = ICON_COLOR;

    let mut pixels = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            if dx * dx + dy * dy <= radius * radius {
                pixels.extend_from_slice(&[r, g, b, 255]);
            } else {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }
    pixels
}
