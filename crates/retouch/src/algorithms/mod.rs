pub mod whiten;
pub mod background;
pub mod perimeter;
pub mod crop;
pub mod pad;
pub mod resize;
pub mod canvas;

pub use whiten::*;
pub use background::*;
pub use perimeter::*;
pub use crop::*;
pub use pad::*;
pub use resize::*;
pub use canvas::*;

use image::Rgba;

/// Composite a straight-alpha pixel over an opaque background colour
pub fn blend_over(pixel: &Rgba<u8>, background: [u8; 3]) -> [u8; 3] {
    let alpha = pixel[3] as u32;
    let mut out = [0u8; 3];
    for (channel, slot) in out.iter_mut().enumerate() {
        let fg = pixel[channel] as u32 * alpha;
        let bg = background[channel] as u32 * (255 - alpha);
        *slot = ((fg + bg + 127) / 255) as u8;
    }
    out
}

/// Whether every colour channel is at least `255 - tolerance`
pub fn is_near_white(rgb: [u8; 3], tolerance: u8) -> bool {
    let cutoff = 255 - tolerance;
    rgb.iter().all(|&c| c >= cutoff)
}

/// Top-left offset that centres an `inner` extent inside an `outer` one
pub(crate) fn centre_offset(outer: u32, inner: u32) -> i64 {
    (outer as i64 - inner as i64) / 2
}
