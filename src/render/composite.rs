//! Masked-over blending of a [`TextMask`] onto straight-alpha RGBA pixels.

use super::caption::TextMask;
use crate::{KittenError, Result};

/// Blend `mask` over a `width` x `height` RGBA buffer positioned at
/// `(left, top)` on the mask's canvas.
///
/// The destination holds straight (non-premultiplied) alpha, as decoded
/// images and GIF frames do. Parts of the buffer outside the mask are left
/// untouched.
pub fn mask_over(
    dst: &mut [u8],
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    mask: &TextMask,
) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if dst.len() != expected {
        return Err(KittenError::Decode {
            stage: "composite",
            message: format!(
                "buffer holds {} bytes, {width}x{height} RGBA needs {expected}",
                dst.len()
            ),
        });
    }

    let mask_width = mask.width();
    let mask_data = mask.data();

    let rows = height.min(mask.height().saturating_sub(top));
    let cols = width.min(mask_width.saturating_sub(left));

    for y in 0..rows {
        let dst_row = (y * width) as usize * 4;
        let mask_row = ((top + y) * mask_width + left) as usize * 4;
        for x in 0..cols as usize {
            let m = &mask_data[mask_row + x * 4..mask_row + x * 4 + 4];
            let d = &mut dst[dst_row + x * 4..dst_row + x * 4 + 4];
            blend_pixel(d, [m[0], m[1], m[2], m[3]]);
        }
    }

    Ok(())
}

/// Source-over of one premultiplied source pixel onto a straight-alpha one.
fn blend_pixel(dst: &mut [u8], src: [u8; 4]) {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return;
    }
    if sa == 255 {
        dst.copy_from_slice(&src);
        return;
    }

    // Destination coverage left visible under the source, and the output
    // alpha, both scaled by 255.
    let dw = u32::from(dst[3]) * (255 - sa);
    let out_a = sa * 255 + dw;

    for c in 0..3 {
        // Output premultiplied colour scaled by 255^2; dividing by the scaled
        // alpha un-premultiplies it back to 0..=255.
        let premul = u32::from(src[c]) * 255 * 255 + u32::from(dst[c]) * dw;
        dst[c] = ((premul + out_a / 2) / out_a).min(255) as u8;
    }
    dst[3] = ((out_a + 127) / 255) as u8;
}
