use image::RgbaImage;

use crate::{
    error::{StepdocError, StepdocResult},
    geom::StoredRect,
};

/// Effective odd kernel size for a blur layer's strength setting.
pub fn kernel_size(strength: u32) -> u32 {
    strength.max(1) | 1
}

/// Sigma derived from the kernel size the way classic Gaussian filters do
/// when no explicit sigma is given: `0.3 * ((k - 1) * 0.5 - 1) + 0.8`.
pub fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Blur the intersection of `rect` with the image in place. An empty
/// intersection is a no-op. The patch is extracted, blurred with clamped
/// edge sampling, and written back, so pixels outside the region never
/// change.
pub fn blur_region(img: &mut RgbaImage, rect: StoredRect, strength: u32) -> StepdocResult<()> {
    let (iw, ih) = (img.width() as i32, img.height() as i32);
    let x0 = rect.x0.clamp(0, iw);
    let y0 = rect.y0.clamp(0, ih);
    let x1 = rect.x1.clamp(0, iw);
    let y1 = rect.y1.clamp(0, ih);
    let (pw, ph) = ((x1 - x0) as u32, (y1 - y0) as u32);
    if pw == 0 || ph == 0 {
        return Ok(());
    }

    let mut patch = vec![0u8; (pw * ph * 4) as usize];
    for py in 0..ph {
        for px in 0..pw {
            let p = img.get_pixel(x0 as u32 + px, y0 as u32 + py);
            let idx = ((py * pw + px) * 4) as usize;
            patch[idx..idx + 4].copy_from_slice(&p.0);
        }
    }

    let k = kernel_size(strength);
    let radius = k / 2;
    let blurred = blur_rgba8(&patch, pw, ph, radius, sigma_for_kernel(k))?;

    for py in 0..ph {
        for px in 0..pw {
            let idx = ((py * pw + px) * 4) as usize;
            let mut c = [0u8; 4];
            c.copy_from_slice(&blurred[idx..idx + 4]);
            img.put_pixel(x0 as u32 + px, y0 as u32 + py, image::Rgba(c));
        }
    }
    Ok(())
}

/// Separable Gaussian blur over a straight-alpha RGBA byte buffer, fixed
/// point Q16 weights, edge-clamped sampling.
pub fn blur_rgba8(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> StepdocResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| StepdocError::render("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(StepdocError::render(
            "blur_rgba8 expects src matching width*height*4",
        ));
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let taps = gaussian_taps_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    convolve_axis(src, &mut tmp, width, height, &taps, Axis::X);
    convolve_axis(&tmp, &mut out, width, height, &taps, Axis::Y);
    Ok(out)
}

/// Normalized Gaussian weights as Q16 integers summing to exactly 65536.
fn gaussian_taps_q16(radius: u32, sigma: f32) -> StepdocResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(StepdocError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let raw: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return Err(StepdocError::render("gaussian kernel sum is zero"));
    }

    let mut taps: Vec<u32> = raw
        .iter()
        .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    // Fold rounding drift into the center tap so the row sums to one.
    let total: i64 = taps.iter().map(|&t| i64::from(t)).sum();
    let mid = taps.len() / 2;
    taps[mid] = (i64::from(taps[mid]) + 65536 - total).clamp(0, 65536) as u32;
    Ok(taps)
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// One direction of the separable convolution, edge-clamped.
fn convolve_axis(src: &[u8], dst: &mut [u8], width: u32, height: u32, taps: &[u32], axis: Axis) {
    let radius = (taps.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ti, &tap) in taps.iter().enumerate() {
                let d = ti as i32 - radius;
                let (sx, sy) = match axis {
                    Axis::X => ((x + d).clamp(0, w - 1), y),
                    Axis::Y => (x, (y + d).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(tap) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for (c, a) in acc.iter().enumerate() {
                dst[out_idx + c] = (((a + 32768) >> 16).min(255)) as u8;
            }
        }
    }
}
