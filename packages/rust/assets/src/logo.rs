//! Logo normalization: trim the uniform border around a raster logo.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, Rgba};
use tracing::{debug, instrument};

use packetmaker_shared::{PacketError, Result};

/// A pixel belongs to the logo when any channel differs from the
/// background (the top-left pixel) by more than this.
const TRIM_THRESHOLD: u8 = 100;

/// Marker in the file stem of an already normalized logo.
const CROPPED_MARKER: &str = "cropped";

/// Crop `logo` to its content and save it as `<stem>_cropped.<ext>` in `output_dir`.
///
/// Logos whose stem already contains `cropped` are returned unchanged. A
/// logo with no content distinct from its background is copied as is.
#[instrument(skip_all, fields(logo = %logo.display()))]
pub fn normalize_logo(logo: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = logo
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| PacketError::Image(format!("{}: no file name", logo.display())))?;
    if stem.contains(CROPPED_MARKER) {
        debug!("logo already normalized");
        return Ok(logo.to_path_buf());
    }

    let img = image::open(logo).map_err(|e| PacketError::Image(format!("{}: {e}", logo.display())))?;
    let cropped = match content_bounds(&img) {
        Some((x, y, w, h)) => img.crop_imm(x, y, w, h),
        None => img,
    };

    let ext = logo
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "png".to_string());
    std::fs::create_dir_all(output_dir).map_err(|e| PacketError::io(output_dir, e))?;
    let out = output_dir.join(format!("{stem}_{CROPPED_MARKER}.{ext}"));

    // JPEG has no alpha channel.
    let cropped = match ext.as_str() {
        "jpg" | "jpeg" => DynamicImage::ImageRgb8(cropped.to_rgb8()),
        _ => cropped,
    };
    cropped
        .save(&out)
        .map_err(|e| PacketError::Image(format!("{}: {e}", out.display())))?;

    debug!(out = %out.display(), width = cropped.width(), height = cropped.height(), "normalized logo");
    Ok(out)
}

/// Bounding box `(x, y, width, height)` of pixels that differ from the background.
fn content_bounds(img: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let background = img.get_pixel(0, 0);

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in img.pixels() {
        if !differs(&pixel, &background) {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

fn differs(pixel: &Rgba<u8>, background: &Rgba<u8>) -> bool {
    pixel
        .0
        .iter()
        .zip(background.0.iter())
        .any(|(a, b)| a.abs_diff(*b) > TRIM_THRESHOLD)
}
