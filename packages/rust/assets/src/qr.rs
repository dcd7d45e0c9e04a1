//! QR code images for links printed in the packet.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma, imageops};
use qrcode::{EcLevel, QrCode};
use tracing::{debug, instrument};

use packetmaker_shared::{PacketError, Result};

/// Pixels per QR module.
const MODULE_PX: u32 = 20;

/// Quiet-zone width, in modules.
const BORDER_MODULES: u32 = 1;

/// Render `url` as a QR code saved to `<output_dir>/<id> QRCode.png`.
///
/// Uses the highest error-correction level so printed codes survive
/// folding and smudging.
#[instrument(skip_all, fields(id = %id))]
pub fn make_qr_code(url: &str, id: &str, output_dir: &Path) -> Result<PathBuf> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::H)
        .map_err(|e| PacketError::Image(format!("cannot encode {url} as QR code: {e}")))?;

    let modules = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(MODULE_PX, MODULE_PX)
        .build();

    let border = BORDER_MODULES * MODULE_PX;
    let mut canvas = ImageBuffer::from_pixel(
        modules.width() + 2 * border,
        modules.height() + 2 * border,
        Luma([255u8]),
    );
    imageops::overlay(&mut canvas, &modules, i64::from(border), i64::from(border));

    std::fs::create_dir_all(output_dir).map_err(|e| PacketError::io(output_dir, e))?;
    let path = output_dir.join(format!("{id} QRCode.png"));
    canvas
        .save(&path)
        .map_err(|e| PacketError::Image(format!("{}: {e}", path.display())))?;

    debug!(path = %path.display(), size = canvas.width(), "wrote QR code");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_square_code_with_white_border() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_qr_code("https://arxiv.org/abs/2307.03718", "frontier_ai_regulation", dir.path())
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "frontier_ai_regulation QRCode.png");
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % MODULE_PX, 0);
        // Border is white; the finder pattern starts dark just inside it.
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(MODULE_PX, MODULE_PX).0[0], 0);
    }

    #[test]
    fn longer_urls_need_larger_codes() {
        let dir = tempfile::tempdir().unwrap();
        let short = make_qr_code("https://a.io", "short", dir.path()).unwrap();
        let long_url = format!("https://example.com/{}", "segment/".repeat(20));
        let long = make_qr_code(&long_url, "long", dir.path()).unwrap();

        let short_w = image::open(&short).unwrap().width();
        let long_w = image::open(&long).unwrap().width();
        assert!(long_w > short_w);
    }
}
