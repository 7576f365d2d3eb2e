//! Background preparation: cover-fit scaling and center crop.

use std::path::Path;

use image::imageops::FilterType;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Scaled size and crop offset that make a source image cover a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverFit {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
}

/// Scale so the image covers `dst_w × dst_h` without distortion, then crop the
/// overflow evenly from both sides of the longer dimension.
pub fn cover_fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> CoverFit {
    let (src_w, src_h) = (src_w.max(1) as u64, src_h.max(1) as u64);
    let (tw, th) = (dst_w as u64, dst_h as u64);

    let (scaled_width, scaled_height) = if src_w * th > src_h * tw {
        // wider than the frame: match height, overflow width
        (div_round(src_w * th, src_h).max(tw), th)
    } else {
        (tw, div_round(src_h * tw, src_w).max(th))
    };

    CoverFit {
        scaled_width: scaled_width as u32,
        scaled_height: scaled_height as u32,
        crop_x: ((scaled_width - tw) / 2) as u32,
        crop_y: ((scaled_height - th) / 2) as u32,
    }
}

fn div_round(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

/// Write a cover-fitted, center-cropped copy of `src` to `dst` as PNG.
pub fn prepare_background(src: &Path, dst: &Path, width: u32, height: u32) -> Result<()> {
    let img = image::open(src)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(PipelineError::Render(format!(
            "{} has no pixels",
            src.display()
        )));
    }

    let fit = cover_fit(img.width(), img.height(), width, height);
    debug!(
        "Cover-fit {}x{} -> {}x{}, crop at ({}, {})",
        img.width(),
        img.height(),
        fit.scaled_width,
        fit.scaled_height,
        fit.crop_x,
        fit.crop_y
    );

    let frame = img
        .resize_exact(fit.scaled_width, fit.scaled_height, FilterType::Lanczos3)
        .crop_imm(fit.crop_x, fit.crop_y, width, height)
        .to_rgb8();
    frame.save_with_format(dst, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const SIZES: &[(u32, u32)] = &[
        (1, 1),
        (3, 1000),
        (1000, 3),
        (1080, 1920),
        (1920, 1080),
        (4000, 3000),
        (640, 640),
        (1081, 1921),
        (777, 1333),
        (5000, 200),
    ];

    #[test]
    fn test_output_is_exact_frame_for_any_aspect() {
        for &(w, h) in SIZES {
            let fit = cover_fit(w, h, 1080, 1920);
            assert!(fit.crop_x + 1080 <= fit.scaled_width, "{w}x{h}: {fit:?}");
            assert!(fit.crop_y + 1920 <= fit.scaled_height, "{w}x{h}: {fit:?}");
            // overflow split evenly, odd pixel goes to the far side
            assert!(fit.scaled_width - 1080 - 2 * fit.crop_x <= 1);
            assert!(fit.scaled_height - 1920 - 2 * fit.crop_y <= 1);
        }
    }

    #[test]
    fn test_one_dimension_matches_frame() {
        for &(w, h) in SIZES {
            let fit = cover_fit(w, h, 1080, 1920);
            assert!(
                fit.scaled_width == 1080 || fit.scaled_height == 1920,
                "{w}x{h}: {fit:?}"
            );
        }
    }

    #[test]
    fn test_aspect_ratio_preserved_before_crop() {
        for &(w, h) in SIZES {
            let fit = cover_fit(w, h, 1080, 1920);
            if fit.scaled_height == 1920 {
                let exact = w as f64 * 1920.0 / h as f64;
                assert!((fit.scaled_width as f64 - exact).abs() <= 0.5, "{w}x{h}: {fit:?}");
            } else {
                let exact = h as f64 * 1080.0 / w as f64;
                assert!((fit.scaled_height as f64 - exact).abs() <= 0.5, "{w}x{h}: {fit:?}");
            }
        }
    }

    #[test]
    fn test_landscape_crops_sides_symmetrically() {
        let fit = cover_fit(1920, 1080, 1080, 1920);
        assert_eq!(fit.scaled_height, 1920);
        assert_eq!(fit.scaled_width, 3413);
        assert_eq!(fit.crop_x, (3413 - 1080) / 2);
        assert_eq!(fit.crop_y, 0);
    }

    #[test]
    fn test_matching_aspect_needs_no_crop() {
        let fit = cover_fit(540, 960, 1080, 1920);
        assert_eq!(
            fit,
            CoverFit {
                scaled_width: 1080,
                scaled_height: 1920,
                crop_x: 0,
                crop_y: 0
            }
        );
    }

    #[test]
    fn test_prepare_background_writes_frame_size() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("wide.jpg");
        let dst = tmp.path().join("background.png");
        RgbImage::from_pixel(400, 300, Rgb([200, 120, 40]))
            .save(&src)
            .unwrap();

        prepare_background(&src, &dst, 108, 192).unwrap();

        let out = image::open(&dst).unwrap();
        assert_eq!((out.width(), out.height()), (108, 192));
        assert!(src.exists());
    }

    #[test]
    fn test_prepare_background_rejects_non_image() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("broken.jpg");
        std::fs::write(&src, b"definitely not a jpeg").unwrap();
        assert!(prepare_background(&src, &tmp.path().join("out.png"), 108, 192).is_err());
    }
}
