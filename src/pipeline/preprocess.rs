//! Line-contrast normalization ahead of detection.
//!
//! Floor-plan line art is low contrast and scans carry grain. A hard
//! luminance threshold isolates wall and door linework as pure black on
//! white; an optional 3x3 erosion thickens thin strokes.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::erode_mut;
use tracing::debug;

use super::PipelineError;

/// Background value after binarization.
pub const BACKGROUND: u8 = 255;
/// Foreground (linework) value after binarization.
pub const FOREGROUND: u8 = 0;
/// Upper bound on erosion passes.
pub const MAX_EROSION_PASSES: u8 = 2;

/// Binarization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Luminance strictly above this becomes background.
    pub binary_threshold: u8,
    /// Number of 3x3 minimum-filter passes, clamped to `MAX_EROSION_PASSES`.
    pub erosion_passes: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 250,
            erosion_passes: 0,
        }
    }
}

/// Full preprocessing: luminance -> threshold -> optional erosion -> RGB.
pub fn preprocess(image: &RgbImage, config: &PreprocessConfig) -> RgbImage {
    let gray = rgb_to_gray(image);
    let mut mask = binarize(&gray, config.binary_threshold);

    let passes = config.erosion_passes.min(MAX_EROSION_PASSES);
    for _ in 0..passes {
        erode_lines(&mut mask);
    }

    debug!(
        width = mask.width(),
        height = mask.height(),
        threshold = config.binary_threshold,
        erosion_passes = passes,
        "Binarized image"
    );

    DynamicImage::ImageLuma8(mask).to_rgb8()
}

/// Convert RGB to grayscale using ITU-R BT.601 luminance, rounded.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        let [r, g, b] = p.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        gray.put_pixel(x, y, Luma([luma as u8]));
    }
    gray
}

/// Map each pixel to `BACKGROUND` when luminance > `threshold`, else `FOREGROUND`.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = if *v > threshold { BACKGROUND } else { FOREGROUND };
    }
    out
}

/// One 3x3 minimum-filter pass. Dark strokes grow by one pixel in every direction.
pub fn erode_lines(mask: &mut GrayImage) {
    erode_mut(mask, Norm::LInf, 1);
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PipelineError::Encoding(format!("PNG: {e}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    /// Gradient plan with a faint grey line and a dark wall.
    fn sample_plan() -> RgbImage {
        RgbImage::from_fn(40, 30, |x, y| {
            if x == 10 {
                Rgb([30, 30, 30])
            } else if y == 5 {
                Rgb([245, 245, 245])
            } else {
                let v = 200 + ((x + y) % 56) as u8;
                Rgb([v, v.saturating_sub(3), v])
            }
        })
    }

    fn is_two_level(img: &RgbImage) -> bool {
        img.pixels().all(|p| {
            let [r, g, b] = p.0;
            r == g && g == b && (r == BACKGROUND || r == FOREGROUND)
        })
    }

    #[test]
    fn output_is_pure_black_and_white() {
        let out = preprocess(&sample_plan(), &PreprocessConfig::default());
        assert!(is_two_level(&out));
        assert_eq!(out.dimensions(), (40, 30));
    }

    #[test]
    fn every_gray_level_maps_to_black_or_white() {
        let ramp = RgbImage::from_fn(256, 1, |x, _| Rgb([x as u8, x as u8, x as u8]));
        for threshold in [0, 128, 250, 254, 255] {
            let config = PreprocessConfig {
                binary_threshold: threshold,
                erosion_passes: 0,
            };
            let out = preprocess(&ramp, &config);
            assert!(is_two_level(&out), "threshold {threshold}");
            for (x, _, p) in out.enumerate_pixels() {
                let expected = if (x as u8) > threshold { BACKGROUND } else { FOREGROUND };
                assert_eq!(p.0[0], expected, "gray {x} at threshold {threshold}");
            }
        }
    }

    #[test]
    fn noisy_colour_images_become_two_level() {
        // Deterministic xorshift noise across the full RGB range
        let mut state: u32 = 0x9E37_79B9;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        for passes in 0..=MAX_EROSION_PASSES {
            let bytes: Vec<u8> = (0..32 * 24 * 3).map(|_| next() as u8).collect();
            let img = RgbImage::from_raw(32, 24, bytes).unwrap();
            let config = PreprocessConfig {
                binary_threshold: 250,
                erosion_passes: passes,
            };
            let out = preprocess(&img, &config);
            assert!(is_two_level(&out), "erosion passes {passes}");
            if passes == 0 {
                assert_eq!(preprocess(&out, &config), out);
            }
        }
    }

    #[test]
    fn preprocessing_is_idempotent() {
        let config = PreprocessConfig::default();
        let once = preprocess(&sample_plan(), &config);
        let twice = preprocess(&once, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn luminance_uses_bt601_weights() {
        let img = RgbImage::from_raw(3, 1, vec![255, 0, 0, 0, 255, 0, 255, 255, 255]).unwrap();
        let gray = rgb_to_gray(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let gray = GrayImage::from_raw(3, 1, vec![249, 250, 251]).unwrap();
        let out = binarize(&gray, 250);
        assert_eq!(out.as_raw(), &vec![FOREGROUND, FOREGROUND, BACKGROUND]);
    }

    #[test]
    fn threshold_is_configurable() {
        let img = RgbImage::from_pixel(2, 2, Rgb([245, 245, 245]));
        let strict = preprocess(
            &img,
            &PreprocessConfig {
                binary_threshold: 250,
                erosion_passes: 0,
            },
        );
        let lenient = preprocess(
            &img,
            &PreprocessConfig {
                binary_threshold: 240,
                erosion_passes: 0,
            },
        );
        assert_eq!(strict.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(lenient.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn erosion_thickens_a_single_pixel_line() {
        let mut mask = GrayImage::from_pixel(7, 7, Luma([BACKGROUND]));
        for y in 0..7 {
            mask.put_pixel(3, y, Luma([FOREGROUND]));
        }
        erode_lines(&mut mask);
        for y in 0..7 {
            assert_eq!(mask.get_pixel(2, y).0[0], FOREGROUND);
            assert_eq!(mask.get_pixel(3, y).0[0], FOREGROUND);
            assert_eq!(mask.get_pixel(4, y).0[0], FOREGROUND);
            assert_eq!(mask.get_pixel(1, y).0[0], BACKGROUND);
            assert_eq!(mask.get_pixel(5, y).0[0], BACKGROUND);
        }
    }

    #[test]
    fn erosion_does_not_darken_from_image_border() {
        let mut mask = GrayImage::from_pixel(5, 5, Luma([BACKGROUND]));
        erode_lines(&mut mask);
        assert!(mask.pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn erosion_passes_are_capped() {
        let mut img = RgbImage::from_pixel(21, 21, Rgb([255, 255, 255]));
        img.put_pixel(10, 10, Rgb([0, 0, 0]));
        let config = PreprocessConfig {
            binary_threshold: 250,
            erosion_passes: 9,
        };
        let out = preprocess(&img, &config);
        // Two passes grow the dot to a 5x5 square and no further.
        assert_eq!(out.get_pixel(8, 8), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(12, 12), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(7, 10), &Rgb([255, 255, 255]));
        assert!(is_two_level(&out));
    }

    #[test]
    fn encode_png_roundtrips_dimensions() {
        let img = RgbImage::from_pixel(6, 4, Rgb([255, 0, 0]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }
}
