use image::{imageops, GrayImage, Luma, Rgb};
use imageproc::{
    contrast::{equalize_histogram, threshold},
    filter::gaussian_blur_f32,
    point::Point,
};
use logging_timer::time;

use crate::types::Size;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

/// Mark pixels in a binarized sheet.
pub const FOREGROUND: Luma<u8> = WHITE;

pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);
pub const DARK_GREEN: Rgb<u8> = Rgb([0, 127, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

/// Binarization threshold for equalized, blurred sheets. Pixels at or below
/// it are marks.
pub const DEFAULT_BINARIZE_THRESHOLD: u8 = 80;

/// Sigma matching a 5×5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;

/// Turns a grayscale scan into a mask where marks are white and paper is
/// black: histogram equalization, a light blur, then an inverted threshold.
#[time]
pub fn binarize(img: &GrayImage, level: u8) -> GrayImage {
    let equalized = equalize_histogram(img);
    let blurred = gaussian_blur_f32(&equalized, BLUR_SIGMA);
    let mut mask = threshold(&blurred, level);
    imageops::invert(&mut mask);
    mask
}

/// Determines the ratio of foreground pixels inside the circle of `radius`
/// around `center`. A circle that is not entirely inside the image is never
/// sampled and scores 0.
pub fn sample_fill_ratio(mask: &GrayImage, center: Point<f32>, radius: f32) -> f32 {
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let r = radius.round() as i64;
    if r <= 0 {
        return 0.0;
    }

    let (width, height) = (mask.width() as i64, mask.height() as i64);
    if cx - r < 0 || cy - r < 0 || cx + r >= width || cy + r >= height {
        return 0.0;
    }

    let mut total = 0u32;
    let mut filled = 0u32;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            total += 1;
            if *mask.get_pixel((cx + dx) as u32, (cy + dy) as u32) == FOREGROUND {
                filled += 1;
            }
        }
    }

    filled as f32 / total as f32
}

/// Picks the candidate with the highest ratio, provided that ratio is above
/// `threshold`. Equal ratios keep the earlier candidate.
pub fn select_best<T>(candidates: impl IntoIterator<Item = (T, f32)>, threshold: f32) -> Option<T> {
    let mut best: Option<(T, f32)> = None;
    for (candidate, ratio) in candidates {
        if ratio.is_nan() {
            continue;
        }
        let is_better = match &best {
            Some((_, best_ratio)) => ratio > *best_ratio,
            None => true,
        };
        if is_better {
            best = Some((candidate, ratio));
        }
    }
    best.filter(|(_, ratio)| *ratio > threshold)
        .map(|(candidate, _)| candidate)
}

/// Whether an image has the same aspect ratio as a canvas, within 1%.
pub fn matches_aspect_ratio(dimensions: (u32, u32), canvas: Size<u32>) -> bool {
    let (width, height) = dimensions;
    if width == 0 || height == 0 {
        return false;
    }
    let aspect_ratio = width as f32 / height as f32;
    let canvas_aspect_ratio = canvas.width as f32 / canvas.height as f32;
    (aspect_ratio - canvas_aspect_ratio).abs() < 0.01
}

/// Resizes an image to exactly `width`×`height` unless it already is.
pub fn size_image_to_fit(img: GrayImage, width: u32, height: u32) -> GrayImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    imageops::resize(&img, width, height, imageops::FilterType::Triangle)
}
