use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_circle_mut, draw_text_mut, text_size},
    rect::Rect,
};
use log::{debug, warn};
use rusttype::{Font, Scale};

use crate::{
    image_utils::{BLUE, DARK_GREEN, RED, WHITE_RGB},
    interpret::ScoredBubble,
};

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, label: &str) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_{}.png",
        base.file_stem().unwrap_or_default().to_string_lossy(),
        label
    ));
    result
}

/// Writes annotated copies of a sheet image next to the input when
/// enabled, and does nothing otherwise.
pub struct ImageDebugWriter {
    input_path: PathBuf,
    input_image: Option<GrayImage>,
    font: Option<Font<'static>>,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf, input_image: GrayImage) -> Self {
        Self {
            input_path,
            input_image: Some(input_image),
            font: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            input_path: PathBuf::new(),
            input_image: None,
            font: None,
        }
    }

    /// Labels sampled bubbles with their fill ratio.
    pub fn with_font(mut self, font: Option<Font<'static>>) -> Self {
        self.font = font;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.input_image.is_some()
    }

    /// Draws on a color copy of the input image and saves it under `label`.
    pub fn write(&self, label: &str, draw: impl FnOnce(&mut RgbImage)) -> Option<PathBuf> {
        let input_image = self.input_image.as_ref()?;
        let mut canvas = DynamicImage::ImageLuma8(input_image.clone()).into_rgb8();
        draw(&mut canvas);

        let path = debug_image_path(&self.input_path, label);
        match canvas.save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("unable to write debug image {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Outlines every sampled region: green where a bubble was selected, red
    /// where it was sampled but not selected, blue where nothing was found.
    pub fn draw_scored_bubbles_mut(&self, canvas: &mut RgbImage, scored_bubbles: &[ScoredBubble]) {
        let scale = Scale::uniform(14.0);
        for scored_bubble in scored_bubbles {
            let color = if scored_bubble.selected {
                DARK_GREEN
            } else if scored_bubble.fill_ratio > 0.0 {
                RED
            } else {
                BLUE
            };
            let (x, y) = scored_bubble.bubble.pixel_center();
            let radius = scored_bubble.sample_radius.round() as i32;
            draw_hollow_circle_mut(canvas, (x, y), radius, color);
            draw_hollow_circle_mut(canvas, (x, y), radius + 1, color);

            if let Some(font) = &self.font {
                let text = format!("{:.2}", scored_bubble.fill_ratio);
                draw_text_with_background_mut(
                    canvas,
                    &text,
                    x - radius,
                    y + radius + 2,
                    scale,
                    font,
                    color,
                    WHITE_RGB,
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_text_with_background_mut(
    canvas: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: Scale,
    font: &Font,
    text_color: Rgb<u8>,
    background_color: Rgb<u8>,
) {
    let (text_width, text_height) = text_size(scale, font, text);
    if text_width <= 0 || text_height <= 0 {
        return;
    }

    draw_filled_rect_mut(
        canvas,
        Rect::at(x, y).of_size(text_width as u32, text_height as u32),
        background_color,
    );
    draw_text_mut(canvas, text_color, x, y, scale, font, text);
}
