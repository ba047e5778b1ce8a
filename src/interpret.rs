use std::fmt::Display;
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::debug;
use logging_timer::time;
use rusttype::Font;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debug::ImageDebugWriter;
use crate::geometry::{SheetGeometry, SEAT_DIGIT_POSITIONS};
use crate::image_utils::{
    binarize, matches_aspect_ratio, sample_fill_ratio, select_best, size_image_to_fit,
    DEFAULT_BINARIZE_THRESHOLD,
};
use crate::types::{Bubble, BubbleId, Choice, ModelId};

/// Stands in for a digit, model or answer that could not be read.
pub const PLACEHOLDER: char = '_';

pub const DEFAULT_MARK_THRESHOLD: f32 = 0.3;

/// Fraction of a bubble's radius that is sampled, keeping the printed
/// outline out of the sample.
pub const DEFAULT_SAMPLE_SCALE: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct DetectionOptions {
    pub mark_threshold: f32,
    pub sample_scale: f32,
    pub binarize_threshold: u8,
    pub debug: bool,
    /// Used to print fill ratios on debug images.
    pub debug_font: Option<Font<'static>>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            mark_threshold: DEFAULT_MARK_THRESHOLD,
            sample_scale: DEFAULT_SAMPLE_SCALE,
            binarize_threshold: DEFAULT_BINARIZE_THRESHOLD,
            debug: false,
            debug_font: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("mark threshold must be at least 0 and below 1, got {0}")]
pub struct InvalidMarkThreshold(pub f32);

/// A fill ratio threshold outside `[0, 1)` would either never select a
/// bubble or select any bubble with ink in it.
pub fn check_mark_threshold(threshold: f32) -> Result<f32, InvalidMarkThreshold> {
    if (0.0..1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(InvalidMarkThreshold(threshold))
    }
}

#[derive(Debug, Error)]
pub enum InterpretSheetError {
    #[error("unable to open image {0}")]
    ImageOpen(PathBuf, #[source] image::ImageError),
    #[error("image {0} has unexpected dimensions {1:?}")]
    UnexpectedDimensions(PathBuf, (u32, u32)),
}

/// One question as read from a sheet; `answer` is `None` when no bubble was
/// clearly filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedAnswer {
    pub question: u32,
    #[serde(with = "choice_letter")]
    pub answer: Option<Choice>,
}

impl MarkedAnswer {
    pub fn letter(&self) -> char {
        self.answer.map_or(PLACEHOLDER, |choice| choice.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub seat_number: String,
    pub model_number: String,
    pub answers: Vec<MarkedAnswer>,
}

impl RecognitionResult {
    /// The detected model, if one was read.
    pub fn model_id(&self) -> Option<ModelId> {
        self.model_number.parse().ok()
    }
}

impl Display for RecognitionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "seat {} model {}: {}",
            self.seat_number,
            self.model_number,
            self.answers
                .iter()
                .map(|answer| answer.letter().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}

mod choice_letter {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::PLACEHOLDER;
    use crate::types::Choice;

    pub fn serialize<S: Serializer>(choice: &Option<Choice>, serializer: S) -> Result<S::Ok, S::Error> {
        let letter = choice.map_or(PLACEHOLDER, |choice| choice.letter());
        serializer.serialize_str(&letter.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Choice>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(PLACEHOLDER), None) => Ok(None),
            (Some(letter), None) => Choice::from_letter(letter)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid choice: {}", s))),
            _ => Err(serde::de::Error::custom(format!("Invalid choice: {}", s))),
        }
    }
}

/// A sampled bubble, kept for debug output.
#[derive(Debug, Clone, Copy)]
pub struct ScoredBubble {
    pub bubble: Bubble,
    pub sample_radius: f32,
    pub fill_ratio: f32,
    pub selected: bool,
}

/// Samples a group of bubbles and picks the filled one, recording every
/// sample in `scored`.
fn select_filled_bubble(
    mask: &GrayImage,
    group: &[Bubble],
    options: &DetectionOptions,
    scored: &mut Vec<ScoredBubble>,
) -> Option<BubbleId> {
    let first_scored = scored.len();
    let candidates = group
        .iter()
        .map(|bubble| {
            let sample_radius = bubble.radius * options.sample_scale;
            let fill_ratio = sample_fill_ratio(mask, bubble.center, sample_radius);
            scored.push(ScoredBubble {
                bubble: *bubble,
                sample_radius,
                fill_ratio,
                selected: false,
            });
            (bubble.id, fill_ratio)
        })
        .collect::<Vec<_>>();

    let selected = select_best(candidates, options.mark_threshold);
    if let Some(id) = selected {
        if let Some(scored_bubble) = scored[first_scored..]
            .iter_mut()
            .find(|scored_bubble| scored_bubble.bubble.id == id)
        {
            scored_bubble.selected = true;
        }
    }
    selected
}

/// Reads the seat number, most significant digit first. Unreadable digits
/// become [`PLACEHOLDER`].
pub fn extract_seat_number(
    mask: &GrayImage,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
    scored: &mut Vec<ScoredBubble>,
) -> String {
    let mut digits = geometry
        .header
        .seat_bubbles
        .iter()
        .map(|row| match select_filled_bubble(mask, row, options, scored) {
            Some(BubbleId::SeatDigit { digit, .. }) => (b'0' + digit) as char,
            _ => PLACEHOLDER,
        })
        .collect::<Vec<_>>();

    // rows are printed units first
    digits.reverse();

    if digits.iter().all(|digit| *digit == PLACEHOLDER) {
        return PLACEHOLDER.to_string().repeat(SEAT_DIGIT_POSITIONS as usize);
    }
    digits.into_iter().collect()
}

/// Reads the filled model slot as a 1-based index.
pub fn extract_model_number(
    mask: &GrayImage,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
    scored: &mut Vec<ScoredBubble>,
) -> String {
    match select_filled_bubble(mask, &geometry.header.model_bubbles, options, scored) {
        Some(BubbleId::Model { slot }) => slot.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Reads one answer per question of the sheet, in question order.
pub fn extract_answers(
    mask: &GrayImage,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
    scored: &mut Vec<ScoredBubble>,
) -> Vec<MarkedAnswer> {
    geometry
        .questions
        .iter()
        .map(|row| {
            let answer = match select_filled_bubble(mask, &row.bubbles, options, scored) {
                Some(BubbleId::Answer { choice, .. }) => Some(choice),
                _ => None,
            };
            MarkedAnswer {
                question: row.number,
                answer,
            }
        })
        .collect()
}

/// Reads a binarized sheet.
#[time]
pub fn interpret_mask(
    mask: &GrayImage,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
) -> (RecognitionResult, Vec<ScoredBubble>) {
    let mut scored = Vec::with_capacity(geometry.bubbles().count());
    let seat_number = extract_seat_number(mask, geometry, options, &mut scored);
    let model_number = extract_model_number(mask, geometry, options, &mut scored);
    let answers = extract_answers(mask, geometry, options, &mut scored);

    (
        RecognitionResult {
            seat_number,
            model_number,
            answers,
        },
        scored,
    )
}

/// Loads a scanned sheet and brings it to the canvas size of `geometry`.
#[time]
pub fn load_sheet_image(
    image_path: &Path,
    geometry: &SheetGeometry,
) -> Result<GrayImage, InterpretSheetError> {
    let img = match image::open(image_path) {
        Ok(img) => img.into_luma8(),
        Err(e) => {
            return Err(InterpretSheetError::ImageOpen(
                image_path.to_path_buf(),
                e,
            ))
        }
    };

    if !matches_aspect_ratio(img.dimensions(), geometry.canvas_size) {
        return Err(InterpretSheetError::UnexpectedDimensions(
            image_path.to_path_buf(),
            img.dimensions(),
        ));
    }

    Ok(size_image_to_fit(
        img,
        geometry.canvas_size.width,
        geometry.canvas_size.height,
    ))
}

/// Reads an already loaded grayscale sheet.
pub fn interpret_image(
    img: &GrayImage,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
    debug: &ImageDebugWriter,
) -> RecognitionResult {
    let mask = binarize(img, options.binarize_threshold);
    let (result, scored) = interpret_mask(&mask, geometry, options);
    debug.write("scored_bubbles", |canvas| {
        debug.draw_scored_bubbles_mut(canvas, &scored);
    });
    result
}

#[time]
pub fn interpret_sheet(
    image_path: &Path,
    geometry: &SheetGeometry,
    options: &DetectionOptions,
) -> Result<RecognitionResult, InterpretSheetError> {
    let img = load_sheet_image(image_path, geometry)?;

    let debug = if options.debug {
        ImageDebugWriter::new(image_path.to_path_buf(), img.clone())
            .with_font(options.debug_font.clone())
    } else {
        ImageDebugWriter::disabled()
    };

    let result = interpret_image(&img, geometry, options, &debug);
    debug!("{}: {}", image_path.display(), result);
    Ok(result)
}
