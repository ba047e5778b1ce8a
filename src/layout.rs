use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use image::GrayImage;
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut,
        text_size,
    },
    point::Point,
};
use log::{info, warn};
use logging_timer::time;
use rayon::prelude::*;
use rusttype::{Font, Scale};
use thiserror::Error;

use crate::exam::{ExamDefinition, ExamDetails};
use crate::geometry::{
    compute_sheet_geometry, LayoutConfigError, SheetGeometry, MODEL_SLOTS, SEAT_DIGIT_LABELS,
};
use crate::image_utils::{BLACK, WHITE};
use crate::types::{Bubble, BubbleId};

/// Em size of header text at the reference resolution.
const HEADER_TEXT_SIZE: f32 = 30.0;

/// Em size of a bubble label relative to the bubble radius.
const BUBBLE_LABEL_SIZE: f32 = 1.2;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid exam layout")]
    Layout(#[from] LayoutConfigError),
    #[error("unable to read font {0}")]
    FontRead(PathBuf, #[source] io::Error),
    #[error("{0} is not a usable font")]
    InvalidFont(PathBuf),
    #[error("unable to create output directory {0}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("unable to write sheet {0}")]
    Save(PathBuf, #[source] image::ImageError),
}

/// The font sheets are labelled with unless another one is configured.
pub fn default_font() -> Font<'static> {
    Font::try_from_bytes(include_bytes!("../fonts/DejaVuSans.ttf")).expect("font is valid")
}

pub fn load_font(path: &Path) -> Result<Font<'static>, GenerateError> {
    let bytes = std::fs::read(path).map_err(|e| GenerateError::FontRead(path.to_path_buf(), e))?;
    Font::try_from_vec(bytes).ok_or_else(|| GenerateError::InvalidFont(path.to_path_buf()))
}

/// The model slot to print filled for `model`, if it is a single letter
/// among the printed model bubbles.
pub fn filled_model_slot(model: Option<&str>) -> Option<u8> {
    let model = model?.trim();
    let mut chars = model.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            let slot = letter.to_ascii_uppercase() as u8 - b'A' + 1;
            (slot <= MODEL_SLOTS).then_some(slot)
        }
        _ => None,
    }
}

/// `bubble_sheet_model_{model}_{questions}_Q.png`
pub fn sheet_file_name(model: Option<&str>, question_count: u32) -> String {
    let model = match model.map(str::trim) {
        Some(model) if !model.is_empty() => model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect(),
        _ => "none".to_string(),
    };
    format!("bubble_sheet_model_{}_{}_Q.png", model, question_count)
}

/// Renders answer sheets with the header text and a label in every bubble.
#[derive(Debug, Clone)]
pub struct SheetRenderer {
    font: Font<'static>,
}

impl Default for SheetRenderer {
    fn default() -> Self {
        Self::new(default_font())
    }
}

impl SheetRenderer {
    pub fn new(font: Font<'static>) -> Self {
        Self { font }
    }

    /// Draws one sheet. When `model` names one of the model bubbles that
    /// bubble is printed filled, marking the sheet as that model's master copy.
    #[time]
    pub fn render_sheet(
        &self,
        geometry: &SheetGeometry,
        details: &ExamDetails,
        model: Option<&str>,
    ) -> GrayImage {
        let mut canvas =
            GrayImage::from_pixel(geometry.canvas_size.width, geometry.canvas_size.height, WHITE);
        let scale = geometry.config.scale();
        let line_width = (2.0 * scale).round().max(1.0) as i32;
        let header = &geometry.header;
        let text_scale = Scale::uniform(HEADER_TEXT_SIZE * scale);

        let fields = details.header_fields(geometry.config.question_count);
        for ((label, value), origin) in fields.iter().zip(&header.field_origins) {
            self.draw_text(&mut canvas, label, *origin, text_scale);
            self.draw_text(
                &mut canvas,
                value,
                Point::new(header.field_value_x, origin.y),
                text_scale,
            );
        }

        self.draw_text(&mut canvas, "Name:", header.name_label_origin, text_scale);
        self.draw_text(&mut canvas, "Seat Num:", header.seat_label_origin, text_scale);
        for (label, origin) in SEAT_DIGIT_LABELS.iter().zip(&header.digit_label_origins) {
            self.draw_text(&mut canvas, label, *origin, text_scale);
        }
        for bubble in header.seat_bubbles.iter().flatten() {
            self.draw_bubble(&mut canvas, bubble, line_width);
        }

        if let Some(origin) = header.model_label_origin {
            self.draw_text(&mut canvas, "Model No.:", origin, text_scale);
        }
        let filled_slot = filled_model_slot(model);
        for bubble in &header.model_bubbles {
            match bubble.id {
                BubbleId::Model { slot } if Some(slot) == filled_slot => {
                    let (x, y) = bubble.pixel_center();
                    draw_filled_circle_mut(&mut canvas, (x, y), bubble.radius.round() as i32, BLACK);
                }
                _ => self.draw_bubble(&mut canvas, bubble, line_width),
            }
        }

        for offset in 0..line_width {
            let offset = offset as f32;
            draw_line_segment_mut(
                &mut canvas,
                (header.rule_left, header.rule_y + offset),
                (header.rule_right, header.rule_y + offset),
                BLACK,
            );
            draw_line_segment_mut(
                &mut canvas,
                (header.divider_x + offset, header.divider_top),
                (header.divider_x + offset, header.rule_y),
                BLACK,
            );
        }

        for row in &geometry.questions {
            self.draw_text(
                &mut canvas,
                &format!("{:02}.", row.number),
                row.label_origin,
                text_scale,
            );
            for bubble in &row.bubbles {
                self.draw_bubble(&mut canvas, bubble, line_width);
            }
        }

        canvas
    }

    /// An outlined bubble with its digit or letter centered inside.
    fn draw_bubble(&self, canvas: &mut GrayImage, bubble: &Bubble, line_width: i32) {
        let (x, y) = bubble.pixel_center();
        let radius = bubble.radius.round() as i32;
        for inset in 0..line_width {
            draw_hollow_circle_mut(canvas, (x, y), radius - inset, BLACK);
        }

        let text = bubble.id.to_string();
        let scale = Scale::uniform(bubble.radius * BUBBLE_LABEL_SIZE);
        let (width, _) = text_size(scale, &self.font, &text);
        let v_metrics = self.font.v_metrics(scale);
        let glyph_height = v_metrics.ascent + v_metrics.descent;
        draw_text_mut(
            canvas,
            BLACK,
            x - width / 2,
            (y as f32 - v_metrics.ascent + glyph_height / 2.0).round() as i32,
            scale,
            &self.font,
            &text,
        );
    }

    /// Draws text whose baseline starts at `origin`.
    fn draw_text(&self, canvas: &mut GrayImage, text: &str, origin: Point<f32>, scale: Scale) {
        if text.is_empty() {
            return;
        }
        let ascent = self.font.v_metrics(scale).ascent;
        draw_text_mut(
            canvas,
            BLACK,
            origin.x.round() as i32,
            (origin.y - ascent).round() as i32,
            scale,
            &self.font,
            text,
        );
    }
}

/// Renders and saves one sheet per model of the exam, or a single sheet
/// without a filled model when the exam has no models.
#[time]
pub fn write_sheets(
    definition: &ExamDefinition,
    out_dir: &Path,
    renderer: &SheetRenderer,
) -> Result<Vec<PathBuf>, GenerateError> {
    let geometry = compute_sheet_geometry(&definition.layout_config())?;
    if !geometry.fits_on_page() {
        warn!(
            "{} questions do not fit on one {:?} page; bubbles past the edge cannot be read",
            definition.question_count, definition.paper_size
        );
    }

    std::fs::create_dir_all(out_dir)
        .map_err(|e| GenerateError::CreateDir(out_dir.to_path_buf(), e))?;

    let models = if definition.models.is_empty() {
        vec![None]
    } else {
        // models that map to the same file are written once
        let mut file_names = HashSet::new();
        definition
            .models
            .iter()
            .map(|model| Some(model.as_str()))
            .filter(|model| {
                let unique = file_names.insert(sheet_file_name(*model, definition.question_count));
                if !unique {
                    warn!("model {:?} is listed more than once; writing its sheet once", model);
                }
                unique
            })
            .collect()
    };

    models
        .par_iter()
        .map(|model| {
            if model.is_some() && filled_model_slot(*model).is_none() {
                warn!("model {:?} has no model bubble; no model will be marked", model);
            }
            let sheet = renderer.render_sheet(&geometry, &definition.details, *model);
            let path = out_dir.join(sheet_file_name(*model, definition.question_count));
            sheet
                .save(&path)
                .map_err(|e| GenerateError::Save(path.clone(), e))?;
            info!("wrote {}", path.display());
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::ImageDebugWriter;
    use crate::geometry::ExamLayoutConfig;
    use crate::image_utils::{binarize, sample_fill_ratio, DEFAULT_BINARIZE_THRESHOLD, FOREGROUND};
    use crate::interpret::{interpret_image, DetectionOptions, DEFAULT_SAMPLE_SCALE};
    use crate::types::PaperSize;
    use imageproc::contrast::threshold;

    fn definition(models: &[&str]) -> ExamDefinition {
        ExamDefinition {
            title: "Quiz".to_string(),
            details: ExamDetails::default(),
            question_count: 12,
            choice_count: 4,
            paper_size: PaperSize::A4,
            pixels_per_inch: 100,
            models: models.iter().map(|m| m.to_string()).collect(),
            mark_threshold: None,
        }
    }

    fn foreground_mask(sheet: &GrayImage) -> GrayImage {
        let mut mask = threshold(sheet, 127);
        image::imageops::invert(&mut mask);
        mask
    }

    #[test]
    fn test_filled_model_slot() {
        assert_eq!(filled_model_slot(Some("A")), Some(1));
        assert_eq!(filled_model_slot(Some("f")), Some(6));
        assert_eq!(filled_model_slot(Some("G")), None);
        assert_eq!(filled_model_slot(Some("AB")), None);
        assert_eq!(filled_model_slot(Some("2")), None);
        assert_eq!(filled_model_slot(Some("")), None);
        assert_eq!(filled_model_slot(None), None);
    }

    #[test]
    fn test_sheet_file_name() {
        assert_eq!(sheet_file_name(Some("B"), 40), "bubble_sheet_model_B_40_Q.png");
        assert_eq!(sheet_file_name(None, 12), "bubble_sheet_model_none_12_Q.png");
        assert_eq!(sheet_file_name(Some("a/b"), 12), "bubble_sheet_model_a_b_12_Q.png");
    }

    #[test]
    fn test_filled_model_bubble_samples_full() {
        let definition = definition(&["C"]);
        let geometry = compute_sheet_geometry(&definition.layout_config()).unwrap();
        let sheet = SheetRenderer::default().render_sheet(&geometry, &definition.details, Some("C"));
        assert_eq!(sheet.dimensions(), (827, 1169));

        let mask = binarize(&sheet, DEFAULT_BINARIZE_THRESHOLD);
        for bubble in &geometry.header.model_bubbles {
            let ratio = sample_fill_ratio(&mask, bubble.center, bubble.radius * DEFAULT_SAMPLE_SCALE);
            if bubble.id == (BubbleId::Model { slot: 3 }) {
                assert!(ratio > 0.95, "filled ratio was {}", ratio);
            } else {
                assert!(ratio < 0.3, "outline ratio was {}", ratio);
            }
        }
    }

    #[test]
    fn test_invalid_model_fills_nothing() {
        let definition = definition(&["Z"]);
        let geometry = compute_sheet_geometry(&definition.layout_config()).unwrap();
        let sheet = SheetRenderer::default().render_sheet(&geometry, &definition.details, Some("Z"));
        let mask = binarize(&sheet, DEFAULT_BINARIZE_THRESHOLD);
        assert!(geometry.bubbles().all(|bubble| {
            sample_fill_ratio(&mask, bubble.center, bubble.radius * DEFAULT_SAMPLE_SCALE) < 0.3
        }));
    }

    #[test]
    fn test_outlines_are_drawn() {
        let definition = definition(&[]);
        let geometry = compute_sheet_geometry(&definition.layout_config()).unwrap();
        let sheet = SheetRenderer::default().render_sheet(&geometry, &definition.details, None);
        let bubble = &geometry.questions[5].bubbles[1];
        let (x, y) = bubble.pixel_center();
        let r = bubble.radius.round() as i32;
        assert_eq!(*sheet.get_pixel((x + r) as u32, y as u32), BLACK);

        // the choice letter is printed inside the outline
        let inner = r / 2;
        let label_pixels = (x - inner..=x + inner)
            .flat_map(|px| (y - inner..=y + inner).map(move |py| (px, py)))
            .filter(|(px, py)| *sheet.get_pixel(*px as u32, *py as u32) != WHITE)
            .count();
        assert!(label_pixels > 0);
        assert_eq!(
            *foreground_mask(&sheet).get_pixel(
                geometry.header.divider_x as u32,
                geometry.header.rule_y as u32 - 5
            ),
            FOREGROUND
        );
    }

    fn non_white_pixels_above(sheet: &GrayImage, origin: Point<f32>, width: f32, height: f32) -> usize {
        let (x0, y0) = (origin.x as u32, (origin.y - height) as u32);
        (x0..x0 + width as u32)
            .flat_map(|x| (y0..origin.y as u32).map(move |y| (x, y)))
            .filter(|(x, y)| *sheet.get_pixel(*x, *y) != WHITE)
            .count()
    }

    #[test]
    fn test_labelled_blank_sheet_reads_blank() {
        let details = ExamDetails {
            university_name: "Example University".to_string(),
            course_name: "Algorithms".to_string(),
            exam_date: "2024-01-15".to_string(),
            ..ExamDetails::default()
        };
        for (pixels_per_inch, question_count) in [(100, 30), (150, 60)] {
            let geometry = compute_sheet_geometry(&ExamLayoutConfig {
                paper_size: PaperSize::A4,
                pixels_per_inch,
                question_count,
                choice_count: 4,
                model_section: true,
            })
            .unwrap();
            let sheet = SheetRenderer::default().render_sheet(&geometry, &details, Some("B"));

            let scale = geometry.config.scale();
            let header = &geometry.header;
            assert!(non_white_pixels_above(&sheet, header.name_label_origin, 100.0 * scale, 25.0 * scale) > 0);
            assert!(non_white_pixels_above(&sheet, header.field_origins[0], 200.0 * scale, 25.0 * scale) > 0);
            assert!(
                non_white_pixels_above(&sheet, geometry.questions[0].label_origin, 40.0 * scale, 25.0 * scale) > 0
            );

            let result = interpret_image(
                &sheet,
                &geometry,
                &DetectionOptions::default(),
                &ImageDebugWriter::disabled(),
            );
            assert_eq!(result.seat_number, "____");
            assert_eq!(result.model_number, "2");
            assert!(
                result.answers.iter().all(|answer| answer.answer.is_none()),
                "labels read as marks at {} ppi: {}",
                pixels_per_inch,
                result
            );
        }
    }

    #[test]
    fn test_write_sheets_skips_repeated_models() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sheets(&definition(&["A", "B", "A"]), dir.path(), &SheetRenderer::default()).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("bubble_sheet_model_A_12_Q.png"),
                dir.path().join("bubble_sheet_model_B_12_Q.png"),
            ]
        );
    }

    #[test]
    fn test_custom_font_renders() {
        let font = load_font(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/fonts/DejaVuSans.ttf"))).unwrap();
        let definition = definition(&["A"]);
        let geometry = compute_sheet_geometry(&definition.layout_config()).unwrap();
        let custom = SheetRenderer::new(font).render_sheet(&geometry, &definition.details, Some("A"));
        let bundled = SheetRenderer::default().render_sheet(&geometry, &definition.details, Some("A"));
        assert_eq!(custom, bundled);
    }

    #[test]
    fn test_write_sheets_one_per_model() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("sheets");
        let paths = write_sheets(&definition(&["A", "B"]), &out_dir, &SheetRenderer::default()).unwrap();
        assert_eq!(
            paths,
            vec![
                out_dir.join("bubble_sheet_model_A_12_Q.png"),
                out_dir.join("bubble_sheet_model_B_12_Q.png"),
            ]
        );
        assert!(paths.iter().all(|path| path.exists()));

        let unmarked = write_sheets(&definition(&[]), &out_dir, &SheetRenderer::default()).unwrap();
        assert_eq!(unmarked, vec![out_dir.join("bubble_sheet_model_none_12_Q.png")]);
    }

    #[test]
    fn test_write_sheets_rejects_invalid_layout() {
        let dir = tempfile::tempdir().unwrap();
        let definition = ExamDefinition {
            question_count: 0,
            ..definition(&["A"])
        };
        assert!(matches!(
            write_sheets(&definition, dir.path(), &SheetRenderer::default()),
            Err(GenerateError::Layout(LayoutConfigError::NoQuestions))
        ));
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_font(&dir.path().join("missing.ttf")),
            Err(GenerateError::FontRead(..))
        ));
        let garbage = dir.path().join("garbage.ttf");
        std::fs::write(&garbage, b"not a font").unwrap();
        assert!(matches!(load_font(&garbage), Err(GenerateError::InvalidFont(_))));
    }
}
