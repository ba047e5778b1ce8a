use imageproc::point::Point;
use thiserror::Error;

use crate::types::{Bubble, BubbleId, Choice, PaperSize, Size, LETTER_COUNT};

/// All lengths below are given in pixels at this resolution and scaled to
/// the configured resolution.
pub const REFERENCE_PIXELS_PER_INCH: f32 = 283.0;

/// Exams with more questions than this use three answer columns.
pub const TWO_COLUMN_QUESTION_LIMIT: u32 = 48;
pub const TWO_COLUMN_FIRST_COLUMN_ROWS: u32 = 24;
pub const THREE_COLUMN_COLUMN_ROWS: u32 = 25;

pub const SEAT_DIGIT_POSITIONS: u8 = 4;
pub const SEAT_DIGIT_VALUES: u8 = 10;
pub const MODEL_SLOTS: u8 = 6;

/// Rows of exam details printed in the left header column.
pub const HEADER_FIELD_ROWS: usize = 11;

/// Labels of the seat number rows, top to bottom.
pub const SEAT_DIGIT_LABELS: [&str; SEAT_DIGIT_POSITIONS as usize] =
    ["Units:", "Tens:", "Hundreds:", "Thousands:"];

const CONTENT_TOP: f32 = 50.0;
const SIDE_MARGIN: f32 = 80.0;
const FIELD_ROW_HEIGHT: f32 = 70.0;
const FIELD_VALUE_OFFSET: f32 = 320.0;
const RIGHT_COLUMN_OFFSET: f32 = 40.0;
const NAME_TO_SEAT_LABEL: f32 = 70.0;
const TEXT_HEIGHT: f32 = 22.0;
const SEAT_TOP_PADDING: f32 = 50.0;
const SEAT_BUBBLE_OFFSET: f32 = 230.0;
const SEAT_LABEL_OFFSET: f32 = 20.0;
const HEADER_BUBBLE_RADIUS: f32 = 25.0;
const HEADER_BUBBLE_GAP: f32 = 60.0;
const SEAT_ROW_GAP: f32 = 20.0;
const MODEL_LABEL_GAP: f32 = 40.0;
const MODEL_BUBBLE_DROP: f32 = 30.0;
const MODEL_BOTTOM_PADDING: f32 = 15.0;
const HEADER_GAP: f32 = 40.0;
const DIVIDER_OVERHANG: f32 = 25.0;
const QUESTION_TOP_GAP: f32 = 80.0;
const QUESTION_LABEL_WIDTH: f32 = 50.0;
const QUESTION_BUBBLE_LIFT: f32 = 5.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutConfigError {
    #[error("an exam needs at least one question")]
    NoQuestions,
    #[error("choice count must be between 1 and 26, got {0}")]
    InvalidChoiceCount(u32),
    #[error("pixels per inch must be positive")]
    InvalidResolution,
}

/// Everything the bubble positions depend on. Sheets must be detected with
/// the same configuration they were generated with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExamLayoutConfig {
    pub paper_size: PaperSize,
    pub pixels_per_inch: u32,
    pub question_count: u32,
    pub choice_count: u32,
    pub model_section: bool,
}

impl ExamLayoutConfig {
    pub fn validate(&self) -> Result<(), LayoutConfigError> {
        if self.question_count == 0 {
            return Err(LayoutConfigError::NoQuestions);
        }
        if self.choice_count == 0 || self.choice_count > LETTER_COUNT as u32 {
            return Err(LayoutConfigError::InvalidChoiceCount(self.choice_count));
        }
        if self.pixels_per_inch == 0 {
            return Err(LayoutConfigError::InvalidResolution);
        }
        Ok(())
    }

    pub fn canvas_size(&self) -> Size<u32> {
        self.paper_size.canvas_size(self.pixels_per_inch)
    }

    pub fn column_count(&self) -> u32 {
        column_count(self.question_count)
    }

    pub fn column_question_counts(&self) -> Vec<u32> {
        column_question_counts(self.question_count)
    }

    /// Ratio of this resolution to the reference resolution.
    pub fn scale(&self) -> f32 {
        self.pixels_per_inch as f32 / REFERENCE_PIXELS_PER_INCH
    }
}

pub fn column_count(question_count: u32) -> u32 {
    if question_count > TWO_COLUMN_QUESTION_LIMIT {
        3
    } else {
        2
    }
}

/// Splits the questions over the answer columns. Earlier columns are filled
/// up to their row limit and the last column takes the remainder.
pub fn column_question_counts(question_count: u32) -> Vec<u32> {
    if column_count(question_count) == 2 {
        let first = question_count.min(TWO_COLUMN_FIRST_COLUMN_ROWS);
        vec![first, question_count - first]
    } else {
        let first = question_count.min(THREE_COLUMN_COLUMN_ROWS);
        let second = (question_count - first).min(THREE_COLUMN_COLUMN_ROWS);
        vec![first, second, question_count - first - second]
    }
}

/// Spacing of the answer grid; tighter when three columns must fit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuestionGridMetrics {
    pub bubble_radius: f32,
    pub choice_spacing: f32,
    pub row_spacing: f32,
    pub column_margin: f32,
    pub label_gap: f32,
}

impl QuestionGridMetrics {
    pub fn for_config(config: &ExamLayoutConfig) -> Self {
        let scale = config.scale();
        let reference = if config.column_count() == 2 {
            Self {
                bubble_radius: 28.0,
                choice_spacing: 140.0,
                row_spacing: 85.0,
                column_margin: 120.0,
                label_gap: 50.0,
            }
        } else {
            Self {
                bubble_radius: 23.0,
                choice_spacing: 90.0,
                row_spacing: 65.0,
                column_margin: 50.0,
                label_gap: 45.0,
            }
        };
        Self {
            bubble_radius: reference.bubble_radius * scale,
            choice_spacing: reference.choice_spacing * scale,
            row_spacing: reference.row_spacing * scale,
            column_margin: reference.column_margin * scale,
            label_gap: reference.label_gap * scale,
        }
    }
}

/// The header: exam details on the left, seat number and model bubbles on
/// the right. Text anchors are baseline-left.
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderGrid {
    pub field_origins: Vec<Point<f32>>,
    pub field_value_x: f32,
    pub name_label_origin: Point<f32>,
    pub seat_label_origin: Point<f32>,
    pub digit_label_origins: Vec<Point<f32>>,
    /// One row of ten bubbles per digit position, units first.
    pub seat_bubbles: Vec<Vec<Bubble>>,
    pub model_label_origin: Option<Point<f32>>,
    pub model_bubbles: Vec<Bubble>,
    pub divider_x: f32,
    pub divider_top: f32,
    pub rule_left: f32,
    pub rule_right: f32,
    /// Where the rule under the header is drawn.
    pub rule_y: f32,
    pub question_grid_top: f32,
}

pub fn compute_header_grid(config: &ExamLayoutConfig) -> HeaderGrid {
    let scale = config.scale();
    let canvas = config.canvas_size();
    let px = |reference: f32| reference * scale;

    let content_top = px(CONTENT_TOP);
    let rule_left = px(SIDE_MARGIN);
    let rule_right = canvas.width as f32 - px(SIDE_MARGIN);
    let divider_x = (canvas.width / 2) as f32;

    let field_origins = (0..HEADER_FIELD_ROWS)
        .map(|i| Point::new(rule_left, content_top + i as f32 * px(FIELD_ROW_HEIGHT)))
        .collect::<Vec<_>>();
    let fields_bottom = content_top + HEADER_FIELD_ROWS as f32 * px(FIELD_ROW_HEIGHT);

    let right_x = divider_x + px(RIGHT_COLUMN_OFFSET);
    let name_label_origin = Point::new(right_x, content_top);
    let seat_label_origin = Point::new(right_x, content_top + px(NAME_TO_SEAT_LABEL));

    let radius = px(HEADER_BUBBLE_RADIUS);
    let bubble_gap = px(HEADER_BUBBLE_GAP);
    let bubbles_x = right_x + px(SEAT_BUBBLE_OFFSET);
    let seat_row_pitch = 2.0 * radius + px(SEAT_ROW_GAP);
    let seat_top = seat_label_origin.y + px(TEXT_HEIGHT) + px(SEAT_TOP_PADDING);

    let mut digit_label_origins = Vec::with_capacity(SEAT_DIGIT_POSITIONS as usize);
    let mut seat_bubbles = Vec::with_capacity(SEAT_DIGIT_POSITIONS as usize);
    for position in 0..SEAT_DIGIT_POSITIONS {
        let row_y = seat_top + position as f32 * seat_row_pitch;
        digit_label_origins.push(Point::new(
            right_x + px(SEAT_LABEL_OFFSET),
            row_y + px(TEXT_HEIGHT) / 2.0,
        ));
        seat_bubbles.push(
            (0..SEAT_DIGIT_VALUES)
                .map(|digit| {
                    Bubble::new(
                        bubbles_x + digit as f32 * bubble_gap,
                        row_y,
                        radius,
                        BubbleId::SeatDigit { position, digit },
                    )
                })
                .collect(),
        );
    }
    let seat_bottom = seat_top + SEAT_DIGIT_POSITIONS as f32 * seat_row_pitch;

    let (model_label_origin, model_bubbles, right_bottom) = if config.model_section {
        let label_y = seat_bottom + px(MODEL_LABEL_GAP);
        let bubbles_y = label_y + px(MODEL_BUBBLE_DROP);
        let bubbles = (1..=MODEL_SLOTS)
            .map(|slot| {
                Bubble::new(
                    bubbles_x + (slot - 1) as f32 * bubble_gap,
                    bubbles_y,
                    radius,
                    BubbleId::Model { slot },
                )
            })
            .collect();
        (
            Some(Point::new(right_x, label_y)),
            bubbles,
            bubbles_y + 2.0 * radius + px(MODEL_BOTTOM_PADDING),
        )
    } else {
        (None, vec![], seat_bottom)
    };

    let rule_y = fields_bottom.max(right_bottom) + px(HEADER_GAP);

    HeaderGrid {
        field_origins,
        field_value_x: rule_left + px(FIELD_VALUE_OFFSET),
        name_label_origin,
        seat_label_origin,
        digit_label_origins,
        seat_bubbles,
        model_label_origin,
        model_bubbles,
        divider_x,
        divider_top: content_top - px(DIVIDER_OVERHANG),
        rule_left,
        rule_right,
        rule_y,
        question_grid_top: rule_y + px(QUESTION_TOP_GAP),
    }
}

/// One printed question: its number label and a bubble per choice.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionRow {
    pub number: u32,
    pub label_origin: Point<f32>,
    pub bubbles: Vec<Bubble>,
}

/// Lays out the answer bubbles column by column starting at `top`.
pub fn compute_question_grid(config: &ExamLayoutConfig, top: f32) -> Vec<QuestionRow> {
    let metrics = QuestionGridMetrics::for_config(config);
    let canvas = config.canvas_size();
    let counts = config.column_question_counts();
    let column_width =
        (canvas.width as f32 - 2.0 * metrics.column_margin) / counts.len() as f32;
    let bubble_offset = QUESTION_LABEL_WIDTH * config.scale() + metrics.label_gap;
    let lift = QUESTION_BUBBLE_LIFT * config.scale();

    let mut rows = Vec::with_capacity(config.question_count as usize);
    let mut number = 1;
    for (column, count) in counts.iter().enumerate() {
        let column_x = metrics.column_margin + column as f32 * column_width;
        for row in 0..*count {
            let y = top + row as f32 * metrics.row_spacing;
            let bubbles = (0..config.choice_count as u8)
                .filter_map(Choice::new)
                .map(|choice| {
                    Bubble::new(
                        column_x + bubble_offset + choice.index() as f32 * metrics.choice_spacing,
                        y - lift,
                        metrics.bubble_radius,
                        BubbleId::Answer {
                            question: number,
                            choice,
                        },
                    )
                })
                .collect();
            rows.push(QuestionRow {
                number,
                label_origin: Point::new(column_x, y),
                bubbles,
            });
            number += 1;
        }
    }
    rows
}

/// The complete set of bubble positions for one exam configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetGeometry {
    pub config: ExamLayoutConfig,
    pub canvas_size: Size<u32>,
    pub header: HeaderGrid,
    pub questions: Vec<QuestionRow>,
}

impl SheetGeometry {
    pub fn bubbles(&self) -> impl Iterator<Item = &Bubble> {
        self.header
            .seat_bubbles
            .iter()
            .flatten()
            .chain(self.header.model_bubbles.iter())
            .chain(self.questions.iter().flat_map(|row| row.bubbles.iter()))
    }

    /// Whether every bubble lies inside the canvas.
    pub fn fits_on_page(&self) -> bool {
        let width = self.canvas_size.width as f32;
        let height = self.canvas_size.height as f32;
        self.bubbles().all(|bubble| {
            bubble.center.x - bubble.radius >= 0.0
                && bubble.center.y - bubble.radius >= 0.0
                && bubble.center.x + bubble.radius < width
                && bubble.center.y + bubble.radius < height
        })
    }
}

pub fn compute_sheet_geometry(
    config: &ExamLayoutConfig,
) -> Result<SheetGeometry, LayoutConfigError> {
    config.validate()?;
    let header = compute_header_grid(config);
    let questions = compute_question_grid(config, header.question_grid_top);
    Ok(SheetGeometry {
        config: *config,
        canvas_size: config.canvas_size(),
        header,
        questions,
    })
}
