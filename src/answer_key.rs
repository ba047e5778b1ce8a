use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use logging_timer::time;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Choice, ModelId};

/// Name of the worksheet holding the answer key in an exported workbook.
pub const EXAM_DETAILS_SHEET: &str = "Exam Details";

/// Row holding the model name of every block.
pub const MODEL_NAME_ROW: usize = 2;
pub const FIRST_ANSWER_ROW: usize = 3;

/// Each block spans a question column, an answer column and a spacer.
pub const BLOCK_WIDTH: usize = 3;
pub const MAX_MODEL_BLOCKS: usize = 6;

pub const QUESTION_HEADER: &str = "Questions";
pub const ANSWER_HEADER: &str = "Correct Answer";

/// Marks a question without a recorded correct answer.
pub const NO_ANSWER: &str = "-";

/// A spreadsheet cell as exported to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

pub type Row = Vec<Option<Cell>>;

/// Either the worksheet rows themselves or a workbook of named worksheets.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AnswerKeySource {
    Rows(Vec<Row>),
    Workbook(HashMap<String, Vec<Row>>),
}

#[derive(Debug, Error)]
pub enum AnswerKeyError {
    #[error("unable to read answer key {0}")]
    Io(PathBuf, #[source] io::Error),
    #[error("unable to parse answer key {0}")]
    Json(PathBuf, #[source] serde_json::Error),
    #[error("answer key workbook has no \"{0}\" sheet")]
    MissingSheet(String),
    #[error("invalid model name {value:?} in column {column}")]
    InvalidModel { column: usize, value: String },
    #[error("model {0} appears more than once")]
    DuplicateModel(ModelId),
    #[error("invalid question {value:?} for model {model} in row {row}")]
    InvalidQuestion {
        model: ModelId,
        row: usize,
        value: String,
    },
    #[error("invalid answer {value:?} for model {model} in row {row}")]
    InvalidAnswer {
        model: ModelId,
        row: usize,
        value: String,
    },
    #[error("answer key has no models")]
    Empty,
}

/// The correct answers of one exam model, by question number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelKey {
    pub label: String,
    answers: BTreeMap<u32, Option<Choice>>,
}

impl ModelKey {
    pub fn new(label: String, answers: BTreeMap<u32, Option<Choice>>) -> Self {
        Self { label, answers }
    }

    /// The recorded answer for a question; `Some(None)` means the question
    /// is in the key without a correct choice.
    pub fn answer(&self, question: u32) -> Option<Option<Choice>> {
        self.answers.get(&question).copied()
    }

    pub fn answers(&self) -> &BTreeMap<u32, Option<Choice>> {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerKey {
    models: BTreeMap<ModelId, ModelKey>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: ModelId, key: ModelKey) -> Option<ModelKey> {
        self.models.insert(model, key)
    }

    pub fn get(&self, model: ModelId) -> Option<&ModelKey> {
        self.models.get(&model)
    }

    pub fn models(&self) -> impl Iterator<Item = (&ModelId, &ModelKey)> {
        self.models.iter()
    }

    /// Loads a key exported as JSON rows, or as a workbook object with an
    /// [`EXAM_DETAILS_SHEET`] entry.
    #[time]
    pub fn load(path: &Path) -> Result<Self, AnswerKeyError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnswerKeyError::Io(path.to_path_buf(), e))?;
        Self::from_json(&json).map_err(|e| match e {
            AnswerKeyError::Json(_, e) => AnswerKeyError::Json(path.to_path_buf(), e),
            e => e,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, AnswerKeyError> {
        let source: AnswerKeySource =
            serde_json::from_str(json).map_err(|e| AnswerKeyError::Json(PathBuf::new(), e))?;
        let rows = match source {
            AnswerKeySource::Rows(rows) => rows,
            AnswerKeySource::Workbook(mut sheets) => sheets
                .remove(EXAM_DETAILS_SHEET)
                .ok_or_else(|| AnswerKeyError::MissingSheet(EXAM_DETAILS_SHEET.to_string()))?,
        };
        Self::from_rows(&rows)
    }

    /// Reads the side-by-side model blocks of the exam details sheet.
    pub fn from_rows(rows: &[Row]) -> Result<Self, AnswerKeyError> {
        let mut key = AnswerKey::new();

        for block in 0..MAX_MODEL_BLOCKS {
            let column = block * BLOCK_WIDTH;
            let label = match cell_text(rows, MODEL_NAME_ROW, column) {
                Some(label) => label,
                None => continue,
            };
            let model: ModelId = label.parse().map_err(|_| AnswerKeyError::InvalidModel {
                column,
                value: label.clone(),
            })?;

            let answers = read_model_block(rows, column, model)?;
            debug!("read {} answers for {}", answers.len(), label);
            if key.insert(model, ModelKey::new(label, answers)).is_some() {
                return Err(AnswerKeyError::DuplicateModel(model));
            }
        }

        if key.models.is_empty() {
            return Err(AnswerKeyError::Empty);
        }
        Ok(key)
    }
}

fn read_model_block(
    rows: &[Row],
    column: usize,
    model: ModelId,
) -> Result<BTreeMap<u32, Option<Choice>>, AnswerKeyError> {
    let mut answers = BTreeMap::new();

    for row in FIRST_ANSWER_ROW..rows.len() {
        let question = cell(rows, row, column);
        let answer = cell(rows, row, column + 1);
        let (question, answer) = match (question, answer) {
            (None, None) => break,
            (Some(question), Some(answer)) => (question, answer),
            _ => continue,
        };
        if is_header(question, QUESTION_HEADER) || is_header(answer, ANSWER_HEADER) {
            continue;
        }

        let number = parse_question(question).ok_or_else(|| AnswerKeyError::InvalidQuestion {
            model,
            row,
            value: cell_to_string(question),
        })?;
        let choice = parse_answer(answer).ok_or_else(|| AnswerKeyError::InvalidAnswer {
            model,
            row,
            value: cell_to_string(answer),
        })?;

        if answers.insert(number, choice).is_some() {
            warn!("model {} lists question {} more than once; keeping the last answer", model, number);
        }
    }

    Ok(answers)
}

/// A non-blank cell.
fn cell(rows: &[Row], row: usize, column: usize) -> Option<&Cell> {
    match rows.get(row)?.get(column)? {
        Some(Cell::Text(text)) if text.trim().is_empty() => None,
        cell => cell.as_ref(),
    }
}

fn cell_text(rows: &[Row], row: usize, column: usize) -> Option<String> {
    cell(rows, row, column).map(cell_to_string)
}

fn cell_to_string(cell: &Cell) -> String {
    match cell {
        Cell::Number(number) => number.to_string(),
        Cell::Text(text) => text.trim().to_string(),
    }
}

fn is_header(cell: &Cell, header: &str) -> bool {
    matches!(cell, Cell::Text(text) if text.trim() == header)
}

fn whole_number(number: f64) -> Option<u32> {
    (number.fract() == 0.0 && number >= 0.0 && number <= u32::MAX as f64).then_some(number as u32)
}

/// Accepts `Question 12`, `12` or a numeric cell.
fn parse_question(cell: &Cell) -> Option<u32> {
    let number = match cell {
        Cell::Number(number) => whole_number(*number),
        Cell::Text(text) => {
            let text = text.trim();
            let number = match text.get(..8) {
                Some(prefix) if prefix.eq_ignore_ascii_case("question") => text[8..].trim(),
                _ => text,
            };
            number.parse().ok()
        }
    };
    number.filter(|number| *number > 0)
}

/// Accepts a 1-based choice number (`1` → `A`) or a choice letter in either
/// case. `Some(None)` is a question without a correct answer.
fn parse_answer(cell: &Cell) -> Option<Option<Choice>> {
    match cell {
        Cell::Number(number) => whole_number(*number).and_then(Choice::from_number).map(Some),
        Cell::Text(text) => {
            let text = text.trim();
            if text == NO_ANSWER {
                return Some(None);
            }
            if let Ok(number) = text.parse::<u32>() {
                return Choice::from_number(number).map(Some);
            }
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(letter), None) if letter.is_ascii_alphabetic() => {
                    Choice::from_letter(letter).map(Some)
                }
                _ => None,
            }
        }
    }
}
