use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{
    compute_sheet_geometry, ExamLayoutConfig, LayoutConfigError, SheetGeometry, HEADER_FIELD_ROWS,
};
use crate::interpret::{check_mark_threshold, InvalidMarkThreshold};
use crate::types::PaperSize;

pub const DEFAULT_CHOICE_COUNT: u32 = 4;
pub const DEFAULT_PIXELS_PER_INCH: u32 = 283;

#[derive(Debug, Error)]
pub enum ExamDefinitionError {
    #[error("unable to read exam definition {0}")]
    Io(PathBuf, #[source] io::Error),
    #[error("unable to parse exam definition {0}")]
    Json(PathBuf, #[source] serde_json::Error),
    #[error("invalid exam layout")]
    Layout(#[from] LayoutConfigError),
    #[error(transparent)]
    MarkThreshold(#[from] InvalidMarkThreshold),
}

/// Printed in the left column of the sheet header. Every field is optional
/// and blank fields still take their row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamDetails {
    pub university_name: String,
    pub college_name: String,
    pub course_name: String,
    pub course_code: String,
    pub course_level: String,
    pub term: String,
    pub department: String,
    pub exam_date: String,
    pub full_mark: String,
    pub exam_time: String,
}

impl ExamDetails {
    pub fn header_fields(&self, question_count: u32) -> [(&'static str, String); HEADER_FIELD_ROWS] {
        [
            ("University Name:", self.university_name.clone()),
            ("College Name:", self.college_name.clone()),
            ("Course Name:", self.course_name.clone()),
            ("Course Code:", self.course_code.clone()),
            ("Course Level:", self.course_level.clone()),
            ("Term:", self.term.clone()),
            ("Department:", self.department.clone()),
            ("Date:", self.exam_date.clone()),
            ("Full Mark:", self.full_mark.clone()),
            ("Time:", self.exam_time.clone()),
            ("No. of Questions:", question_count.to_string()),
        ]
    }
}

/// An exam as configured by its author: what to print and how the sheets
/// are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDefinition {
    pub title: String,
    #[serde(default)]
    pub details: ExamDetails,
    pub question_count: u32,
    #[serde(default = "default_choice_count")]
    pub choice_count: u32,
    #[serde(default)]
    pub paper_size: PaperSize,
    #[serde(default = "default_pixels_per_inch")]
    pub pixels_per_inch: u32,
    /// Model identifiers to print a sheet for, usually `A`, `B`, ...
    #[serde(default)]
    pub models: Vec<String>,
    pub mark_threshold: Option<f32>,
}

fn default_choice_count() -> u32 {
    DEFAULT_CHOICE_COUNT
}

fn default_pixels_per_inch() -> u32 {
    DEFAULT_PIXELS_PER_INCH
}

impl ExamDefinition {
    pub fn load(path: &Path) -> Result<Self, ExamDefinitionError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ExamDefinitionError::Io(path.to_path_buf(), e))?;
        let definition: ExamDefinition = serde_json::from_str(&json)
            .map_err(|e| ExamDefinitionError::Json(path.to_path_buf(), e))?;
        definition.layout_config().validate()?;
        if let Some(threshold) = definition.mark_threshold {
            check_mark_threshold(threshold)?;
        }
        Ok(definition)
    }

    /// Sheets carry a model section whenever the exam has models.
    pub fn layout_config(&self) -> ExamLayoutConfig {
        ExamLayoutConfig {
            paper_size: self.paper_size,
            pixels_per_inch: self.pixels_per_inch,
            question_count: self.question_count,
            choice_count: self.choice_count,
            model_section: !self.models.is_empty(),
        }
    }

    pub fn geometry(&self) -> Result<SheetGeometry, ExamDefinitionError> {
        Ok(compute_sheet_geometry(&self.layout_config())?)
    }
}
