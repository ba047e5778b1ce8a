use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use logging_timer::time;
use rayon::prelude::*;
use thiserror::Error;

use crate::answer_key::AnswerKey;
use crate::geometry::SheetGeometry;
use crate::interpret::{interpret_sheet, DetectionOptions, InterpretSheetError};
use crate::scoring::{reconcile, ScoreRecord};

/// Why a single sheet could not be graded. None of these stop a batch.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Interpret(#[from] InterpretSheetError),
    #[error("model {model_number:?} marked on seat {seat_number} is not in the answer key")]
    ModelNotFound {
        seat_number: String,
        model_number: String,
    },
}

/// File extensions picked up when a directory of sheets is graded.
pub const SHEET_IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
#[error("unable to list sheets in {0}")]
pub struct ListSheetsError(pub PathBuf, #[source] pub io::Error);

fn is_sheet_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map_or(false, |extension| {
            SHEET_IMAGE_EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}

/// Replaces every directory among `inputs` with the sheet images directly
/// inside it, sorted by path. Other inputs are kept as given so that a
/// missing file is still reported when it is graded.
pub fn expand_sheet_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ListSheetsError> {
    let mut paths = vec![];
    for input in inputs {
        if !input.is_dir() {
            paths.push(input.clone());
            continue;
        }

        let mut images = vec![];
        for entry in std::fs::read_dir(input).map_err(|e| ListSheetsError(input.clone(), e))? {
            let path = entry.map_err(|e| ListSheetsError(input.clone(), e))?.path();
            if path.is_file() && is_sheet_image(&path) {
                images.push(path);
            }
        }
        images.sort();

        if images.is_empty() {
            warn!("no sheet images found in {}", input.display());
        } else {
            debug!("found {} sheet images in {}", images.len(), input.display());
        }
        paths.extend(images);
    }
    Ok(paths)
}

#[derive(Debug)]
pub struct SheetFailure {
    pub path: PathBuf,
    pub error: SheetError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Graded sheets ordered by seat number.
    pub records: Vec<ScoreRecord>,
    pub failures: Vec<SheetFailure>,
}

impl BatchReport {
    pub fn sheet_count(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "graded {} of {} sheets, {} failed",
            self.records.len(),
            self.sheet_count(),
            self.failures.len()
        )
    }
}

pub fn grade_sheet(
    path: &Path,
    geometry: &SheetGeometry,
    key: &AnswerKey,
    options: &DetectionOptions,
) -> Result<ScoreRecord, SheetError> {
    let recognition = interpret_sheet(path, geometry, options)?;
    reconcile(&recognition, key).ok_or(SheetError::ModelNotFound {
        seat_number: recognition.seat_number,
        model_number: recognition.model_number,
    })
}

/// Grades every sheet independently against the shared key. Sheets that
/// fail are reported in [`BatchReport::failures`] and do not affect the
/// others.
#[time]
pub fn grade_sheets(
    paths: &[PathBuf],
    geometry: &SheetGeometry,
    key: &AnswerKey,
    options: &DetectionOptions,
) -> BatchReport {
    let results = paths
        .par_iter()
        .map(|path| (path, grade_sheet(path, geometry, key, options)))
        .collect::<Vec<_>>();

    let mut report = BatchReport::default();
    for (path, result) in results {
        match result {
            Ok(record) => {
                info!(
                    "{}: seat {} model {} scored {}%",
                    path.display(),
                    record.seat_number,
                    record.model,
                    record.score_percent
                );
                report.records.push(record);
            }
            Err(error) => {
                warn!("{}: {}", path.display(), error);
                report.failures.push(SheetFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    report
        .records
        .sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
    report
}
