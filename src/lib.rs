//! Printable multiple-choice answer sheets and the grading of their scans.
//!
//! The same [`geometry::SheetGeometry`] drives both sides: [`layout`] draws
//! the bubbles of a sheet and [`interpret`] samples a scan of it at exactly
//! those positions. [`scoring`] then compares what was read with an
//! [`answer_key::AnswerKey`].

pub mod answer_key;
pub mod batch;
pub mod debug;
pub mod exam;
pub mod geometry;
pub mod image_utils;
pub mod interpret;
pub mod layout;
pub mod scoring;
pub mod types;

pub use answer_key::AnswerKey;
pub use exam::ExamDefinition;
pub use geometry::{compute_sheet_geometry, ExamLayoutConfig, SheetGeometry};
pub use interpret::{interpret_sheet, DetectionOptions, RecognitionResult};
pub use layout::SheetRenderer;
pub use scoring::{reconcile, ScoreRecord};
