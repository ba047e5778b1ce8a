use std::path::{Path, PathBuf};

use bubble_sheet::answer_key::AnswerKey;
use bubble_sheet::batch::{expand_sheet_paths, grade_sheets, SheetError};
use bubble_sheet::exam::{ExamDefinition, ExamDetails};
use bubble_sheet::geometry::SheetGeometry;
use bubble_sheet::image_utils::BLACK;
use bubble_sheet::interpret::{interpret_sheet, DetectionOptions, InterpretSheetError};
use bubble_sheet::layout::{write_sheets, SheetRenderer};
use bubble_sheet::types::{Bubble, PaperSize};
use image::GrayImage;
use imageproc::drawing::draw_filled_circle_mut;
use serde_json::json;

fn definition() -> ExamDefinition {
    ExamDefinition {
        title: "Quiz".to_string(),
        details: ExamDetails::default(),
        question_count: 5,
        choice_count: 4,
        paper_size: PaperSize::A4,
        pixels_per_inch: 100,
        models: vec!["A".to_string(), "B".to_string()],
        mark_threshold: None,
    }
}

fn answer_key() -> AnswerKey {
    let rows = json!([
        ["Exam Name: Quiz"],
        [],
        ["Model 1", null, null, "Model 2", null],
        ["Questions", "Correct Answer", null, "Questions", "Correct Answer"],
        ["Question 1", "D", null, "Question 1", "A"],
        ["Question 2", "D", null, "Question 2", "B"],
        ["Question 3", "D", null, "Question 3", "C"],
        ["Question 4", "A", null, "Question 4", "D"],
        ["Question 5", "C", null, "Question 5", "A"],
    ]);
    AnswerKey::from_json(&rows.to_string()).unwrap()
}

fn mark(sheet: &mut GrayImage, bubble: &Bubble) {
    let (x, y) = bubble.pixel_center();
    draw_filled_circle_mut(sheet, (x, y), bubble.radius.round() as i32, BLACK);
}

/// Fills in a printed sheet the way a student would and saves it as a scan.
fn fill_in(
    printed: &Path,
    geometry: &SheetGeometry,
    seat: &str,
    answers: &str,
    scan: &Path,
) -> PathBuf {
    let mut sheet = image::open(printed).unwrap().into_luma8();
    for (position, digit) in seat.chars().rev().enumerate() {
        let digit = digit.to_digit(10).unwrap() as usize;
        mark(&mut sheet, &geometry.header.seat_bubbles[position][digit]);
    }
    for (question, letter) in answers.chars().enumerate() {
        let index = (letter as u8 - b'A') as usize;
        mark(&mut sheet, &geometry.questions[question].bubbles[index]);
    }
    sheet.save(scan).unwrap();
    scan.to_path_buf()
}

#[test]
fn test_generate_fill_and_grade() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();
    let geometry = definition.geometry().unwrap();
    let printed = write_sheets(&definition, &dir.path().join("sheets"), &SheetRenderer::default())
        .unwrap();
    assert_eq!(printed.len(), 2);

    let perfect = fill_in(&printed[1], &geometry, "0317", "ABCDA", &dir.path().join("b.png"));
    let partial = fill_in(&printed[0], &geometry, "0042", "DABAC", &dir.path().join("a.png"));

    // a scan at twice the resolution is brought back to the sheet's canvas
    let upscaled = dir.path().join("b_upscaled.png");
    let img = image::open(&perfect).unwrap().into_luma8();
    image::imageops::resize(
        &img,
        img.width() * 2,
        img.height() * 2,
        image::imageops::FilterType::Triangle,
    )
    .save(&upscaled)
    .unwrap();

    let missing = dir.path().join("missing.png");
    let report = grade_sheets(
        &[perfect, missing.clone(), partial, upscaled],
        &geometry,
        &answer_key(),
        &DetectionOptions::default(),
    );

    assert_eq!(report.sheet_count(), 4);
    assert_eq!(report.summary(), "graded 3 of 4 sheets, 1 failed");
    assert_eq!(report.failures[0].path, missing);
    assert!(matches!(
        report.failures[0].error,
        SheetError::Interpret(InterpretSheetError::ImageOpen(..))
    ));

    let seats = report
        .records
        .iter()
        .map(|record| record.seat_number.as_str())
        .collect::<Vec<_>>();
    assert_eq!(seats, vec!["0042", "0317", "0317"]);

    let partial = &report.records[0];
    assert_eq!(partial.model.to_string(), "A");
    assert_eq!(partial.correct_count, 3);
    assert_eq!(partial.total_matched, 5);
    assert_eq!(partial.score_percent, 60.0);
    assert_eq!(partial.marked_answers, "D A B A C");
    assert_eq!(partial.correct_answers, "D D D A C");

    for record in &report.records[1..] {
        assert_eq!(record.model.to_string(), "B");
        assert_eq!(record.correct_count, 5);
        assert_eq!(record.score_percent, 100.0);
        assert_eq!(record.marked_answers, "A B C D A");
    }
}

#[test]
fn test_unmarked_printed_sheet_reads_its_model_only() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();
    let geometry = definition.geometry().unwrap();
    let printed = write_sheets(&definition, dir.path(), &SheetRenderer::default()).unwrap();

    let result = interpret_sheet(&printed[1], &geometry, &DetectionOptions::default()).unwrap();
    assert_eq!(result.seat_number, "____");
    assert_eq!(result.model_number, "2");
    assert!(result.answers.iter().all(|answer| answer.answer.is_none()));
}

#[test]
fn test_sheet_with_unknown_model_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let definition = ExamDefinition {
        models: vec!["C".to_string()],
        ..definition()
    };
    let geometry = definition.geometry().unwrap();
    let printed = write_sheets(&definition, dir.path(), &SheetRenderer::default()).unwrap();
    let scan = fill_in(&printed[0], &geometry, "0005", "AAAAA", &dir.path().join("c.png"));

    let report = grade_sheets(&[scan], &geometry, &answer_key(), &DetectionOptions::default());
    assert!(report.records.is_empty());
    assert!(matches!(
        &report.failures[0].error,
        SheetError::ModelNotFound { seat_number, model_number }
            if seat_number == "0005" && model_number == "3"
    ));
}

#[test]
fn test_debug_images_are_written_next_to_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();
    let geometry = definition.geometry().unwrap();
    let printed = write_sheets(&definition, dir.path(), &SheetRenderer::default()).unwrap();
    let scan = fill_in(&printed[0], &geometry, "1234", "ABCDA", &dir.path().join("scan.png"));

    let options = DetectionOptions {
        debug: true,
        ..DetectionOptions::default()
    };
    let result = interpret_sheet(&scan, &geometry, &options).unwrap();
    assert_eq!(result.seat_number, "1234");
    assert!(dir.path().join("scan_debug_scored_bubbles.png").exists());
}

#[test]
fn test_grades_a_directory_of_scans() {
    let dir = tempfile::tempdir().unwrap();
    let definition = definition();
    let geometry = definition.geometry().unwrap();
    let printed = write_sheets(&definition, &dir.path().join("sheets"), &SheetRenderer::default())
        .unwrap();

    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).unwrap();
    fill_in(&printed[1], &geometry, "0317", "ABCDA", &scans.join("second.png"));
    fill_in(&printed[0], &geometry, "0042", "DDDAC", &scans.join("first.png"));
    std::fs::write(scans.join("roster.txt"), "0042\n0317\n").unwrap();

    let paths = expand_sheet_paths(&[scans.clone()]).unwrap();
    assert_eq!(paths, vec![scans.join("first.png"), scans.join("second.png")]);

    let report = grade_sheets(&paths, &geometry, &answer_key(), &DetectionOptions::default());
    assert!(report.failures.is_empty());
    assert_eq!(report.records.len(), 2);
    assert!(report
        .records
        .iter()
        .all(|record| record.score_percent == 100.0));
}
