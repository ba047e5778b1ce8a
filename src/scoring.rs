use serde::{Deserialize, Serialize};

use crate::answer_key::{AnswerKey, ModelKey, NO_ANSWER};
use crate::interpret::RecognitionResult;
use crate::types::ModelId;

/// The graded result of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub seat_number: String,
    pub model: ModelId,
    pub correct_count: u32,
    pub total_matched: u32,
    pub score_percent: f64,
    /// The marked letters of the keyed questions, space separated.
    pub marked_answers: String,
    pub correct_answers: String,
}

/// Percentage of correct answers rounded to two decimals; 0 when nothing
/// was graded.
pub fn score_percent(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = correct as f64 * 100.0 / total as f64;
    (percent * 100.0).round() / 100.0
}

/// Grades a sheet against the key of the model it was marked with. Returns
/// `None` when the sheet's model is unreadable or not in the key.
pub fn reconcile(recognition: &RecognitionResult, key: &AnswerKey) -> Option<ScoreRecord> {
    let model = recognition.model_id()?;
    let model_key = key.get(model)?;
    Some(score_against(recognition, model, model_key))
}

/// Grades the answers of questions that appear in `model_key`; other
/// questions on the sheet are ignored.
pub fn score_against(
    recognition: &RecognitionResult,
    model: ModelId,
    model_key: &ModelKey,
) -> ScoreRecord {
    let mut marked = vec![];
    let mut correct = vec![];
    let mut correct_count = 0;

    for answer in &recognition.answers {
        let expected = match model_key.answer(answer.question) {
            Some(expected) => expected,
            None => continue,
        };
        if expected.is_some() && answer.answer == expected {
            correct_count += 1;
        }
        marked.push(answer.letter().to_string());
        correct.push(expected.map_or(NO_ANSWER.to_string(), |choice| choice.to_string()));
    }

    let total_matched = marked.len() as u32;
    ScoreRecord {
        seat_number: recognition.seat_number.clone(),
        model,
        correct_count,
        total_matched,
        score_percent: score_percent(correct_count, total_matched),
        marked_answers: marked.join(" "),
        correct_answers: correct.join(" "),
    }
}
