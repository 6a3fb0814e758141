//! Strict structural validation of the model's assessment JSON.
//!
//! Validation is total: the payload is accepted only if every required field
//! of every element conforms. The first violation found is reported.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::analysis::Assessment;

const MISSED_QUESTIONS: &str = "missedQuestions";
const LESSON_RECOMMENDATIONS: &str = "lessonRecommendations";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("overallScore is missing or not a number")]
    ScoreNotNumeric,

    #[error("overallScore {0} is outside 0-100")]
    ScoreOutOfRange(f64),

    #[error("{0} is missing or not an array")]
    MissingArray(&'static str),

    #[error("{0} is empty")]
    EmptyArray(&'static str),

    #[error("{array}[{index}].{field} is missing, empty, or mistyped")]
    InvalidElement {
        array: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("payload could not be mapped: {0}")]
    Malformed(String),
}

/// Validates a parsed model response and converts it into an `Assessment`.
pub fn validate_assessment(value: Value) -> Result<Assessment, SchemaViolation> {
    let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;

    let score = object
        .get("overallScore")
        .and_then(Value::as_f64)
        .ok_or(SchemaViolation::ScoreNotNumeric)?;
    if !(0.0..=100.0).contains(&score) {
        return Err(SchemaViolation::ScoreOutOfRange(score));
    }

    for (index, question) in required_array(object, MISSED_QUESTIONS)?.iter().enumerate() {
        check_missed_question(question, index)?;
    }
    for (index, lesson) in required_array(object, LESSON_RECOMMENDATIONS)?
        .iter()
        .enumerate()
    {
        check_lesson_recommendation(lesson, index)?;
    }

    serde_json::from_value(value).map_err(|e| SchemaViolation::Malformed(e.to_string()))
}

fn required_array<'a>(
    object: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Vec<Value>, SchemaViolation> {
    let array = object
        .get(key)
        .and_then(Value::as_array)
        .ok_or(SchemaViolation::MissingArray(key))?;
    if array.is_empty() {
        return Err(SchemaViolation::EmptyArray(key));
    }
    Ok(array)
}

fn check_missed_question(value: &Value, index: usize) -> Result<(), SchemaViolation> {
    let invalid = |field| SchemaViolation::InvalidElement {
        array: MISSED_QUESTIONS,
        index,
        field,
    };
    let question = value.as_object().ok_or_else(|| invalid("question"))?;

    if !is_non_empty_str(question.get("question")) {
        return Err(invalid("question"));
    }
    let percentage = question.get("percentageMissed").and_then(Value::as_f64);
    if !percentage.is_some_and(|p| (0.0..=100.0).contains(&p)) {
        return Err(invalid("percentageMissed"));
    }
    if !is_string_array(question.get("relatedLessons"), false) {
        return Err(invalid("relatedLessons"));
    }
    if !is_string_array(question.get("improvementSuggestions"), false) {
        return Err(invalid("improvementSuggestions"));
    }
    Ok(())
}

fn check_lesson_recommendation(value: &Value, index: usize) -> Result<(), SchemaViolation> {
    let invalid = |field| SchemaViolation::InvalidElement {
        array: LESSON_RECOMMENDATIONS,
        index,
        field,
    };
    let lesson = value.as_object().ok_or_else(|| invalid("lessonName"))?;

    if !is_non_empty_str(lesson.get("lessonName")) {
        return Err(invalid("lessonName"));
    }
    if !is_non_empty_str(lesson.get("currentContent")) {
        return Err(invalid("currentContent"));
    }
    if !is_string_array(lesson.get("suggestedImprovements"), false) {
        return Err(invalid("suggestedImprovements"));
    }
    if !is_string_array(lesson.get("additionalResources"), true) {
        return Err(invalid("additionalResources"));
    }
    Ok(())
}

fn is_non_empty_str(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn is_string_array(value: Option<&Value>, allow_empty: bool) -> bool {
    match value.and_then(Value::as_array) {
        Some(items) => {
            (allow_empty || !items.is_empty()) && items.iter().all(|i| is_non_empty_str(Some(i)))
        }
        None => false,
    }
}
