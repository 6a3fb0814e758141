//! Assessment: sends normalized content to the model under a strict schema
//! contract and validates what comes back.

use serde_json::Value;
use tracing::{debug, warn};

use crate::analysis::normalize::NormalizedContent;
use crate::analysis::prompts::{ASSESSMENT_PROMPT_TEMPLATE, ASSESSMENT_SYSTEM};
use crate::analysis::schema::validate_assessment;
use crate::analysis::AnalysisError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::LlmClient;
use crate::models::analysis::Assessment;

/// Builds the schema-constrained prompt for one document.
pub fn build_assessment_prompt(content: &NormalizedContent) -> String {
    ASSESSMENT_PROMPT_TEMPLATE.replace("{content}", content.as_str())
}

/// Asks the model to assess `content` and returns the validated payload.
/// Rate limiting is retried inside the client; everything else propagates.
pub async fn assess(
    llm: &LlmClient,
    content: &NormalizedContent,
) -> Result<Assessment, AnalysisError> {
    let prompt = build_assessment_prompt(content);
    let system = format!("{ASSESSMENT_SYSTEM} {JSON_ONLY_SYSTEM}");

    let value: Value = llm.call_json(&prompt, &system).await?;
    let assessment = validate_assessment(value).map_err(|violation| {
        warn!("Model response failed schema validation: {violation}");
        AnalysisError::SchemaViolation(violation)
    })?;

    debug!(
        "Assessment accepted: score={}, missed_questions={}, lesson_recommendations={}",
        assessment.overall_score,
        assessment.missed_questions.len(),
        assessment.lesson_recommendations.len()
    );
    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::analysis::normalize::{normalize, NormalizerConfig};
    use crate::analysis::schema::tests::conformant;
    use crate::analysis::schema::SchemaViolation;
    use crate::llm_client::test_support::ScriptedTransport;

    use super::*;

    fn content() -> NormalizedContent {
        normalize(
            "Newton's first law describes inertia in everyday motion",
            &NormalizerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fenced_conformant_json_is_returned_unchanged() {
        let body = format!("```json\n{}\n```", conformant());
        let transport = Arc::new(ScriptedTransport::always(body));
        let llm = LlmClient::new(transport);

        let assessment = assess(&llm, &content()).await.unwrap();
        let expected: Assessment = serde_json::from_value(conformant()).unwrap();
        assert_eq!(assessment, expected);
    }

    #[tokio::test]
    async fn test_prompt_embeds_content_and_schema() {
        let transport = Arc::new(ScriptedTransport::always(conformant().to_string()));
        let llm = LlmClient::new(transport.clone());

        assess(&llm, &content()).await.unwrap();

        let prompts = transport.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Newton's first law describes inertia"));
        assert!(prompts[0].contains("\"lessonRecommendations\""));
        assert!(!prompts[0].contains("{content}"));
    }

    #[tokio::test]
    async fn test_missing_lesson_recommendations_is_schema_violation() {
        let mut value = conformant();
        value.as_object_mut().unwrap().remove("lessonRecommendations");
        let transport = Arc::new(ScriptedTransport::always(value.to_string()));
        let llm = LlmClient::new(transport.clone());

        let err = assess(&llm, &content()).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::SchemaViolation(SchemaViolation::MissingArray("lessonRecommendations"))
        ));
        // Schema violations are not retried.
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_prose_response_is_parse_failure() {
        let transport = Arc::new(ScriptedTransport::always("I think this lesson is good."));
        let llm = LlmClient::new(transport);

        let err = assess(&llm, &content()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ParseFailure(_)));
    }
}
