// Assessment LLM prompt templates.
// All prompts for the analysis module are defined here.

pub const ASSESSMENT_SYSTEM: &str = "\
You are an expert at analyzing educational content. \
You evaluate lesson material for teaching effectiveness and identify the concepts \
students are most likely to miss.";

pub const ASSESSMENT_PROMPT_TEMPLATE: &str = r#"Analyze the educational content below and return a JSON object with specific fields.

The response MUST be a valid JSON object with EXACTLY these fields, with NO additional fields:
{
  "overallScore": (required number between 0-100, representing overall effectiveness),
  "missedQuestions": [
    {
      "question": (required string describing a specific question or concept students struggled with),
      "percentageMissed": (required number between 0-100),
      "relatedLessons": [required array of strings naming related lessons],
      "improvementSuggestions": [required array of strings with specific suggestions]
    }
  ],
  "lessonRecommendations": [
    {
      "lessonName": (required string with specific lesson name),
      "currentContent": (required string summarizing current content),
      "suggestedImprovements": [required array of strings with specific improvements],
      "additionalResources": [array of strings with resource suggestions]
    }
  ]
}

RULES:
1. ALL fields are required and must be present
2. "missedQuestions", "lessonRecommendations", and every nested array except "additionalResources" must contain at least one item
3. Numbers must be between 0 and 100
4. Strings must be non-empty, descriptive, and specific
5. Respond ONLY with the JSON object described above

CONTENT:
{content}"#;
