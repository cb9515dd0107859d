//! Prompt templates sent to the language model.
//!
//! The model is asked for exactly one JSON object tagged with `kind`, which
//! [`parse_upstream_response`](consumer_sense_core::upstream::parse_upstream_response)
//! parses strictly.

const REVIEW_PROMPT: &str = r#"You are a Senior Product Manager extracting strategic insights from customer feedback.

The input is review text, text scraped from a web page, or one or more screenshots.

Decide which of two shapes fits the input and return ONLY that JSON object, with no surrounding text:

1. Exactly one review:
{
  "kind": "single_review",
  "text": "cleaned review text",
  "sentiment": "positive | neutral | negative | mixed",
  "score": -1.0 to 1.0,
  "themes": ["up to 3 short themes"],
  "intent": "complaint | praise | feature_request | question | other",
  "action_items": ["0-3 suggested actions for product or support"],
  "confidence": 0.0 to 1.0
}

2. Several reviews (look for separators, spacing, or distinct usernames and extract EACH one), or product copy with no reviews (use an empty "reviews" list):
{
  "kind": "multi_review",
  "reviews": [
    {
      "metadata": {"username": "...", "rating": "...", "date": "..."},
      "text": "...",
      "analysis": {
        "sentiment": "positive | neutral | negative | mixed",
        "pain_points": ["..."],
        "feature_requests": ["..."],
        "actionable_advice": "..."
      }
    }
  ],
  "overall_summary": "Executive summary of all feedback provided.",
  "analysis": {
    "sentiment": "overall sentiment",
    "pain_points": ["top 3 pain points"],
    "feature_requests": ["top 3 requests"],
    "actionable_advice": "one high-level recommendation"
  }
}

Preserve emojis and punctuation in quoted text. Use lowercase sentiment values."#;

/// Prompt for analyzing free text (typed or scraped).
pub fn text_prompt(text: &str) -> String {
    format!("{}\n\nUser input text:\n```{}```\n", REVIEW_PROMPT, text)
}

/// Prompt for analyzing screenshots, with optional accompanying text.
pub fn image_prompt(context: Option<&str>) -> String {
    match context {
        Some(text) if !text.trim().is_empty() => text_prompt(text),
        _ => format!("{}\n\nThe reviews are in the attached images.\n", REVIEW_PROMPT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_prompt_fences_input() {
        let p = text_prompt("the app crashed");
        assert!(p.contains("```the app crashed```"));
        assert!(p.contains("\"kind\": \"single_review\""));
        assert!(p.contains("\"kind\": \"multi_review\""));
    }

    #[test]
    fn image_prompt_without_context_mentions_images() {
        assert!(image_prompt(None).contains("attached images"));
        assert!(image_prompt(Some("  ")).contains("attached images"));
        assert!(image_prompt(Some("caption")).contains("```caption```"));
    }
}
