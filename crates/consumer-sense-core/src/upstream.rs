//! Shapes the language model is prompted to return.
//!
//! The model emits one JSON object discriminated by `kind`:
//!
//! - `single_review`: a flat analysis of one piece of feedback.
//! - `multi_review`: several reviews found in one input (or product copy
//!   with none), each with its own insight block, plus an overall block.
//!
//! Parsing is strict. A response that is not exactly one of these objects
//! is a [`MalformedResponse`]; nothing is scraped out of surrounding prose.
//! [`UpstreamAnalysis::into_analysis_result`] flattens either shape into
//! the [`AnalysisResult`] the normalizer consumes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::AnalysisResult;

/// Reviews shorter than this (in characters) are dropped as noise.
pub const MIN_REVIEW_CHARS: usize = 6;

const EXCERPT_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum MalformedResponse {
    #[error("model returned an empty response")]
    Empty,
    #[error("model response has no content ({0})")]
    NoContent(String),
    #[error("model response is not a valid analysis object: {source} (response began {excerpt:?})")]
    Shape {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
}

/// A list of strings that the model may also send as a single string or
/// `null`. Collapsed to a plain list at deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<Option<String>>),
        }

        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            None => StringList::default(),
            Some(OneOrMany::One(s)) if s.trim().is_empty() => StringList::default(),
            Some(OneOrMany::One(s)) => StringList(vec![s]),
            Some(OneOrMany::Many(items)) => StringList(items.into_iter().flatten().collect()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamAnalysis {
    SingleReview(SingleReview),
    MultiReview(MultiReview),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleReview {
    pub text: Option<String>,
    pub sentiment: Option<String>,
    pub score: Option<f64>,
    pub themes: StringList,
    pub intent: Option<String>,
    pub action_items: StringList,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiReview {
    pub reviews: Vec<RichReview>,
    pub overall_summary: Option<String>,
    pub analysis: ReviewInsights,
}

/// One review found in the input, with its own insights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichReview {
    pub metadata: ReviewerMetadata,
    pub text: String,
    pub analysis: ReviewInsights,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerMetadata {
    pub username: Option<String>,
    /// Star ratings come back as `"4"`, `4`, or `"4/5"`; kept as sent.
    pub rating: Option<Value>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewInsights {
    pub sentiment: Option<String>,
    pub pain_points: StringList,
    pub feature_requests: StringList,
    pub actionable_advice: Option<String>,
}

/// Parse the model's response text into an [`UpstreamAnalysis`].
pub fn parse_upstream_response(text: &str) -> Result<UpstreamAnalysis, MalformedResponse> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(MalformedResponse::Empty);
    }
    serde_json::from_str(trimmed).map_err(|source| MalformedResponse::Shape {
        source,
        excerpt: trimmed.chars().take(EXCERPT_CHARS).collect(),
    })
}

impl UpstreamAnalysis {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamAnalysis::SingleReview(_) => "single_review",
            UpstreamAnalysis::MultiReview(_) => "multi_review",
        }
    }

    /// Flatten into the result the normalizer consumes.
    ///
    /// `input_text` is what was sent to the model (if any); it becomes the
    /// extracted text when the model returns no review text of its own.
    pub fn into_analysis_result(
        self,
        input_text: Option<String>,
        model: impl Into<String>,
        processing_latency_ms: Option<u64>,
    ) -> AnalysisResult {
        let kind = self.kind();
        let mut analysis = Map::new();
        analysis.insert("kind".to_string(), Value::from(kind));

        let extracted_text = match self {
            UpstreamAnalysis::SingleReview(single) => {
                analysis.insert("sentiment".into(), Value::from(single.sentiment));
                analysis.insert("score".into(), Value::from(single.score));
                analysis.insert("themes".into(), Value::from(single.themes.into_vec()));
                analysis.insert("intent".into(), Value::from(single.intent));
                analysis.insert(
                    "action_items".into(),
                    Value::from(single.action_items.into_vec()),
                );
                analysis.insert("confidence".into(), Value::from(single.confidence));
                single
                    .text
                    .filter(|t| !t.trim().is_empty())
                    .or_else(|| input_text.clone())
            }
            UpstreamAnalysis::MultiReview(multi) => {
                flatten_multi(multi, &mut analysis).or_else(|| input_text.clone())
            }
        };

        AnalysisResult {
            input_text,
            extracted_text,
            analysis: Some(analysis),
            model: Some(model.into()),
            processing_latency_ms,
        }
    }
}

/// Fill `analysis` from a multi-review response and return the kept
/// reviews' text, if any survived.
fn flatten_multi(multi: MultiReview, analysis: &mut Map<String, Value>) -> Option<String> {
    let MultiReview {
        reviews,
        overall_summary,
        analysis: overall,
    } = multi;

    let kept: Vec<RichReview> = reviews
        .into_iter()
        .filter(|r| r.text.chars().count() >= MIN_REVIEW_CHARS)
        .collect();

    let pains = overall.pain_points.into_vec();
    let features = overall.feature_requests.into_vec();
    let advice = overall
        .actionable_advice
        .filter(|a| !a.trim().is_empty());

    let themes: Vec<String> = pains.iter().chain(features.iter()).cloned().collect();
    let action_items: Vec<String> = advice.iter().cloned().collect();

    analysis.insert("sentiment".into(), Value::from(overall.sentiment));
    analysis.insert("score".into(), Value::Null);
    analysis.insert("themes".into(), Value::from(themes));
    analysis.insert("intent".into(), Value::Null);
    analysis.insert("action_items".into(), Value::from(action_items));
    analysis.insert("confidence".into(), Value::Null);
    analysis.insert("overall_summary".into(), Value::from(overall_summary));
    analysis.insert("top_level_advice".into(), Value::from(advice));
    analysis.insert("top_level_pains".into(), Value::from(pains));
    analysis.insert("top_level_features".into(), Value::from(features));

    let text = kept
        .iter()
        .map(|r| r.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    analysis.insert(
        "rich_reviews".into(),
        serde_json::to_value(&kept).unwrap_or_else(|_| Value::Array(Vec::new())),
    );

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
