use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::classifier::{RatingClient, RawRating};
use crate::error::ClassifierError;

const API_URL: &str = "https://api.anthropic.com/v1/messages";

const RATING_PROMPT: &str = r#"You rate entities from a personal knowledge graph so the system knows what to keep and what to let fade.

For each numbered entity give two integers:
- importance (1-5): 1 = trivial, forgettable; 3 = useful context; 5 = core, never forget.
- stability (1-5): 1 = volatile, changes within hours or days; 3 = changes over months; 5 = permanent fact.

Return a JSON array only, one object per entity, in the same order, no other text:
[{"index": 0, "importance": 3, "stability": 3}]"#;

#[derive(Debug, Deserialize)]
struct RatedItem {
    index: Option<usize>,
    #[serde(default)]
    importance: serde_json::Value,
    #[serde(default)]
    stability: serde_json::Value,
}

/// Rating client backed by the Anthropic Messages API.
pub struct AnthropicRatingClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    request_timeout: Duration,
}

impl AnthropicRatingClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout,
        }
    }

    async fn complete(&self, prompt: String, max_tokens: u32) -> Result<String, ClassifierError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": prompt,
            }]
        });

        let resp = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Unavailable(format!(
                "rating API failed ({}): {}",
                status, text
            )));
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| self.transport_error(e))?;
        data["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClassifierError::Malformed("response has no text content".into()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.request_timeout)
        } else if e.is_decode() {
            ClassifierError::Malformed(e.to_string())
        } else {
            ClassifierError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl RatingClient for AnthropicRatingClient {
    async fn classify(&self, entity_text: &str) -> Result<RawRating, ClassifierError> {
        let texts = [entity_text.to_string()];
        self.classify_batch(&texts)
            .await?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| ClassifierError::Malformed("no rating for entity".into()))
    }

    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Option<RawRating>>, ClassifierError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let listing: String = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}\n", i, t))
            .collect();
        let prompt = format!("{}\n\n---\n\nEntities:\n{}", RATING_PROMPT, listing);
        // Roughly 40 output tokens per rated item.
        let max_tokens = (texts.len() as u32).saturating_mul(40).clamp(256, 8192);

        let text = self.complete(prompt, max_tokens).await?;
        parse_ratings(&text, texts.len())
    }
}

/// Stand-in used when no API key is configured: every call is unavailable,
/// so classification always degrades to defaults.
pub struct DisabledRatingClient;

#[async_trait]
impl RatingClient for DisabledRatingClient {
    async fn classify(&self, _entity_text: &str) -> Result<RawRating, ClassifierError> {
        Err(ClassifierError::Unavailable("no rating provider configured".into()))
    }

    async fn classify_batch(&self, _texts: &[String]) -> Result<Vec<Option<RawRating>>, ClassifierError> {
        Err(ClassifierError::Unavailable("no rating provider configured".into()))
    }
}

fn json_array_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\[.*\]").ok()).as_ref()
}

/// Parse the model's reply into `expected` positional ratings.
///
/// Items are placed by their `index` field when present, otherwise by order.
/// Items with non-numeric ratings come back as `None`; an unparseable reply
/// is an error for the whole batch.
pub fn parse_ratings(text: &str, expected: usize) -> Result<Vec<Option<RawRating>>, ClassifierError> {
    let items: Vec<RatedItem> = serde_json::from_str(text.trim()).or_else(|_| {
        // Models sometimes wrap the array in prose or code fences.
        let found = json_array_pattern()
            .and_then(|re| re.find(text))
            .ok_or_else(|| ClassifierError::Malformed("no JSON array in reply".into()))?;
        serde_json::from_str(found.as_str()).map_err(|e| ClassifierError::Malformed(e.to_string()))
    })?;

    let mut out = vec![None; expected];
    for (position, item) in items.into_iter().enumerate() {
        let slot = item.index.unwrap_or(position);
        if slot >= expected {
            continue;
        }
        if let (Some(importance), Some(stability)) = (as_rating(&item.importance), as_rating(&item.stability)) {
            out[slot] = Some(RawRating { importance, stability });
        }
    }
    Ok(out)
}

/// Accept integers, floats (rounded) and numeric strings.
fn as_rating(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_array() {
        let reply = r#"[{"index": 0, "importance": 4, "stability": 2}, {"index": 1, "importance": 1, "stability": 5}]"#;
        let parsed = parse_ratings(reply, 2).unwrap();
        assert_eq!(parsed[0], Some(RawRating { importance: 4, stability: 2 }));
        assert_eq!(parsed[1], Some(RawRating { importance: 1, stability: 5 }));
    }

    #[test]
    fn extracts_array_from_fenced_prose() {
        let reply = "Sure, here you go:\n```json\n[{\"importance\": 3, \"stability\": \"4\"}]\n```";
        let parsed = parse_ratings(reply, 1).unwrap();
        assert_eq!(parsed[0], Some(RawRating { importance: 3, stability: 4 }));
    }

    #[test]
    fn out_of_range_values_pass_through_for_clamping() {
        let parsed = parse_ratings(r#"[{"importance": 9, "stability": 0}]"#, 1).unwrap();
        assert_eq!(parsed[0], Some(RawRating { importance: 9, stability: 0 }));
    }

    #[test]
    fn non_numeric_item_is_none_and_missing_items_stay_none() {
        let reply = r#"[{"index": 0, "importance": "high", "stability": 3}]"#;
        let parsed = parse_ratings(reply, 3).unwrap();
        assert_eq!(parsed, vec![None, None, None]);
    }

    #[test]
    fn garbage_reply_is_malformed() {
        let err = parse_ratings("I cannot help with that.", 2).unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }

    #[test]
    fn stray_indices_are_ignored() {
        let parsed = parse_ratings(r#"[{"index": 7, "importance": 2, "stability": 2}]"#, 1).unwrap();
        assert_eq!(parsed, vec![None]);
    }

    #[tokio::test]
    async fn disabled_client_is_always_unavailable() {
        let err = DisabledRatingClient.classify("anything").await.unwrap_err();
        assert!(matches!(err, ClassifierError::Unavailable(_)));
    }
}
