//! Google Cloud Natural Language sentiment engine.
//!
//! Each transcript segment is analyzed individually via the v2 REST API,
//! producing a score (-1.0 to 1.0) and a magnitude (0.0+).

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::asr::TranscriptSegment;
use crate::error::{PipelineError, Result};

use super::{EmotionEngine, EmotionResult, EmotionSegment};

const DEFAULT_BASE_URL: &str = "https://language.googleapis.com/v2";

pub struct GoogleNlEngine {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleNlEngine {
    pub fn new(api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PipelineError::config("google nl api key is required"));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Text and time bounds for one segment's analysis request.
    fn segment_text(segment: &TranscriptSegment) -> (String, f64, f64) {
        let text = segment
            .words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let start = segment.words.first().map(|w| w.start_time).unwrap_or(0.0);
        let end = segment.words.last().map(|w| w.end_time).unwrap_or(0.0);
        (text, start, end)
    }

    async fn analyze_text(&self, text: &str) -> Result<(f64, f64)> {
        let response = self
            .client
            .post(format!("{}/documents:analyzeSentiment", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "document": {"content": text, "type": "PLAIN_TEXT"},
            }))
            .send()
            .await
            .map_err(|e| PipelineError::emotion(format!("sentiment request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::emotion(format!(
                "sentiment analysis failed with HTTP {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::emotion(format!("invalid sentiment response: {e}")))?;
        let sentiment = &body["documentSentiment"];
        Ok((
            sentiment["score"].as_f64().unwrap_or(0.0),
            sentiment["magnitude"].as_f64().unwrap_or(0.0),
        ))
    }
}

#[async_trait]
impl EmotionEngine for GoogleNlEngine {
    fn provider_name(&self) -> &'static str {
        "google-cloud-nl"
    }

    fn provider_version(&self) -> &'static str {
        "v2"
    }

    async fn analyze(
        &self,
        segments: &[TranscriptSegment],
        _audio_path: Option<&Path>,
    ) -> Result<EmotionResult> {
        let analyzed_at = Utc::now().to_rfc3339();
        let mut emotion_segments = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            let (text, start_seconds, end_seconds) = Self::segment_text(segment);
            let (score, magnitude) = self.analyze_text(&text).await?;
            emotion_segments.push(EmotionSegment {
                segment_index: index,
                start_seconds,
                end_seconds,
                speaker: segment.speaker_label.clone(),
                text,
                analysis: serde_json::json!({"score": score, "magnitude": magnitude}),
            });
        }

        Ok(EmotionResult {
            provider: self.provider_name().to_string(),
            provider_version: self.provider_version().to_string(),
            analyzed_at,
            batch_id: String::new(),
            segments: emotion_segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::TranscriptWord;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(GoogleNlEngine::new("").is_err());
    }

    #[test]
    fn segment_text_joins_words_and_spans_times() {
        let segment = TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![
                TranscriptWord {
                    text: "Hello".to_string(),
                    start_time: 1.5,
                    end_time: 1.9,
                    confidence: 0.9,
                },
                TranscriptWord {
                    text: "world".to_string(),
                    start_time: 2.0,
                    end_time: 2.4,
                    confidence: 0.9,
                },
            ],
        };

        let (text, start, end) = GoogleNlEngine::segment_text(&segment);
        assert_eq!(text, "Hello world");
        assert_eq!(start, 1.5);
        assert_eq!(end, 2.4);
    }

    #[test]
    fn wordless_segment_has_zero_bounds() {
        let segment = TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![],
        };
        let (text, start, end) = GoogleNlEngine::segment_text(&segment);
        assert!(text.is_empty());
        assert_eq!(start, 0.0);
        assert_eq!(end, 0.0);
    }
}
