//! Speechmatics batch API client.
//!
//! Submits the audio file, polls the job until completion, fetches the
//! json-v2 transcript, and converts it into the internal transcript model.
//! Rate-limit and unavailable responses during polling are waited out;
//! during submission they surface as transient network errors so the
//! pipeline's retry wrapper can take over.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::Value;
use tokio::time::Instant;
use tracing::info;

use crate::error::{PipelineError, Result};

use super::{SpeechRecognizer, Transcript, TranscriptSegment, TranscriptWord, TranscriptionMetadata};

pub const PROVIDER: &str = "speechmatics";

const DEFAULT_BASE_URL: &str = "https://asr.api.speechmatics.com/v2";
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct SpeechmaticsRecognizer {
    api_key: String,
    base_url: String,
    job_timeout: Duration,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl SpeechmaticsRecognizer {
    pub fn new(api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(PipelineError::config("speechmatics api key is required"));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            client: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn submit_job(&self, audio_path: &Path, metadata: &TranscriptionMetadata) -> Result<String> {
        let audio = tokio::fs::read(audio_path).await?;
        let config = serde_json::json!({
            "type": "transcription",
            "transcription_config": {
                "language": metadata.language.as_deref().unwrap_or("en"),
                "diarization": "speaker",
            },
        });

        let part = multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::asr(PROVIDER, format!("invalid upload part: {e}")))?;
        let form = multipart::Form::new()
            .text("config", config.to_string())
            .part("data_file", part);

        let response = self
            .client
            .post(format!("{}/jobs/", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::network("asr submit", e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 503 {
            return Err(PipelineError::network(
                "asr submit",
                format!("vendor returned HTTP {status} during job submission"),
            ));
        }
        if status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::asr(
                PROVIDER,
                format!("job submission failed with HTTP {status}: {body}"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::asr(PROVIDER, format!("invalid submission response: {e}")))?;
        let job_id = body["id"]
            .as_str()
            .ok_or_else(|| PipelineError::asr(PROVIDER, "no job id in submission response"))?;

        info!(job_id, batch_id = %metadata.batch_id, "submitted transcription job");
        Ok(job_id.to_string())
    }

    async fn poll_until_complete(&self, job_id: &str) -> Result<()> {
        let url = format!("{}/jobs/{job_id}", self.base_url);
        let deadline = Instant::now() + self.job_timeout;

        while Instant::now() < deadline {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| PipelineError::network("asr poll", e.to_string()))?;

            let status = response.status().as_u16();
            if status == 429 || status == 503 {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if status != 200 {
                let body = response.text().await.unwrap_or_default();
                return Err(PipelineError::asr(
                    PROVIDER,
                    format!("status poll failed with HTTP {status}: {body}"),
                ));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| PipelineError::asr(PROVIDER, format!("invalid poll response: {e}")))?;
            match body["job"]["status"].as_str().unwrap_or_default() {
                "done" => {
                    info!(job_id, "transcription job completed");
                    return Ok(());
                }
                state @ ("rejected" | "deleted") => {
                    return Err(PipelineError::asr(
                        PROVIDER,
                        format!("job {job_id} was {state}"),
                    ));
                }
                // Still queued or running.
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(PipelineError::asr(
            PROVIDER,
            format!(
                "job {job_id} timed out after {}s",
                self.job_timeout.as_secs()
            ),
        ))
    }

    async fn fetch_transcript(&self, job_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/jobs/{job_id}/transcript", self.base_url))
            .query(&[("format", "json-v2")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PipelineError::network("asr transcript fetch", e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::asr(
                PROVIDER,
                format!("transcript fetch failed with HTTP {status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::asr(PROVIDER, format!("invalid transcript response: {e}")))
    }

    /// Convert a json-v2 response into the internal model.
    ///
    /// Consecutive words from the same speaker form one segment; raw speaker
    /// ids (S1, S2, UU) map to `Speaker N` labels in first-seen order.
    /// Punctuation results are skipped.
    fn convert_response(raw_response: Value) -> Transcript {
        let Some(results) = raw_response["results"].as_array().cloned() else {
            return Transcript {
                segments: vec![],
                raw_response,
            };
        };

        let mut speaker_labels: Vec<String> = Vec::new();
        let mut segments: Vec<TranscriptSegment> = Vec::new();
        let mut current_speaker: Option<String> = None;
        let mut current_words: Vec<TranscriptWord> = Vec::new();

        for result in &results {
            if result["type"].as_str() != Some("word") {
                continue;
            }
            let Some(alt) = result["alternatives"].as_array().and_then(|a| a.first()) else {
                continue;
            };

            let raw_speaker = alt["speaker"].as_str().unwrap_or("UU").to_string();
            let position = match speaker_labels.iter().position(|s| *s == raw_speaker) {
                Some(position) => position,
                None => {
                    speaker_labels.push(raw_speaker.clone());
                    speaker_labels.len() - 1
                }
            };
            let friendly = format!("Speaker {}", position + 1);

            let word = TranscriptWord {
                text: alt["content"].as_str().unwrap_or_default().to_string(),
                start_time: result["start_time"].as_f64().unwrap_or(0.0),
                end_time: result["end_time"].as_f64().unwrap_or(0.0),
                confidence: alt["confidence"].as_f64().unwrap_or(0.0),
            };

            if current_speaker.as_deref() != Some(friendly.as_str()) {
                if let Some(speaker) = current_speaker.take()
                    && !current_words.is_empty()
                {
                    segments.push(TranscriptSegment {
                        speaker_label: speaker,
                        words: std::mem::take(&mut current_words),
                    });
                }
                current_speaker = Some(friendly);
                current_words = vec![word];
            } else {
                current_words.push(word);
            }
        }

        if let Some(speaker) = current_speaker
            && !current_words.is_empty()
        {
            segments.push(TranscriptSegment {
                speaker_label: speaker,
                words: current_words,
            });
        }

        Transcript {
            segments,
            raw_response,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for SpeechmaticsRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        metadata: &TranscriptionMetadata,
    ) -> Result<Transcript> {
        let job_id = self.submit_job(audio_path, metadata).await?;
        self.poll_until_complete(&job_id).await?;
        let raw_response = self.fetch_transcript(&job_id).await?;
        Ok(Self::convert_response(raw_response))
    }
}
