//! Transcript formatting: timestamp markers and speaker labels.
//!
//! Produces line-oriented text with a `[MM:SS]` marker each time a word
//! crosses a 15-second boundary and a speaker label once per turn, with a
//! blank line between turns.

use super::Transcript;

const MARKER_INTERVAL_SECONDS: f64 = 15.0;

fn format_timestamp(seconds: f64) -> String {
    let total = seconds as u64;
    format!("[{:02}:{:02}]", total / 60, total % 60)
}

/// Render a transcript with timestamp markers and speaker labels.
///
/// A marker is emitted by the first word whose start time reaches the
/// floating boundary, snapped down to the nearest 15-second multiple; the
/// boundary then advances past it. Words without a marker or label prefix
/// append to the current line, space-separated. Empty transcript renders to
/// the empty string; segments without words are skipped.
pub fn insert_timestamp_markers(transcript: &Transcript) -> String {
    if transcript.segments.is_empty() {
        return String::new();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut next_marker_time = 0.0f64;
    let mut prev_speaker: Option<&str> = None;

    for segment in &transcript.segments {
        if segment.words.is_empty() {
            continue;
        }

        let speaker_changed = prev_speaker.is_some_and(|prev| prev != segment.speaker_label);
        if speaker_changed {
            lines.push(String::new());
        }
        prev_speaker = Some(&segment.speaker_label);
        let mut label_emitted = false;

        for word in &segment.words {
            let mut parts: Vec<String> = Vec::new();

            if word.start_time >= next_marker_time {
                let boundary =
                    (word.start_time / MARKER_INTERVAL_SECONDS).floor() * MARKER_INTERVAL_SECONDS;
                parts.push(format_timestamp(boundary));
                next_marker_time = boundary + MARKER_INTERVAL_SECONDS;
            }

            if !label_emitted {
                parts.push(format!("{}:", segment.speaker_label));
                label_emitted = true;
            }

            parts.push(word.text.clone());

            if parts.len() > 1 {
                // Marker and/or speaker prefix starts a new line.
                lines.push(parts.join(" "));
            } else {
                match lines.last_mut() {
                    Some(last) if !last.ends_with(':') => {
                        last.push(' ');
                        last.push_str(&word.text);
                    }
                    _ => lines.push(word.text.clone()),
                }
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{TranscriptSegment, TranscriptWord};

    fn word(text: &str, start: f64, end: f64) -> TranscriptWord {
        TranscriptWord {
            text: text.to_string(),
            start_time: start,
            end_time: end,
            confidence: 0.9,
        }
    }

    fn transcript(segments: Vec<TranscriptSegment>) -> Transcript {
        Transcript {
            segments,
            raw_response: serde_json::json!({}),
        }
    }

    #[test]
    fn markers_at_each_crossed_boundary() {
        let t = transcript(vec![TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![
                word("Hello", 0.0, 0.5),
                word("there", 14.9, 15.0),
                word("again", 15.0, 15.4),
                word("later", 30.1, 30.5),
            ],
        }]);

        let result = insert_timestamp_markers(&t);

        assert_eq!(result.matches("[00:00]").count(), 1);
        assert_eq!(result.matches("[00:15]").count(), 1);
        assert_eq!(result.matches("[00:30]").count(), 1);
        let p0 = result.find("[00:00]").unwrap();
        let p15 = result.find("[00:15]").unwrap();
        let p30 = result.find("[00:30]").unwrap();
        assert!(p0 < p15 && p15 < p30);
        assert_eq!(result.matches("Speaker 1:").count(), 1);
    }

    #[test]
    fn empty_transcript_renders_empty_string() {
        assert_eq!(insert_timestamp_markers(&transcript(vec![])), "");
    }

    #[test]
    fn short_transcript_gets_only_first_marker() {
        let t = transcript(vec![TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![word("Quick", 0.0, 0.3), word("test", 0.4, 0.7)],
        }]);

        let result = insert_timestamp_markers(&t);
        assert!(result.contains("[00:00]"));
        assert!(!result.contains("[00:15]"));
    }

    #[test]
    fn markers_past_one_minute() {
        let t = transcript(vec![TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![
                word("Start", 0.0, 0.5),
                word("middle", 60.0, 60.5),
                word("later", 75.0, 75.5),
            ],
        }]);

        let result = insert_timestamp_markers(&t);
        assert!(result.contains("[00:00]"));
        assert!(result.contains("[01:00]"));
        assert!(result.contains("[01:15]"));
    }

    #[test]
    fn speaker_change_inserts_blank_line() {
        let t = transcript(vec![
            TranscriptSegment {
                speaker_label: "Speaker 1".to_string(),
                words: vec![word("Hello", 0.0, 0.5), word("everyone", 0.6, 1.0)],
            },
            TranscriptSegment {
                speaker_label: "Speaker 2".to_string(),
                words: vec![word("Hi", 1.5, 1.8), word("there", 1.9, 2.2)],
            },
        ]);

        let result = insert_timestamp_markers(&t);
        assert!(result.contains("Speaker 1:"));
        assert!(result.contains("Speaker 2:"));
        assert!(result.contains("\n\n"));
    }

    #[test]
    fn words_between_markers_share_a_line() {
        let t = transcript(vec![TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![
                word("Hello", 0.0, 0.3),
                word("how", 0.4, 0.6),
                word("are", 0.7, 0.9),
                word("you", 1.0, 1.2),
            ],
        }]);

        let result = insert_timestamp_markers(&t);
        assert!(result.contains("how are you"));
    }

    #[test]
    fn wordless_segments_are_skipped() {
        let t = transcript(vec![
            TranscriptSegment {
                speaker_label: "Speaker 1".to_string(),
                words: vec![],
            },
            TranscriptSegment {
                speaker_label: "Speaker 2".to_string(),
                words: vec![word("Hi", 0.0, 0.4)],
            },
        ]);

        let result = insert_timestamp_markers(&t);
        // The wordless turn emits nothing, not even a blank line.
        assert_eq!(result, "[00:00] Speaker 2: Hi");
    }

    #[test]
    fn same_speaker_label_appears_once() {
        let t = transcript(vec![TranscriptSegment {
            speaker_label: "Speaker 1".to_string(),
            words: vec![
                word("Hello", 0.0, 0.5),
                word("world", 0.6, 1.0),
                word("again", 15.0, 15.5),
            ],
        }]);

        let result = insert_timestamp_markers(&t);
        assert_eq!(result.matches("Speaker 1:").count(), 1);
    }
}
