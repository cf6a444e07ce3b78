use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single transcription result emitted for a session
///
/// Results are immutable values; every recognition event produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub session_id: String,

    /// Transcribed text
    pub transcript: String,

    /// Whether this is an in-progress guess that later results supersede
    pub is_partial: bool,

    /// Confidence score (0.0 to 1.0), meaningful for final results
    pub confidence: f32,

    /// When this result was produced
    pub timestamp: DateTime<Utc>,

    /// Set on the final result of a session whose worker failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResult {
    pub fn partial(session_id: impl Into<String>, transcript: impl Into<String>, confidence: f32) -> Self {
        Self::new(session_id.into(), transcript.into(), true, confidence, None)
    }

    pub fn final_result(
        session_id: impl Into<String>,
        transcript: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self::new(session_id.into(), transcript.into(), false, confidence, None)
    }

    /// Final result for a session that ended on a worker fault
    pub fn degraded(
        session_id: impl Into<String>,
        transcript: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(session_id.into(), transcript.into(), false, 0.0, Some(error.into()))
    }

    fn new(
        session_id: String,
        transcript: String,
        is_partial: bool,
        confidence: f32,
        error: Option<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            session_id,
            transcript,
            is_partial,
            confidence,
            timestamp: Utc::now(),
            error,
        }
    }

    pub fn is_final(&self) -> bool {
        !self.is_partial
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Most recent result of a session
///
/// Once a final result is held, later partial results are ignored.
#[derive(Debug, Default)]
pub(crate) struct LastResult(Option<TranscriptionResult>);

impl LastResult {
    /// Record `result`; returns false when it would supersede a final result
    pub fn update(&mut self, result: &TranscriptionResult) -> bool {
        if matches!(&self.0, Some(current) if current.is_final()) && result.is_partial {
            return false;
        }
        self.0 = Some(result.clone());
        true
    }

    pub fn get(&self) -> Option<TranscriptionResult> {
        self.0.clone()
    }

    pub fn has_final(&self) -> bool {
        matches!(&self.0, Some(current) if current.is_final())
    }
}

/// Running transcript built from recognizer events
///
/// Segment-level finals from the recognizer are committed; partials replace
/// the live hypothesis that trails the committed text.
#[derive(Debug, Default)]
pub(crate) struct TranscriptBuilder {
    committed: Vec<(String, f32)>,
    hypothesis: Option<String>,
}

impl TranscriptBuilder {
    /// Apply one recognizer event and return the transcript as it now reads
    pub fn apply(&mut self, text: &str, is_partial: bool, confidence: f32) -> String {
        let text = text.trim();
        if is_partial {
            self.hypothesis = (!text.is_empty()).then(|| text.to_string());
        } else {
            if !text.is_empty() {
                self.committed.push((text.to_string(), confidence));
            }
            self.hypothesis = None;
        }
        self.current()
    }

    /// Committed text followed by any trailing hypothesis
    pub fn current(&self) -> String {
        self.committed
            .iter()
            .map(|(text, _)| text.as_str())
            .chain(self.hypothesis.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Mean confidence of the committed segments
    pub fn confidence(&self) -> f32 {
        if self.committed.is_empty() {
            return 0.0;
        }
        let total: f32 = self.committed.iter().map(|(_, confidence)| confidence).sum();
        total / self.committed.len() as f32
    }
}
