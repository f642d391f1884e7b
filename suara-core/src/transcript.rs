//! Transcript reconciliation.
//!
//! The recognizer delivers cumulative batches: within one recognizer run every
//! delivery repeats all earlier entries, finals first, followed by the interim
//! tail. After a restart the numbering starts over and the batch only holds
//! what was said since the restart.
//!
//! `TranscriptAccumulator` tracks, per restart epoch, how many characters of
//! final text it has already moved into `confirmed`. Only the excess of a new
//! batch over that count is appended, so re-deliveries are idempotent and a
//! restart (which zeroes the count) never drops or repeats finalized speech.

use serde::{Deserialize, Serialize};

use crate::platform::RecognitionResultBatch;

/// Live dictation text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Finalized text. Only ever appended to while a session runs.
    pub confirmed: String,
    /// Interim tail of the utterance in progress; replaced on every batch.
    pub provisional: String,
}

impl Transcript {
    /// Text to display: `confirmed + provisional`.
    pub fn display(&self) -> String {
        let mut out = String::with_capacity(self.confirmed.len() + self.provisional.len());
        out.push_str(&self.confirmed);
        out.push_str(&self.provisional);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.provisional.is_empty()
    }

    /// Frozen text shown once a session stops.
    ///
    /// Finalized speech wins; the interim tail is only used when nothing was
    /// ever finalized, so a half-spoken utterance is shown but never promoted.
    pub fn finalize(&self) -> String {
        let confirmed = self.confirmed.trim();
        if confirmed.is_empty() {
            self.display().trim().to_string()
        } else {
            confirmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    transcript: Transcript,
    epoch: u64,
    /// Characters of final text from `epoch` already merged into `confirmed`.
    confirmed_in_epoch: usize,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over from `existing` text, e.g. what the user had on screen.
    ///
    /// Non-empty text is kept as confirmed with a trailing separator so new
    /// speech is appended after it.
    pub fn seed(&mut self, existing: &str) {
        let existing = existing.trim();
        self.transcript = Transcript::default();
        if !existing.is_empty() {
            self.transcript.confirmed.push_str(existing);
            self.transcript.confirmed.push(' ');
        }
        self.epoch = 0;
        self.confirmed_in_epoch = 0;
    }

    /// Drop all text and bookkeeping.
    pub fn reset(&mut self) {
        self.seed("");
    }

    pub fn snapshot(&self) -> &Transcript {
        &self.transcript
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fold one recognizer delivery into the transcript.
    pub fn apply(&mut self, batch: &RecognitionResultBatch, epoch: u64) -> &Transcript {
        if epoch != self.epoch {
            self.epoch = epoch;
            self.confirmed_in_epoch = 0;
        }

        let mut batch_final = String::new();
        let mut provisional = String::new();
        for result in &batch.results {
            if result.is_final {
                batch_final.push_str(&result.text);
            } else {
                provisional.push_str(&result.text);
            }
        }

        let final_len = batch_final.chars().count();
        if final_len > self.confirmed_in_epoch {
            let fresh: String = batch_final.chars().skip(self.confirmed_in_epoch).collect();
            self.append_confirmed(&fresh);
            self.confirmed_in_epoch = final_len;
        }
        self.transcript.provisional = provisional;

        &self.transcript
    }

    /// Forget the interim tail without touching confirmed text.
    pub fn clear_provisional(&mut self) {
        self.transcript.provisional.clear();
    }

    fn append_confirmed(&mut self, fresh: &str) {
        let fresh = fresh.trim();
        if fresh.is_empty() {
            return;
        }
        let confirmed = &mut self.transcript.confirmed;
        if !confirmed.is_empty() && !confirmed.ends_with(char::is_whitespace) {
            confirmed.push(' ');
        }
        confirmed.push_str(fresh);
        confirmed.push(' ');
    }
}
