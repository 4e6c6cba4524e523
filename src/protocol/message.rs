//! Caller-facing intent message

use std::collections::HashSet;

use super::{
    DEFAULT_HOP_LIMIT, DEFAULT_TTL_SECS, MAX_HOP_LIMIT, MAX_NOTE_LEN, MAX_SIGIL_LEN,
    ValidationError,
};

/// A short symbolic message before it is sealed for the wire.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntentMessage {
    /// Ordered set of sigils naming the intent
    pub sigils: Vec<String>,
    /// How strongly the sender holds the intent, in `[0, 1]`
    pub intent_strength: f32,
    /// Optional note (at most 96 UTF-8 bytes)
    pub note: Option<String>,
    /// Seconds until the message expires
    pub ttl: u32,
    /// Relays the message may traverse
    pub hop_limit: u8,
}

impl IntentMessage {
    /// Create a message with the default TTL and hop limit
    pub fn new<I, S>(sigils: I, intent_strength: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sigils: sigils.into_iter().map(Into::into).collect(),
            intent_strength,
            note: None,
            ttl: DEFAULT_TTL_SECS,
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }

    /// Attach a note
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Set the time-to-live in seconds
    #[must_use]
    pub const fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the hop limit
    #[must_use]
    pub const fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Check every caller-facing invariant
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sigils.is_empty() {
            return Err(ValidationError::NoSigils);
        }

        let mut seen = HashSet::with_capacity(self.sigils.len());
        for (index, sigil) in self.sigils.iter().enumerate() {
            if sigil.is_empty() {
                return Err(ValidationError::EmptySigil { index });
            }
            if sigil.len() > MAX_SIGIL_LEN {
                return Err(ValidationError::SigilTooLong {
                    sigil: sigil.clone(),
                    len: sigil.len(),
                    max: MAX_SIGIL_LEN,
                });
            }
            if !seen.insert(sigil.as_str()) {
                return Err(ValidationError::DuplicateSigil(sigil.clone()));
            }
        }

        if !(0.0..=1.0).contains(&self.intent_strength) {
            return Err(ValidationError::IntentStrengthOutOfRange(
                self.intent_strength,
            ));
        }

        if let Some(note) = &self.note {
            if note.len() > MAX_NOTE_LEN {
                return Err(ValidationError::NoteTooLong {
                    len: note.len(),
                    max: MAX_NOTE_LEN,
                });
            }
        }

        if self.ttl == 0 {
            return Err(ValidationError::ZeroTtl);
        }

        if self.hop_limit > MAX_HOP_LIMIT {
            return Err(ValidationError::HopLimitTooHigh {
                hop_limit: self.hop_limit,
                max: MAX_HOP_LIMIT,
            });
        }

        Ok(())
    }
}
