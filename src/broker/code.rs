//! Verification code parsing and suggestion.

use std::fmt;

use rand::Rng;
use serde::Serialize;

use super::error::BrokerError;

/// Length of codes produced by [`VCode::random`]
pub const SUGGESTED_CODE_LENGTH: usize = 6;

const SUGGESTION_CHARSET: &[u8] = b"0123456789";

/// Case-sensitive verification code shared between a sender and a receiver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VCode(String);

impl VCode {
    /// Validate a caller-supplied code.
    ///
    /// Codes are taken verbatim: surrounding whitespace is rejected rather
    /// than trimmed so that two clients never disagree on what was typed.
    pub fn parse(raw: &str, max_length: usize) -> Result<Self, BrokerError> {
        if raw.is_empty() {
            return Err(BrokerError::InvalidInput("vCode must not be empty".into()));
        }

        if raw.chars().count() > max_length {
            return Err(BrokerError::InvalidInput(format!(
                "vCode must be at most {} characters",
                max_length
            )));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BrokerError::InvalidInput(
                "vCode may only contain ASCII letters, digits, '-' and '_'".into(),
            ));
        }

        Ok(Self(raw.to_string()))
    }

    /// Random numeric code, easy to read out loud
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let code = (0..SUGGESTED_CODE_LENGTH)
            .map(|_| SUGGESTION_CHARSET[rng.random_range(0..SUGGESTION_CHARSET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
