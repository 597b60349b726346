//! Progress events emitted while a migration runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point on the migration's global 0–100 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percentage complete, 0..=100
    pub percent: u8,

    /// Optional human-readable detail
    pub message: Option<String>,
}

impl ProgressEvent {
    /// Event with a message. Percentages above 100 are clamped.
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: Some(message.into()),
        }
    }

    /// Event carrying only a percentage.
    pub fn percent(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
            message: None,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "[{:>3}%] {}", self.percent, message),
            None => write!(f, "[{:>3}%]", self.percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped() {
        assert_eq!(ProgressEvent::percent(150).percent, 100);
        assert_eq!(ProgressEvent::new(101, "x").percent, 100);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProgressEvent::new(5, "starting").to_string(), "[  5%] starting");
        assert_eq!(ProgressEvent::percent(100).to_string(), "[100%]");
    }
}
