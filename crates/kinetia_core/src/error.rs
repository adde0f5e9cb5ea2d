//! Error types for the simulation core.
//!
//! Every failure here is treated as a configuration or programming defect and is
//! surfaced immediately; nothing is retried.

use thiserror::Error;

/// Main error type for kinetia_core operations.
#[derive(Error, Debug)]
pub enum SimError {
    /// Store index that is out of range or refers to a deactivated slot
    #[error("Invalid particle reference: index {index}")]
    InvalidParticleReference { index: usize },

    /// Edge or membership change that would corrupt a topology graph
    #[error("Malformed topology: {0}")]
    MalformedTopology(String),

    #[error("Negative rate {rate} for {name}")]
    NegativeRate { name: String, rate: f64 },

    #[error("Negative breaking threshold {0}")]
    NegativeThreshold(f64),

    /// Forward/backward reactions that cannot form a reversible pair
    #[error("Unsatisfiable detailed balance pair: {0}")]
    UnsatisfiableDetailedBalancePair(String),

    #[error("Unknown particle type: {0}")]
    UnknownParticleType(String),

    #[error("Unknown reaction: {0}")]
    UnknownReaction(String),

    #[error("Unknown topology type: {0}")]
    UnknownTopologyType(String),

    /// Non-positive box, zero reaction volume, bad weights, parse failures
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<SimError>,
    },
}

/// Result type alias for kinetia_core operations.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    #[must_use]
    pub fn invalid_reference(index: usize) -> Self {
        Self::InvalidParticleReference { index }
    }

    /// Creates a new malformed topology error.
    #[must_use]
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedTopology(msg.into())
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    #[must_use]
    pub fn unsatisfiable<S: Into<String>>(msg: S) -> Self {
        Self::UnsatisfiableDetailedBalancePair(msg.into())
    }

    /// Wraps an error with additional context.
    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::invalid_reference(7);
        assert_eq!(err.to_string(), "Invalid particle reference: index 7");
    }

    #[test]
    fn test_error_context() {
        let err = SimError::malformed("self edge").with_context("adding bond");
        assert!(err.to_string().contains("adding bond"));
        assert!(err.to_string().contains("self edge"));
    }

    #[test]
    fn test_negative_rate_names_reaction() {
        let err = SimError::NegativeRate {
            name: "decay".into(),
            rate: -1.0,
        };
        assert!(err.to_string().contains("decay"));
    }
}
