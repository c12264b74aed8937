//! Delivery-attempt classification.

use crate::error::ConfigError;

/// How close a delivery is to being poison-routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryClass {
    Normal,
    Warn,
    /// Last attempt before the transport poison-routes the message
    Terminal,
}

/// Classify a 1-based delivery attempt.
///
/// Purely informational; the transport decides when a message is poisoned.
pub fn classify(attempt: u32, warn_threshold: u32, max_attempts: u32) -> DeliveryClass {
    if attempt >= max_attempts {
        DeliveryClass::Terminal
    } else if attempt >= warn_threshold {
        DeliveryClass::Warn
    } else {
        DeliveryClass::Normal
    }
}

/// Validated pair of thresholds for [`classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    warn_threshold: u32,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(warn_threshold: u32, max_attempts: u32) -> Result<Self, ConfigError> {
        if warn_threshold >= max_attempts {
            return Err(ConfigError::InvalidRetryPolicy {
                warn_threshold,
                max_attempts,
            });
        }
        Ok(Self {
            warn_threshold,
            max_attempts,
        })
    }

    pub fn warn_threshold(&self) -> u32 {
        self.warn_threshold
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn classify(&self, attempt: u32) -> DeliveryClass {
        classify(attempt, self.warn_threshold, self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            warn_threshold: 3,
            max_attempts: 5,
        }
    }
}
