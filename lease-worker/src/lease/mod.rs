//! Visibility leases and their background renewal.

pub mod renewer;

pub use renewer::{LeaseRenewer, RenewalHandle, RenewalSummary};

use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{MessageId, Receipt};

/// Exclusive hold on one delivery of a message.
///
/// Not `Clone`: whoever owns the `Lease` is the only party allowed to renew or
/// delete the message with its receipt.
#[derive(Debug, PartialEq, Eq)]
pub struct Lease {
    queue: String,
    message_id: MessageId,
    receipt: Receipt,
    renewals: u32,
}

impl Lease {
    pub fn new(queue: String, message_id: MessageId, receipt: Receipt) -> Self {
        Self {
            queue,
            message_id,
            receipt,
            renewals: 0,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Current receipt
    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    /// Successful renewals applied to this lease
    pub fn renewals(&self) -> u32 {
        self.renewals
    }

    /// Swap in the receipt returned by a successful renewal
    pub(crate) fn replace_receipt(&mut self, receipt: Receipt) {
        self.receipt = receipt;
        self.renewals += 1;
    }
}

/// How far and how often a lease is extended.
///
/// The interval is always strictly shorter than the extension, so a late tick
/// still lands before the lease runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalSchedule {
    extension: Duration,
    interval: Duration,
}

impl RenewalSchedule {
    pub fn new(extension: Duration, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() || interval >= extension {
            return Err(ConfigError::InvalidRenewalSchedule {
                extension,
                interval,
            });
        }
        Ok(Self {
            extension,
            interval,
        })
    }

    pub fn extension(&self) -> Duration {
        self.extension
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RenewalSchedule {
    fn default() -> Self {
        Self {
            extension: Duration::from_secs(120),
            interval: Duration::from_secs(60),
        }
    }
}
