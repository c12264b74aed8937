use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::{Lease, RenewalSchedule};
use crate::{QueueError, QueueResult, transport::QueueTransport, types::MessageId};

/// Counters reported when a renewal loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    /// Renewals that replaced the receipt
    pub renewals: u32,

    /// Renewal calls the transport rejected
    pub failures: u32,
}

/// Starts background renewal loops against a transport
#[derive(Clone)]
pub struct LeaseRenewer {
    transport: Arc<dyn QueueTransport>,
}

impl LeaseRenewer {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    /// Move `lease` into a renewal loop.
    ///
    /// The lease comes back only through [`RenewalHandle::stop`], so nothing
    /// can use its receipt while the loop may still replace it.
    pub fn start(&self, lease: Lease, schedule: RenewalSchedule) -> RenewalHandle {
        let cancel = CancellationToken::new();
        let message_id = lease.message_id().clone();
        let span = info_span!("lease_renewal", message_id = %message_id);

        let task = tokio::spawn(
            renew_until_cancelled(self.transport.clone(), lease, schedule, cancel.clone())
                .instrument(span),
        );

        debug!(
            message_id = %message_id,
            extension = ?schedule.extension(),
            interval = ?schedule.interval(),
            "Started lease renewal"
        );

        RenewalHandle {
            message_id,
            cancel,
            task,
        }
    }
}

/// Owner-side handle of a running renewal loop.
///
/// Dropping the handle cancels the loop; the lease is then lost and expires
/// naturally on the transport.
pub struct RenewalHandle {
    message_id: MessageId,
    cancel: CancellationToken,
    task: JoinHandle<(Lease, RenewalSummary)>,
}

impl RenewalHandle {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Cancel the loop and wait for the current iteration to finish.
    ///
    /// Returns the lease holding the most recent receipt.
    pub async fn stop(mut self) -> QueueResult<(Lease, RenewalSummary)> {
        self.cancel.cancel();

        let (lease, summary) = (&mut self.task)
            .await
            .map_err(|e| QueueError::Internal(format!("renewal loop aborted: {}", e)))?;

        debug!(
            message_id = %self.message_id,
            renewals = summary.renewals,
            failures = summary.failures,
            "Stopped lease renewal"
        );
        Ok((lease, summary))
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn renew_until_cancelled(
    transport: Arc<dyn QueueTransport>,
    mut lease: Lease,
    schedule: RenewalSchedule,
    cancel: CancellationToken,
) -> (Lease, RenewalSummary) {
    let mut ticker = interval_at(Instant::now() + schedule.interval(), schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut summary = RenewalSummary::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Not raced against cancellation: a renewal in flight must land so the
        // lease keeps the receipt the transport considers current.
        match transport.renew(&lease, schedule.extension()).await {
            Ok(receipt) => {
                lease.replace_receipt(receipt);
                summary.renewals += 1;
                debug!(renewals = summary.renewals, "Lease renewed");
            }
            Err(e) => {
                summary.failures += 1;
                warn!(error = %e, failures = summary.failures, "Lease renewal failed, retrying on next tick");
            }
        }
    }

    (lease, summary)
}
