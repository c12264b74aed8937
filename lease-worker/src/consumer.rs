//! Worker pool polling the task queue and its poison queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    ConfigError, QueueError, QueueResult,
    config::WorkerConfig,
    dispatch::HandlerRegistry,
    observability::TelemetrySink,
    poison::PoisonHandler,
    processor::TaskProcessor,
    store::OutcomeStore,
    transport::QueueTransport,
};

/// Long-lived consumer wiring the processor and the poison handler to a transport
pub struct Consumer {
    transport: Arc<dyn QueueTransport>,
    processor: TaskProcessor,
    poison: Arc<PoisonHandler>,
    telemetry: Arc<dyn TelemetrySink>,
    config: Arc<WorkerConfig>,
}

impl Consumer {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn OutcomeStore>,
        telemetry: Arc<dyn TelemetrySink>,
        config: WorkerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            processor: TaskProcessor::new(
                transport.clone(),
                registry,
                store.clone(),
                telemetry.clone(),
                config.clone(),
            ),
            poison: Arc::new(PoisonHandler::new(store, telemetry.clone(), config.retry.max_attempts())),
            transport,
            telemetry,
            config,
        })
    }

    pub fn processor(&self) -> &TaskProcessor {
        &self.processor
    }

    /// Spawn the task loop, the poison loop and the depth sampler
    pub fn start(&self) -> ConsumerHandle {
        let cancel = CancellationToken::new();
        let mut loops = JoinSet::new();

        loops.spawn(
            task_loop(
                self.transport.clone(),
                self.processor.clone(),
                self.config.clone(),
                cancel.clone(),
            )
            .instrument(info_span!("task_loop", queue = %self.config.queue)),
        );
        loops.spawn(
            poison_loop(
                self.transport.clone(),
                self.poison.clone(),
                self.config.clone(),
                cancel.clone(),
            )
            .instrument(info_span!("poison_loop", queue = %self.config.poison_queue())),
        );
        loops.spawn(depth_sampler(
            self.transport.clone(),
            self.telemetry.clone(),
            self.config.clone(),
            cancel.clone(),
        ));

        info!(
            queue = %self.config.queue,
            max_concurrency = self.config.max_concurrency,
            "Consumer started"
        );

        ConsumerHandle { cancel, loops }
    }
}

/// Handle for stopping a running consumer.
///
/// Dropping it cancels the loops without waiting for in-flight messages.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    loops: JoinSet<()>,
}

impl ConsumerHandle {
    /// Stop polling and wait for in-flight messages to finish
    pub async fn shutdown(mut self) -> QueueResult<()> {
        self.cancel.cancel();

        let mut result = Ok(());
        while let Some(joined) = self.loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Consumer loop aborted");
                result = Err(QueueError::Internal(format!("consumer loop aborted: {}", e)));
            }
        }

        info!("Consumer stopped");
        result
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn task_loop(
    transport: Arc<dyn QueueTransport>,
    processor: TaskProcessor,
    config: Arc<WorkerConfig>,
    cancel: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(config.max_concurrency));
    let mut in_flight = JoinSet::new();

    loop {
        while let Some(joined) = in_flight.try_join_next() {
            log_join(joined);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match transport.dequeue(&config.queue, config.visibility_timeout).await {
            Ok(Some(message)) => {
                let processor = processor.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = processor.process(message).await {
                        debug!(error = %e, task_id = %e.task_id(), attempt = e.attempt(), "Message left for redelivery");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                if !idle(&cancel, config.poll_interval).await {
                    break;
                }
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "Dequeue failed");
                if !idle(&cancel, config.poll_interval).await {
                    break;
                }
            }
        }
    }

    debug!(in_flight = in_flight.len(), "Draining in-flight messages");
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
}

async fn poison_loop(
    transport: Arc<dyn QueueTransport>,
    poison: Arc<PoisonHandler>,
    config: Arc<WorkerConfig>,
    cancel: CancellationToken,
) {
    let queue = config.poison_queue();

    while !cancel.is_cancelled() {
        let message = match transport.dequeue(&queue, config.visibility_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                if !idle(&cancel, config.poll_interval).await {
                    break;
                }
                continue;
            }
            Err(e) => {
                error!(error = %e, "Poison dequeue failed");
                if !idle(&cancel, config.poll_interval).await {
                    break;
                }
                continue;
            }
        };

        match poison.handle(&message).await {
            Ok(_) => {
                if let Err(e) = transport.delete(&message.lease()).await {
                    warn!(message_id = %message.message_id, error = %e, "Failed to delete handled poison message");
                }
            }
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "Poison message kept for another attempt");
            }
        }
    }
}

async fn depth_sampler(
    transport: Arc<dyn QueueTransport>,
    telemetry: Arc<dyn TelemetrySink>,
    config: Arc<WorkerConfig>,
    cancel: CancellationToken,
) {
    let queues = [config.queue.clone(), config.poison_queue()];
    let mut ticker = interval(config.depth_sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for queue in &queues {
            match transport.depth(queue).await {
                Ok(depth) => telemetry.record_queue_depth(queue, depth),
                Err(e) => warn!(queue = %queue, error = %e, "Failed to sample queue depth"),
            }
        }
    }
}

/// Wait for `wait` unless cancelled first; `false` means stop
async fn idle(cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Message processing task panicked");
    }
}
