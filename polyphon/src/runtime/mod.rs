//! Driving the pipeline: pulling deliveries off the bus, dispatching them
//! and settling each delivery according to its outcome.
//!
//! | Outcome | Bus action |
//! |---------|------------|
//! | `Ack`   | ack        |
//! | `Nack`  | nack, redelivered per the bus policy |
//! | `Fatal` | reject, parked as a dead letter |

use crate::bus::{Delivery, MessageBus, RedeliveryDecision, RedeliveryPolicy, Subscription};
use crate::core::{Event, Outcome};
use crate::dispatch::{DispatchResult, Dispatcher};
use crate::errors::{PipelineError, Result, TransientCapabilityError};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(5);

/// Outcome counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Deliveries acked.
    pub acked: usize,
    /// Deliveries nacked.
    pub nacked: usize,
    /// Deliveries rejected.
    pub fatal: usize,
}

impl RunSummary {
    /// Counts one outcome.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Ack => self.acked += 1,
            Outcome::Nack => self.nacked += 1,
            Outcome::Fatal => self.fatal += 1,
        }
    }

    /// Total deliveries handled.
    #[must_use]
    pub fn total(&self) -> usize {
        self.acked + self.nacked + self.fatal
    }

    /// Returns true if nothing was handled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: Self) {
        self.acked += other.acked;
        self.nacked += other.nacked;
        self.fatal += other.fatal;
    }
}

/// Connects a [`Dispatcher`] to a [`MessageBus`].
pub struct PipelineRunner {
    dispatcher: Arc<Dispatcher>,
    bus: Arc<dyn MessageBus>,
    subscriptions: Vec<Box<dyn Subscription>>,
    policy: RedeliveryPolicy,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("dispatcher", &self.dispatcher)
            .field(
                "subscriptions",
                &self.subscriptions.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

async fn settle(sub: &dyn Subscription, delivery: &Delivery, result: &DispatchResult) -> Result<()> {
    match result.outcome {
        Outcome::Ack => sub.ack(delivery).await,
        Outcome::Nack => sub.nack(delivery).await,
        Outcome::Fatal => {
            let reason = result
                .error
                .as_ref()
                .map_or_else(|| "no stage for event".to_string(), ToString::to_string);
            sub.reject(delivery, &reason).await
        }
    }
}

impl PipelineRunner {
    /// Creates a runner. Blob-triggered retries follow the settings'
    /// redelivery policy.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, bus: Arc<dyn MessageBus>) -> Self {
        let policy = dispatcher.context().settings().redelivery.clone();
        Self {
            dispatcher,
            bus,
            subscriptions: Vec::new(),
            policy,
        }
    }

    /// Subscribes one `{stage}-sub` subscription per topic-triggered stage.
    ///
    /// Must run before anything is published: the bus only delivers to
    /// subscriptions that already exist.
    pub async fn attach(&mut self) -> Result<()> {
        for (stage, topic) in self.dispatcher.topics() {
            let name = format!("{stage}-sub");
            let sub = self.bus.subscribe(&topic, &name).await?;
            debug!(subscription = %name, topic = %topic, "Subscription attached");
            self.subscriptions.push(sub);
        }
        Ok(())
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Deliveries not yet settled across all subscriptions.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.subscriptions.iter().map(|s| s.backlog()).sum()
    }

    /// Dispatches an event that did not come from a subscription, such as
    /// a blob write, retrying `Nack` per the redelivery policy.
    ///
    /// Returns the final outcome; `Nack` means attempts ran out.
    pub async fn submit(&self, event: &Event) -> Outcome {
        let mut attempt = 1;
        loop {
            let outcome = self.dispatcher.dispatch(event).await;
            if outcome != Outcome::Nack {
                return outcome;
            }
            match self.policy.decide(attempt) {
                RedeliveryDecision::Redeliver(delay) => {
                    debug!(attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Retrying event");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RedeliveryDecision::DeadLetter => {
                    warn!(kind = event.kind(), attempts = attempt, "Event retries exhausted");
                    return Outcome::Nack;
                }
            }
        }
    }

    /// Handles every delivery that is ready right now, once.
    pub async fn pump_once(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for sub in &mut self.subscriptions {
            while let Some(delivery) = sub.try_recv() {
                let result = self.dispatcher.dispatch_detailed(&delivery.to_event()).await;
                settle(&**sub, &delivery, &result).await?;
                summary.record(result.outcome);
            }
        }
        Ok(summary)
    }

    /// Pumps until every subscription is drained and no redelivery is
    /// pending.
    pub async fn run_until_idle(&mut self, timeout: Duration) -> Result<RunSummary> {
        let started = Instant::now();
        let mut total = RunSummary::default();

        loop {
            let pass = self.pump_once().await?;
            total += pass;

            if pass.is_empty() {
                if self.backlog() == 0 {
                    info!(acked = total.acked, nacked = total.nacked, fatal = total.fatal, "Pipeline idle");
                    return Ok(total);
                }
                tokio::time::sleep(IDLE_POLL).await;
            }

            if started.elapsed() > timeout {
                return Err(PipelineError::Transient(TransientCapabilityError::new(
                    "runtime",
                    format!("pipeline not idle after {timeout:?}, backlog {}", self.backlog()),
                )));
            }
        }
    }

    /// Runs one worker task per subscription until shut down.
    #[must_use]
    pub fn spawn(self) -> RunnerHandle {
        let (shutdown, watcher) = watch::channel(false);
        let tasks = self
            .subscriptions
            .into_iter()
            .map(|sub| {
                let dispatcher = self.dispatcher.clone();
                let watcher = watcher.clone();
                tokio::spawn(worker(dispatcher, sub, watcher))
            })
            .collect();

        RunnerHandle { shutdown, tasks }
    }
}

async fn worker(
    dispatcher: Arc<Dispatcher>,
    mut sub: Box<dyn Subscription>,
    mut shutdown: watch::Receiver<bool>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    loop {
        let delivery = tokio::select! {
            _ = shutdown.changed() => break,
            delivery = sub.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let result = dispatcher.dispatch_detailed(&delivery.to_event()).await;
        if let Err(e) = settle(sub.as_ref(), &delivery, &result).await {
            warn!(subscription = %sub.name(), error = %e, "Failed to settle delivery");
        }
        summary.record(result.outcome);
    }
    debug!(subscription = %sub.name(), handled = summary.total(), "Worker stopped");
    summary
}

/// Handle on spawned workers.
#[derive(Debug)]
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<RunSummary>>,
}

impl RunnerHandle {
    /// Stops every worker after its current delivery and sums their counts.
    pub async fn shutdown(self) -> RunSummary {
        let _ = self.shutdown.send(true);
        let mut total = RunSummary::default();
        for task in self.tasks {
            if let Ok(summary) = task.await {
                total += summary;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record(Outcome::Ack);
        summary.record(Outcome::Ack);
        summary.record(Outcome::Fatal);

        let mut total = RunSummary::default();
        total += summary;
        assert_eq!(total.acked, 2);
        assert_eq!(total.fatal, 1);
        assert_eq!(total.total(), 3);
        assert!(!total.is_empty());
    }
}
