//! DashboardActor - refreshes the dashboard on an interval
//!
//! ```text
//! Timer tick → Aggregate → Publish DashboardEvent → [presenters, ...]
//!     ↑
//!     └─── Commands (RefreshNow, SwitchNode, UpdateInterval, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{DashboardCommand, DashboardEvent, SwitchOutcome};
use crate::Snapshot;
use crate::aggregator::{AggregateError, Aggregator};
use crate::control::NodeControl;

/// Actor that owns the aggregator and node control
pub struct DashboardActor {
    aggregator: Arc<Aggregator>,
    control: NodeControl,
    command_rx: mpsc::Receiver<DashboardCommand>,
    event_tx: broadcast::Sender<DashboardEvent>,

    /// Cancelled when the actor stops; in-flight rounds are children of it
    shutdown: CancellationToken,

    interval_duration: Duration,
}

impl DashboardActor {
    pub fn new(
        aggregator: Arc<Aggregator>,
        control: NodeControl,
        command_rx: mpsc::Receiver<DashboardCommand>,
        event_tx: broadcast::Sender<DashboardEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            control,
            command_rx,
            event_tx,
            shutdown: CancellationToken::new(),
            interval_duration: clamp_interval(interval),
        }
    }

    /// Runs until a Shutdown command arrives or every handle is dropped.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting dashboard actor");

        let mut ticker = new_ticker(Instant::now(), self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!("dashboard refresh failed: {e}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        DashboardCommand::RefreshNow { respond_to } => {
                            debug!("received RefreshNow command");
                            let result = self.refresh().await;
                            let _ = respond_to.send(result);
                        }

                        DashboardCommand::SwitchNode { name, respond_to } => {
                            debug!("received SwitchNode command for {name}");
                            let outcome = self.switch_node(&name).await;
                            let _ = respond_to.send(outcome);
                        }

                        DashboardCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = clamp_interval(Duration::from_secs(interval_secs));
                            ticker = ticker_after(self.interval_duration);
                        }

                        DashboardCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown.cancel();
        debug!("dashboard actor stopped");
    }

    async fn refresh(&self) -> Result<Snapshot, AggregateError> {
        let result = self.aggregator.aggregate(&self.shutdown).await;

        let event = match &result {
            Ok(snapshot) => DashboardEvent::Snapshot(Box::new(snapshot.clone())),
            Err(e) => DashboardEvent::Failed(e.clone()),
        };

        match self.event_tx.send(event) {
            Ok(receivers) => trace!("published dashboard event to {receivers} receivers"),
            Err(_) => trace!("no receivers for dashboard event"),
        }

        result
    }

    async fn switch_node(&self, name: &str) -> SwitchOutcome {
        self.control.switch_exit_node(name).await?;
        info!("exit node switched to {name}, refreshing");
        Ok(self.refresh().await)
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(Duration::from_secs(1))
}

fn new_ticker(start: Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn ticker_after(period: Duration) -> Interval {
    new_ticker(Instant::now() + period, period)
}

/// Cloneable handle for controlling a DashboardActor
#[derive(Clone)]
pub struct DashboardHandle {
    sender: mpsc::Sender<DashboardCommand>,
}

impl DashboardHandle {
    /// Spawns the actor; the first refresh runs immediately.
    pub fn spawn(
        aggregator: Arc<Aggregator>,
        control: NodeControl,
        event_tx: broadcast::Sender<DashboardEvent>,
        interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = DashboardActor::new(aggregator, control, cmd_rx, event_tx, interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn refresh_now(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DashboardCommand::RefreshNow { respond_to: tx })
            .await
            .context("failed to send RefreshNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }

    /// Switches the exit node and returns the refreshed snapshot.
    pub async fn switch_node(&self, name: impl Into<String>) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DashboardCommand::SwitchNode {
                name: name.into(),
                respond_to: tx,
            })
            .await
            .context("failed to send SwitchNode command")?;

        Ok(rx.await.context("failed to receive response")???)
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(DashboardCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(DashboardCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
