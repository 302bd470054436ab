//! Interval loop that drives SLA timer processing from the server
//! binary. Each tick is one `process_sla_timers` pass across tenants.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::service::RoutingEngine;

pub struct Sweeper {
    engine: Arc<RoutingEngine>,
    period: Duration,
}

impl Sweeper {
    pub fn new(engine: Arc<RoutingEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Runs until the shutdown channel fires. A failed pass is logged
    /// and retried on the next tick; due timers stay pending until a
    /// pass succeeds.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            event_name = "sweeper.started",
            period_secs = self.period.as_secs(),
            "SLA sweeper running",
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.engine.process_sla_timers(None).await {
                        Ok(report) if report.processed > 0 => {
                            info!(
                                event_name = "sweeper.pass",
                                processed = report.processed,
                                "sweep pass complete",
                            );
                        }
                        Ok(_) => {}
                        Err(sweep_error) => {
                            error!(
                                event_name = "sweeper.pass_failed",
                                error = %sweep_error,
                                "sweep pass failed; retrying next tick",
                            );
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!(event_name = "sweeper.stopped", "SLA sweeper shutting down");
                    break;
                }
            }
        }
    }
}
