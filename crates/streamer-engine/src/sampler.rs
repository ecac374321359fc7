//! Periodic metrics sampling.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use streamer_ipc::StreamEvent;
use streamer_transport::TransportAdapter;

use crate::events::EventBus;

/// Samples the active adapter once per interval and publishes the result
/// as a metrics update.
///
/// Holds the adapter weakly: a tick that finds it gone ends the task, a
/// tick that finds it inactive publishes nothing.
pub struct MetricsSampler {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MetricsSampler {
    pub fn start(
        adapter: Weak<dyn TransportAdapter>,
        bus: Arc<EventBus>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(adapter) = adapter.upgrade() else {
                            debug!("Adapter released, sampler exiting");
                            break;
                        };
                        if !adapter.is_active() {
                            trace!("Adapter inactive, tick skipped");
                            continue;
                        }
                        bus.publish(StreamEvent::MetricsUpdate(adapter.sample_metrics()));
                    }
                }
            }
        });

        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Stop ticking and wait for the task to finish. No metrics update is
    /// published once this returns.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Metrics sampler ended abnormally: {}", e);
        }
    }
}
