//! Fans one webhook event out to every loaded plugin.
//!
//! Each robot runs in its own tokio task on a `JoinSet`, and the dispatcher
//! waits for every task to settle before returning. Handler errors and
//! panics are logged and counted, never propagated: `dispatch` cannot fail.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span};

use crate::robot::{HandlerOutcome, Robot};
use crate::webhooks::WebhookEvent;

/// What happened while dispatching one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugins the event was offered to.
    pub plugins: usize,
    /// Handler invocations that ran.
    pub handlers: usize,
    /// Invocations that returned an error or panicked.
    pub failed: usize,
    /// Plugins with at least one failed invocation, in completion order.
    pub failed_plugins: Vec<String>,
}

impl DispatchReport {
    /// Invocations that completed. A plugin task that died outside its
    /// handlers counts as a failure without a matching invocation.
    pub fn succeeded(&self) -> usize {
        self.handlers.saturating_sub(self.failed)
    }

    fn record(&mut self, event: &WebhookEvent, plugin: &str, outcomes: Vec<HandlerOutcome>) {
        let mut plugin_failed = false;
        for outcome in outcomes {
            self.handlers += 1;
            if let Err(failure) = outcome.result {
                self.failed += 1;
                plugin_failed = true;
                error!(
                    delivery = %event.id(),
                    event = %event.qualified_name(),
                    plugin = %outcome.plugin,
                    filter = %outcome.filter,
                    error = %failure,
                    "Plugin handler failed"
                );
            }
        }
        if plugin_failed {
            self.failed_plugins.push(plugin.to_string());
        }
    }
}

/// The set of loaded robots. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    robots: Arc<Vec<Arc<Robot>>>,
}

impl Dispatcher {
    pub fn new(robots: Vec<Arc<Robot>>) -> Self {
        Self {
            robots: Arc::new(robots),
        }
    }

    pub fn robots(&self) -> &[Arc<Robot>] {
        &self.robots
    }

    /// Offers `event` to every robot concurrently and waits for all of them.
    pub async fn dispatch(&self, event: WebhookEvent) -> DispatchReport {
        let span = info_span!(
            "dispatch",
            delivery = %event.id(),
            event = %event.qualified_name(),
        );

        async {
            debug!(plugins = self.robots.len(), "Dispatching event");

            let mut tasks = JoinSet::new();
            for robot in self.robots.iter() {
                let robot = Arc::clone(robot);
                let event = event.clone();
                tasks.spawn(
                    async move {
                        let outcomes = robot.receive(&event).await;
                        (robot.name().to_string(), outcomes)
                    }
                    .in_current_span(),
                );
            }

            let mut report = DispatchReport {
                plugins: self.robots.len(),
                ..DispatchReport::default()
            };
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((plugin, outcomes)) => report.record(&event, &plugin, outcomes),
                    Err(e) => {
                        // Handlers are unwind-guarded inside the task, so this is
                        // a panic in the robot itself or runtime shutdown.
                        report.failed += 1;
                        error!(
                            delivery = %event.id(),
                            event = %event.qualified_name(),
                            error = %e,
                            "Plugin task failed"
                        );
                    }
                }
            }

            info!(
                handlers = report.handlers,
                failed = report.failed,
                "Event dispatched"
            );
            report
        }
        .instrument(span)
        .await
    }
}
