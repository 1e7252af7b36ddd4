//! Plugins compiled into the binary.

use tracing::info;

use super::PluginFn;

pub const EVENT_LOGGER: &str = "event-logger";

/// Logs every delivery at `info` with its repository, if any.
pub fn event_logger() -> PluginFn {
    PluginFn::new(EVENT_LOGGER, |robot| {
        robot.on("*", |context| async move {
            let repo = context.repo().map(|r| r.to_string()).ok();
            info!(
                parent: context.log(),
                event = %context.event().qualified_name(),
                repo = repo.as_deref().unwrap_or("-"),
                "Received event"
            );
            Ok(())
        })?;
        Ok(())
    })
}
