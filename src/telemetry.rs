use std::sync::Mutex;

/// Fire-and-forget event sink. Implementations must never fail the caller.
pub trait Telemetry: Send + Sync {
    fn track(&self, context: &str, event: &str);
}

/// Writes events to the `telemetry` tracing target.
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track(&self, context: &str, event: &str) {
        tracing::info!(target: "telemetry", context, event);
    }
}

/// Keeps events in memory, for hosts that batch them and for tests.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<(String, String)>>,
}

impl MemoryTelemetry {
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Telemetry for MemoryTelemetry {
    fn track(&self, context: &str, event: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((context.to_string(), event.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let telemetry = MemoryTelemetry::default();
        telemetry.track("https://example.com/", "first");
        telemetry.track("internal", "second");
        TracingTelemetry.track("internal", "not recorded");
        assert_eq!(
            telemetry.events(),
            vec![
                ("https://example.com/".to_string(), "first".to_string()),
                ("internal".to_string(), "second".to_string()),
            ]
        );
    }
}
