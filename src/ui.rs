use std::sync::Mutex;

use crate::session::CheckResult;

/// Where check results and user-facing messages end up.
pub trait UiSurface: Send + Sync {
    fn on_result(&self, result: &CheckResult);
    fn alert(&self, message: &str);
}

/// Logs results instead of rendering them.
#[derive(Debug, Default)]
pub struct LogUi;

impl UiSurface for LogUi {
    fn on_result(&self, result: &CheckResult) {
        tracing::debug!(
            surface = %result.surface,
            total = ?result.total_errors(),
            state = ?result.state,
            "check result"
        );
    }

    fn alert(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Remembers everything it was shown.
#[derive(Debug, Default)]
pub struct RecordingUi {
    results: Mutex<Vec<CheckResult>>,
    alerts: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn results(&self) -> Vec<CheckResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<CheckResult> {
        self.results.lock().ok().and_then(|r| r.last().cloned())
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl UiSurface for RecordingUi {
    fn on_result(&self, result: &CheckResult) {
        if let Ok(mut results) = self.results.lock() {
            results.push(result.clone());
        }
    }

    fn alert(&self, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message.to_string());
        }
    }
}
