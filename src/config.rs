use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_NAME: &str = "textcheck";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Language code sent with every check, `auto` to let the server detect it.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    /// Pause between a simulated selection and the text mutation that follows it.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Pause after a focus change before the new element is inspected.
    #[serde(default)]
    pub focus_settle_ms: u64,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Shortest flat text, in UTF-16 units, the background check dispatches.
    #[serde(default = "default_min_check_len")]
    pub min_check_len: usize,
}

fn default_server_url() -> String {
    "https://api.languagetool.org".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_debounce() -> u64 {
    1500
}

fn default_settle() -> u64 {
    25
}

fn default_timeout() -> u64 {
    30
}

fn default_min_check_len() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            language: default_language(),
            debounce_ms: default_debounce(),
            settle_ms: default_settle(),
            focus_settle_ms: 0,
            request_timeout_secs: default_timeout(),
            min_check_len: default_min_check_len(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        match confy::load(APP_NAME, "config") {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn focus_settle_delay(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
