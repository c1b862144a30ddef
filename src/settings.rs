//! User settings: domain lists, personal dictionary and ignored rules.
//!
//! Settings are read as a snapshot at the start of each operation, so a
//! change takes effect on the next check cycle.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SettingsError;

const APP_NAME: &str = "textcheck";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredRule {
    pub id: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub disabled_domains: Vec<String>,
    #[serde(default)]
    pub auto_check_on_domains: Vec<String>,
    #[serde(default)]
    pub ignore_check_on_domains: Vec<String>,
    #[serde(default)]
    pub dictionary: Vec<String>,
    #[serde(default)]
    pub ignored_rules: Vec<IgnoredRule>,
    #[serde(default = "default_true")]
    pub ignore_quoted_lines: bool,
    #[serde(default)]
    pub auto_check: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            disabled_domains: Vec::new(),
            auto_check_on_domains: Vec::new(),
            ignore_check_on_domains: Vec::new(),
            dictionary: Vec::new(),
            ignored_rules: Vec::new(),
            ignore_quoted_lines: true,
            auto_check: false,
        }
    }
}

/// Partial update; `None` leaves a key untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub disabled_domains: Option<Vec<String>>,
    pub auto_check_on_domains: Option<Vec<String>>,
    pub ignore_check_on_domains: Option<Vec<String>>,
    pub dictionary: Option<Vec<String>>,
    pub ignored_rules: Option<Vec<IgnoredRule>>,
    pub ignore_quoted_lines: Option<bool>,
    pub auto_check: Option<bool>,
}

impl UserSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.disabled_domains {
            self.disabled_domains = v;
        }
        if let Some(v) = patch.auto_check_on_domains {
            self.auto_check_on_domains = v;
        }
        if let Some(v) = patch.ignore_check_on_domains {
            self.ignore_check_on_domains = v;
        }
        if let Some(v) = patch.dictionary {
            self.dictionary = v;
        }
        if let Some(v) = patch.ignored_rules {
            self.ignored_rules = v;
        }
        if let Some(v) = patch.ignore_quoted_lines {
            self.ignore_quoted_lines = v;
        }
        if let Some(v) = patch.auto_check {
            self.auto_check = v;
        }
    }

    pub fn domain_policy(&self, page_url: &str) -> DomainPolicy {
        let host = hostname(page_url).unwrap_or_default();
        DomainPolicy {
            disabled: listed(&self.disabled_domains, &host),
            auto_check: listed(&self.auto_check_on_domains, &host)
                || self.global_auto_check(page_url),
        }
    }

    /// Auto-check as the global switch decides it, without the per-host opt-in.
    pub fn global_auto_check(&self, page_url: &str) -> bool {
        let host = hostname(page_url).unwrap_or_default();
        self.auto_check && !listed(&self.ignore_check_on_domains, &host)
    }
}

fn listed(list: &[String], host: &str) -> bool {
    list.iter().any(|d| d == host)
}

/// What the user allows on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainPolicy {
    pub disabled: bool,
    pub auto_check: bool,
}

pub fn hostname(page_url: &str) -> Option<String> {
    Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

pub trait SettingsStore: Send + Sync {
    fn get(&self) -> Result<UserSettings, SettingsError>;
    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError>;
}

/// Settings persisted in the user's config directory.
#[derive(Debug, Default)]
pub struct ConfyStore;

impl SettingsStore for ConfyStore {
    fn get(&self) -> Result<UserSettings, SettingsError> {
        Ok(confy::load(APP_NAME, "settings")?)
    }

    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError> {
        let mut settings: UserSettings = confy::load(APP_NAME, "settings")?;
        settings.apply(patch);
        confy::store(APP_NAME, "settings", settings)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<UserSettings>,
}

impl MemoryStore {
    pub fn new(settings: UserSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self) -> Result<UserSettings, SettingsError> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| SettingsError::Poisoned)
    }

    fn set(&self, patch: SettingsPatch) -> Result<(), SettingsError> {
        self.settings
            .lock()
            .map(|mut s| s.apply(patch))
            .map_err(|_| SettingsError::Poisoned)
    }
}
