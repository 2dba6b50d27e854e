use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_FETCH_URL: &str = "/mindbox-tracker.js";
pub const DEFAULT_SERVICE_WORKER_PATH: &str = "/mindbox-services-worker.js";
pub const DEFAULT_HISTORY_KEY_PREFIX: &str = "__embeddedConsoleHistory:";

/// Page-supplied console settings (`window.__SANDBOX_CONFIG`).
///
/// Unknown keys are ignored so the console can share the page's config object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleConfig {
    pub default_fetch_url: String,
    pub service_worker_path: String,
    pub history_key_prefix: String,
    /// Global path of the tracker queue printed by `mindbox.queue`.
    pub queue_path: Vec<String>,
    pub auto_focus_input: Option<bool>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_fetch_url: DEFAULT_FETCH_URL.to_string(),
            service_worker_path: DEFAULT_SERVICE_WORKER_PATH.to_string(),
            history_key_prefix: DEFAULT_HISTORY_KEY_PREFIX.to_string(),
            queue_path: vec!["mindbox".to_string(), "queue".to_string()],
            auto_focus_input: None,
        }
    }
}

impl ConsoleConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.default_fetch_url.trim().is_empty() {
            self.default_fetch_url = defaults.default_fetch_url;
        }
        if self.service_worker_path.trim().is_empty() {
            self.service_worker_path = defaults.service_worker_path;
        }
        if self.history_key_prefix.trim().is_empty() {
            self.history_key_prefix = defaults.history_key_prefix;
        }
        self.queue_path.retain(|segment| !segment.is_empty());
        if self.queue_path.is_empty() {
            self.queue_path = defaults.queue_path;
        }
        self
    }

    /// History is kept per page path.
    pub fn history_key(&self, pathname: &str) -> String {
        let pathname = if pathname.is_empty() { "/" } else { pathname };
        format!("{}{pathname}", self.history_key_prefix)
    }

    /// Focus the input on mount unless the device looks touch-first; an
    /// explicit `autoFocusInput` always wins.
    pub fn should_autofocus(&self, coarse_pointer: bool, hover_none: bool) -> bool {
        self.auto_focus_input
            .unwrap_or(!(coarse_pointer || hover_none))
    }
}
