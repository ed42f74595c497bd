//! Shared application state and configuration lifecycle.
//!
//! No ambient singletons: the caller constructs an `AppState` with its
//! gateways and owns it. Configuration lives at `~/.campaignos/config.json`
//! and is held in memory behind a mutex, reloadable from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::assistant::AssistantGateway;
use crate::docstore::DocumentStore;
use crate::sync::SyncController;
use crate::types::{ChatMessage, ChatRole, Config};

/// Maximum chat messages retained per session (user + assistant turns).
const MAX_CHAT_HISTORY: usize = 100;

pub struct AppState {
    pub config: Mutex<Option<Config>>,
    /// Document-store handle shared with the controller: commands read
    /// client/goal documents directly, the controller owns event writes.
    pub gateway: Arc<dyn DocumentStore>,
    pub controller: SyncController,
    pub assistant: Arc<dyn AssistantGateway>,
    /// Display name of the active client, once known.
    pub active_client_name: Mutex<Option<String>>,
    pub chat_history: Mutex<Vec<ChatMessage>>,
}

impl AppState {
    /// Construct with configuration loaded from disk (missing config is
    /// fine — commands that need it will say so).
    pub fn new(gateway: Arc<dyn DocumentStore>, assistant: Arc<dyn AssistantGateway>) -> AppState {
        AppState::with_config(gateway, assistant, load_config().ok())
    }

    pub fn with_config(
        gateway: Arc<dyn DocumentStore>,
        assistant: Arc<dyn AssistantGateway>,
        config: Option<Config>,
    ) -> AppState {
        let settle_ms = config
            .as_ref()
            .map(|c| c.bulk_settle_delay_ms)
            .unwrap_or(crate::types::DEFAULT_BULK_SETTLE_DELAY_MS);

        AppState {
            config: Mutex::new(config),
            gateway: Arc::clone(&gateway),
            controller: SyncController::new(gateway, Duration::from_millis(settle_ms)),
            assistant,
            active_client_name: Mutex::new(None),
            chat_history: Mutex::new(Vec::new()),
        }
    }

    /// Current configuration (defaults when none is loaded).
    pub fn config_snapshot(&self) -> Config {
        self.config
            .lock()
            .map(|guard| guard.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn chat_history_snapshot(&self) -> Vec<ChatMessage> {
        self.chat_history
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Record one user/assistant exchange, trimming to the retention cap.
    pub fn append_chat_exchange(&self, user: &str, assistant: &str) {
        if let Ok(mut guard) = self.chat_history.lock() {
            let now = chrono::Utc::now();
            guard.push(ChatMessage {
                role: ChatRole::User,
                content: user.to_string(),
                timestamp: now,
            });
            guard.push(ChatMessage {
                role: ChatRole::Assistant,
                content: assistant.to_string(),
                timestamp: now,
            });
            if guard.len() > MAX_CHAT_HISTORY {
                let excess = guard.len() - MAX_CHAT_HISTORY;
                guard.drain(..excess);
            }
        }
    }

    pub fn clear_chat_history(&self) {
        if let Ok(mut guard) = self.chat_history.lock() {
            guard.clear();
        }
    }
}

/// Canonical config file path (`~/.campaignos/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".campaignos").join("config.json"))
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Run `campaignos init` first.",
            path.display()
        ));
    }
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Load configuration from `~/.campaignos/config.json`.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

/// Create or update config.json atomically with respect to in-memory state.
///
/// If config already exists in-memory, clones it, applies the mutator, and
/// writes back. If config is None (first run), starts from defaults.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut guard = state.config.lock().map_err(|_| "Lock poisoned")?;

    let mut config = guard.clone().unwrap_or_default();
    mutator(&mut config);

    save_config_to(&config_path()?, &config)?;
    *guard = Some(config.clone());
    Ok(config)
}

/// Reload configuration from disk into memory.
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config()?;
    let mut guard = state.config.lock().map_err(|_| "Lock poisoned")?;
    *guard = Some(config.clone());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::DisabledAssistant;
    use crate::docstore::MemoryStore;

    fn make_state() -> AppState {
        AppState::with_config(
            Arc::new(MemoryStore::new()),
            Arc::new(DisabledAssistant),
            Some(Config::default()),
        )
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.store.base_url = "https://store.example.com".to_string();
        config.active_client = Some("acme".to_string());
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.store.base_url, "https://store.example.com");
        assert_eq!(loaded.active_client.as_deref(), Some("acme"));
    }

    #[test]
    fn test_load_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from(&dir.path().join("config.json")).is_err());
    }

    #[tokio::test]
    async fn test_chat_history_capped() {
        let state = make_state();
        for i in 0..60 {
            state.append_chat_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        let history = state.chat_history_snapshot();
        assert_eq!(history.len(), 100);
        // Oldest exchanges were trimmed.
        assert_eq!(history[0].content, "q10");
    }
}
