//! CLI command implementations

pub mod authenticate;
pub mod directory;
pub mod lookup;
pub mod migrate;
pub mod settings;

use crate::OutputFormat;
use anyhow::{Context, Result};
use dirauth_auth::{LdapDirectory, UserManager};
use dirauth_core::{FileSettingsStore, SettingsMigrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Context passed to all commands
pub struct CommandContext {
    pub settings_path: PathBuf,
    pub output_format: OutputFormat,
}

impl CommandContext {
    /// Check if output should be JSON
    pub fn is_json(&self) -> bool {
        matches!(self.output_format, OutputFormat::Json)
    }

    /// Open the settings file and bring it to the current version.
    pub fn load_settings(&self) -> Result<FileSettingsStore> {
        let mut store = FileSettingsStore::open(&self.settings_path)
            .with_context(|| format!("Failed to open {}", self.settings_path.display()))?;

        let report = SettingsMigrator::new()
            .run(&mut store)
            .context("Settings migration failed")?;
        if !report.is_noop() {
            info!(
                "Settings migrated to version {} ({} values carried over)",
                report.to,
                report.migrated.len()
            );
        }

        Ok(store)
    }

    /// User manager over the real directory, configured from `store`.
    pub fn user_manager(&self, store: &FileSettingsStore) -> UserManager {
        UserManager::from_settings(Arc::new(LdapDirectory::new()), store)
    }

    /// Print error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg);
    }
}
