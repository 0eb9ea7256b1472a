//! Dirauth Core Library
//!
//! Errors, settings storage, schema migration and typed configuration for
//! directory-backed authentication.

pub mod config;
pub mod error;
pub mod migration;
pub mod settings;

pub use config::{DirectoryConfig, SearchTermTransform, TlsCertPolicy};
pub use error::{AuthenticationFailed, Error, Result};
pub use migration::{MigrationReport, MigrationStep, SettingsMigrator};
pub use settings::{
    FileSettingsStore, MemorySettingsStore, SettingKey, SettingsStore, SETTINGS_VERSION,
};

/// Dirauth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
