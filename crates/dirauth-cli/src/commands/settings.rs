//! settings commands - show, defaults, set and unset

use super::CommandContext;
use crate::utils::display_value;
use anyhow::{bail, Result};
use colored::Colorize;
use dirauth_core::settings::{self, write_setting, SettingsAccess};
use dirauth_core::{DirectoryConfig, SettingsStore};
use serde_json::{Map, Value};

pub fn show(ctx: &CommandContext) -> Result<()> {
    let store = ctx.load_settings()?;

    let mut values = Map::new();
    for name in settings::defaults().keys() {
        let value = store.effective(name)?.unwrap_or(Value::Null);
        values.insert(name.to_string(), display_value(name, &value));
    }

    print_values(ctx, store.version()?, values)
}

pub fn defaults(ctx: &CommandContext) -> Result<()> {
    let values = settings::defaults()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    print_values(ctx, Some(settings::SETTINGS_VERSION), values)
}

/// Write a plugin setting as an administrator and save the file.
pub fn set(ctx: &CommandContext, name: &str, value: Option<Value>) -> Result<()> {
    if !settings::defaults().contains_key(name) {
        bail!("Unknown setting: {}", name);
    }

    let mut store = ctx.load_settings()?;
    write_setting(&mut store, SettingsAccess::Admin, name, value)?;
    store.save()?;

    if let Err(e) = DirectoryConfig::from_settings(&store) {
        ctx.error(&format!("{} {}", "warning:".yellow().bold(), e));
    }

    Ok(())
}

fn print_values(ctx: &CommandContext, version: Option<u32>, values: Map<String, Value>) -> Result<()> {
    if ctx.is_json() {
        let document = serde_json::json!({
            "version": version,
            "plugin": values,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    match version {
        Some(version) => println!("{}: {}", "Version".cyan(), version),
        None => println!("{}: unversioned", "Version".cyan()),
    }
    for (name, value) in &values {
        let shown = match value {
            Value::Null => "(unset)".dimmed().to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {}: {}", name, shown);
    }

    Ok(())
}
