//! migrate command - bring a settings file to the current version

use super::CommandContext;
use anyhow::{Context, Result};
use colored::Colorize;
use dirauth_core::{FileSettingsStore, MemorySettingsStore, MigrationReport, SettingsMigrator};
use serde::Serialize;

#[derive(Serialize)]
struct MigrationResult {
    path: String,
    dry_run: bool,
    from: Option<u32>,
    to: u32,
    steps: Vec<String>,
    migrated: Vec<(String, String)>,
    cleared: Vec<String>,
}

impl MigrationResult {
    fn new(path: String, dry_run: bool, report: &MigrationReport) -> Self {
        Self {
            path,
            dry_run,
            from: report.from,
            to: report.to,
            steps: report
                .steps
                .iter()
                .map(|(from, to)| format!("{} -> {}", from, to))
                .collect(),
            migrated: report
                .migrated
                .iter()
                .map(|(legacy, current)| (legacy.to_string(), current.to_string()))
                .collect(),
            cleared: report.cleared.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub fn execute(ctx: &CommandContext, dry_run: bool) -> Result<()> {
    let mut store = FileSettingsStore::open(&ctx.settings_path)
        .with_context(|| format!("Failed to open {}", ctx.settings_path.display()))?;
    let migrator = SettingsMigrator::new();

    let report = if dry_run {
        let mut preview = MemorySettingsStore::from_document(store.document().clone());
        migrator.run(&mut preview)?
    } else {
        migrator.run(&mut store).context("Settings migration failed")?
    };

    let result = MigrationResult::new(ctx.settings_path.display().to_string(), dry_run, &report);

    if ctx.is_json() {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if report.is_noop() {
        println!("{} is already at version {}", result.path, result.to);
        return Ok(());
    }

    let heading = if dry_run { "Would migrate" } else { "Migrated" };
    println!(
        "{} {} to version {}",
        heading.green().bold(),
        result.path,
        result.to
    );
    for step in &result.steps {
        println!("  {}: {}", "Step".cyan(), step);
    }
    for (legacy, current) in &result.migrated {
        println!("  {} -> {}", legacy, current);
    }
    for key in &result.cleared {
        println!("  {} {}", "cleared".yellow(), key);
    }

    Ok(())
}
