//! test-connection and status commands

use super::CommandContext;
use crate::utils::join_or_none;
use anyhow::Result;
use colored::Colorize;

pub async fn test_connection(ctx: &CommandContext) -> Result<()> {
    let store = ctx.load_settings()?;
    let manager = ctx.user_manager(&store);
    let info = manager.test_connection().await?;

    if ctx.is_json() {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", "Connection OK".green().bold());
    println!();
    println!(
        "  {}: {}",
        "Vendor".cyan(),
        info.vendor.as_deref().unwrap_or("unknown")
    );
    println!(
        "  {}: {}",
        "Version".cyan(),
        info.version.as_deref().unwrap_or("unknown")
    );
    println!(
        "  {}: {}",
        "Naming contexts".cyan(),
        join_or_none(&info.naming_contexts)
    );
    println!(
        "  {}: {}",
        "LDAP versions".cyan(),
        join_or_none(&info.supported_ldap_version)
    );

    Ok(())
}

pub async fn status(ctx: &CommandContext) -> Result<()> {
    let store = ctx.load_settings()?;
    let status = ctx.user_manager(&store).status().await;

    if ctx.is_json() {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.configured {
        println!("{}", "Configured".green().bold());
    } else {
        println!("{}", "Not configured".red().bold());
    }
    println!();
    println!(
        "  {}: {}",
        "URI".cyan(),
        status.uri.as_deref().unwrap_or("(none)")
    );
    println!("  {}: {}", "Local cache".cyan(), status.local_cache);
    if let Some(error) = &status.error {
        println!("  {}: {}", "Error".cyan(), error);
    }

    Ok(())
}
