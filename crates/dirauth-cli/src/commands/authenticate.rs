//! authenticate command - check a password and show the resulting identity

use super::CommandContext;
use crate::utils::{format_datetime, join_or_none, read_secret};
use anyhow::{anyhow, Result};
use colored::Colorize;
use dirauth_auth::UserIdentity;

pub async fn execute(
    ctx: &CommandContext,
    identifier: &str,
    password: Option<String>,
    detailed: bool,
) -> Result<()> {
    let store = ctx.load_settings()?;
    let manager = ctx.user_manager(&store);

    let password = match password {
        Some(password) => password,
        None => read_secret(std::io::stdin().lock())?,
    };

    let identity = if detailed {
        manager
            .authenticate_detailed(identifier, &password)
            .await
            .map_err(|e| anyhow!("Authentication failed: {} [{}]", e, e.code()))?
    } else {
        manager.authenticate(identifier, &password).await?
    };

    print_identity(ctx, &identity)
}

pub fn print_identity(ctx: &CommandContext, identity: &UserIdentity) -> Result<()> {
    if ctx.is_json() {
        println!("{}", serde_json::to_string_pretty(identity)?);
        return Ok(());
    }

    println!("{}", identity.dn.blue().bold());
    println!();
    println!("  {}: {}", "Identifier".cyan(), identity.identifier);
    println!("  {}: {}", "User ID".cyan(), identity.user_id);
    println!("  {}: {}", "Groups".cyan(), join_or_none(&identity.groups));
    println!("  {}: {}", "Roles".cyan(), join_or_none(&identity.roles));
    println!(
        "  {}: {}",
        "Authenticated".cyan(),
        format_datetime(&identity.authenticated_at)
    );

    Ok(())
}
