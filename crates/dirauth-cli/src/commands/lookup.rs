//! lookup command - resolve a user and their roles without a password

use super::CommandContext;
use anyhow::{bail, Result};

pub async fn execute(ctx: &CommandContext, identifier: &str) -> Result<()> {
    let store = ctx.load_settings()?;
    let manager = ctx.user_manager(&store);

    match manager.find_user(identifier).await? {
        Some(identity) => super::authenticate::print_identity(ctx, &identity),
        None => bail!("User not found: {}", identifier),
    }
}
