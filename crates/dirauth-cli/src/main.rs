//! dirauth - LDAP authentication and role mapping
//!
//! Every command that reads settings first migrates them to the current
//! version. A failed migration stops the command.

mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use commands::CommandContext;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dirauth")]
#[command(author = "Dirauth Team")]
#[command(version = dirauth_core::VERSION)]
#[command(about = "LDAP authentication and role mapping", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path (.json or .toml)
    #[arg(
        short,
        long,
        global = true,
        env = "DIRAUTH_SETTINGS",
        default_value = "dirauth.toml"
    )]
    settings: PathBuf,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DIRAUTH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DIRAUTH_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate settings to the current version
    Migrate {
        /// Show what would change without writing the file
        #[arg(long)]
        dry_run: bool,
    },

    /// Authenticate a user against the directory
    Authenticate {
        /// Login identifier
        identifier: String,

        /// Password, read from stdin when not given
        #[arg(long, env = "DIRAUTH_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Report why authentication failed
        #[arg(long)]
        detailed: bool,
    },

    /// Look a user up without authenticating
    Lookup {
        /// Login identifier
        identifier: String,
    },

    /// Bind the service account and read the server's root DSE
    TestConnection,

    /// Show whether the directory is configured
    Status,

    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show effective settings
    Show,

    /// Show default values
    Defaults,

    /// Set a setting; the value is parsed as JSON, else taken as a string
    Set { name: String, value: String },

    /// Clear a setting back to its default
    Unset { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_json);

    let ctx = CommandContext {
        settings_path: cli.settings,
        output_format: cli.output,
    };

    match cli.command {
        Commands::Migrate { dry_run } => commands::migrate::execute(&ctx, dry_run),
        Commands::Authenticate {
            identifier,
            password,
            detailed,
        } => commands::authenticate::execute(&ctx, &identifier, password, detailed).await,
        Commands::Lookup { identifier } => commands::lookup::execute(&ctx, &identifier).await,
        Commands::TestConnection => commands::directory::test_connection(&ctx).await,
        Commands::Status => commands::directory::status(&ctx).await,
        Commands::Settings(SettingsCommand::Show) => commands::settings::show(&ctx),
        Commands::Settings(SettingsCommand::Defaults) => commands::settings::defaults(&ctx),
        Commands::Settings(SettingsCommand::Set { name, value }) => {
            commands::settings::set(&ctx, &name, Some(utils::parse_setting_value(&value)))
        }
        Commands::Settings(SettingsCommand::Unset { name }) => {
            commands::settings::set(&ctx, &name, None)
        }
        Commands::Version => {
            println!("dirauth {}", dirauth_core::VERSION);
            println!(
                "settings version {}",
                dirauth_core::settings::SETTINGS_VERSION
            );
            Ok(())
        }
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (text_layer, json_layer) = if json {
        (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(filter)
        .init();
}
