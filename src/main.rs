use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tasaverde::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for tasaverde::AppCommand {
    fn from(cmd: Commands) -> tasaverde::AppCommand {
        match cmd {
            Commands::Signup { email } => tasaverde::AppCommand::SignUp { email },
            Commands::Login { email } => tasaverde::AppCommand::Login { email },
            Commands::LoginOauth { provider } => tasaverde::AppCommand::LoginOAuth { provider },
            Commands::Logout => tasaverde::AppCommand::Logout,
            Commands::ResetPassword { email } => tasaverde::AppCommand::ResetPassword { email },
            Commands::Rates { refresh, watch } => tasaverde::AppCommand::Rates { refresh, watch },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Create an account with email and password
    Signup {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Sign in through a third-party provider in the browser
    LoginOauth {
        /// Provider name, defaults to the configured one
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Send a password reset email
    ResetPassword {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Show the current exchange rates
    Rates {
        /// Bypass the cache and fetch fresh rates
        #[arg(short, long)]
        refresh: bool,
        /// Keep polling until interrupted
        #[arg(short, long, conflicts_with = "refresh")]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => tasaverde::cli::setup::setup(),
        Some(cmd) => tasaverde::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
