pub mod auth;
pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::auth::AuthController;
use crate::core::RateCache;
use crate::core::config::AppConfig;
use crate::providers::rates_api::RatesApiProvider;
use crate::providers::supabase::SupabaseAuthProvider;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    SignUp { email: Option<String> },
    Login { email: Option<String> },
    LoginOAuth { provider: Option<String> },
    Logout,
    ResetPassword { email: Option<String> },
    Rates { refresh: bool, watch: bool },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("TasaVerde starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = store::open_session_store(&config)?;
    let anon_key = config.identity.resolve_anon_key()?;
    let identity = SupabaseAuthProvider::new(&config.identity.base_url, &anon_key)?;
    let controller = AuthController::new(
        Arc::new(identity),
        store,
        &config.identity.redirect_url,
    );

    execute(command, &config, &controller).await
}

/// Only `rates` reads the stored session up front, so an unreadable one can
/// still be replaced by signing in or removed by signing out.
async fn execute(
    command: AppCommand,
    config: &AppConfig,
    controller: &AuthController,
) -> Result<()> {
    match command {
        AppCommand::SignUp { email } => cli::auth::sign_up(controller, email).await,
        AppCommand::Login { email } => cli::auth::login(controller, email).await,
        AppCommand::LoginOAuth { provider } => {
            let provider = provider.unwrap_or_else(|| config.identity.oauth_provider.clone());
            cli::auth::login_oauth(controller, &provider).await
        }
        AppCommand::Logout => cli::auth::logout(controller).await,
        AppCommand::ResetPassword { email } => cli::auth::reset_password(controller, email).await,
        AppCommand::Rates { refresh, watch } => {
            let session = controller
                .current_session()
                .await
                .context("Could not read the stored session, sign in again")?;
            if session.is_none() {
                bail!("Not signed in. Run `tasaverde login` first.");
            }

            let fetcher = RatesApiProvider::new(&config.rates.base_url)?;
            let cache = RateCache::new(Arc::new(fetcher), config.rates.cache_config());
            let market = &config.rates.market;

            if watch {
                let every = cache.config().stale_time;
                cli::rates::watch(&cache, market, every).await
            } else {
                cli::rates::run(&cache, market, refresh).await
            }
        }
    }
}
