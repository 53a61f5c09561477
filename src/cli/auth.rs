use super::ui;
use crate::auth::{AuthController, OAuthOutcome};
use crate::core::identity::{BrowserOutcome, BrowserSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use console::Term;
use tracing::debug;

fn prompt(label: &str) -> Result<String> {
    let term = Term::stdout();
    term.write_str(label)?;
    term.read_line().context("Failed to read from terminal")
}

fn prompt_secret(label: &str) -> Result<String> {
    let term = Term::stdout();
    term.write_str(label)?;
    term.read_secure_line().context("Failed to read from terminal")
}

fn email_or_prompt(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => prompt("Email: "),
    }
}

/// Browser surface for terminals: the user opens the URL themselves and
/// pastes the address the browser ends up on. An empty line dismisses.
pub struct ConsoleBrowser;

#[async_trait]
impl BrowserSession for ConsoleBrowser {
    async fn open(&self, url: &str, callback_url: &str) -> BrowserOutcome {
        println!("Open this URL in your browser to continue:\n\n  {url}\n");
        let hint =
            format!("After signing in, paste the {callback_url} address here (empty to cancel).");
        println!("{}", ui::style_text(&hint, ui::StyleType::Subtle));

        let pasted = tokio::task::spawn_blocking(|| prompt("Callback URL: ")).await;
        match pasted {
            Ok(Ok(line)) if !line.trim().is_empty() => {
                BrowserOutcome::Redirected(line.trim().to_string())
            }
            Ok(Ok(_)) => BrowserOutcome::Dismissed,
            Ok(Err(e)) => {
                debug!(error = %e, "Reading callback failed, treating as dismissed");
                BrowserOutcome::Dismissed
            }
            Err(e) => {
                debug!(error = %e, "Callback prompt task failed");
                BrowserOutcome::Dismissed
            }
        }
    }
}

pub async fn sign_up(controller: &AuthController, email: Option<String>) -> Result<()> {
    let email = email_or_prompt(email)?;
    let password = prompt_secret("Password (min 6 characters): ")?;

    let account = controller.sign_up(&email, &password).await?;
    println!(
        "Account created for {}. Check your email to confirm it.",
        ui::style_text(&account.email, ui::StyleType::Highlight)
    );
    Ok(())
}

pub async fn login(controller: &AuthController, email: Option<String>) -> Result<()> {
    let email = email_or_prompt(email)?;
    let password = prompt_secret("Password: ")?;

    let pb = ui::new_spinner("Signing in...");
    let result = controller.sign_in(&email, &password).await;
    pb.finish_and_clear();

    let session = result?;
    println!(
        "Signed in as {}",
        ui::style_text(&session.user_id, ui::StyleType::Highlight)
    );
    Ok(())
}

pub async fn login_oauth(controller: &AuthController, provider: &str) -> Result<()> {
    match controller.sign_in_with_oauth(provider, &ConsoleBrowser).await? {
        OAuthOutcome::SignedIn(session) => println!(
            "Signed in as {}",
            ui::style_text(&session.user_id, ui::StyleType::Highlight)
        ),
        OAuthOutcome::Cancelled => println!(
            "{}",
            ui::style_text("Sign-in cancelled.", ui::StyleType::Subtle)
        ),
    }
    Ok(())
}

pub async fn logout(controller: &AuthController) -> Result<()> {
    controller.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn reset_password(controller: &AuthController, email: Option<String>) -> Result<()> {
    let email = email_or_prompt(email)?;
    controller.reset_password(&email).await?;
    println!("Check your email to reset your password.");
    Ok(())
}
