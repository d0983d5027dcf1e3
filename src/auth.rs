//! Device authorization grant against the repository host.
//!
//! [`AuthGuard::authenticate`] walks Idle → DeviceRequested → Polling →
//! Authenticated. A resident token is checked with a self-identity request
//! first; a rejected one is discarded and the device flow starts over.
//! `slow_down` adds five seconds to the polling interval, `expired_token`
//! and an elapsed `expires_in` restart the flow, and the remaining error
//! codes are fatal.

use crate::config::ArkConfig;
use crate::errors::{AuthError, HostError};
use crate::github::{DeviceCode, RepositoryHost, User};
use crate::prompt::Prompter;
use crate::ui;
use console::style;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// OAuth scope requested for submissions.
pub const SCOPE: &str = "repo";

const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const SPINNER_TICK: Duration = Duration::from_millis(120);

/// An accepted token and the account it belongs to.
#[derive(Debug, Clone)]
pub struct Identity {
    pub token: String,
    pub user: User,
}

enum Poll {
    Granted(String),
    Expired,
}

pub struct AuthGuard<'a> {
    host: &'a dyn RepositoryHost,
    prompter: &'a dyn Prompter,
    client_id: String,
    token: Option<String>,
    persist_to: Option<PathBuf>,
    open_browser: bool,
}

impl<'a> AuthGuard<'a> {
    pub fn new(
        host: &'a dyn RepositoryHost,
        prompter: &'a dyn Prompter,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            host,
            prompter,
            client_id: client_id.into(),
            token: None,
            persist_to: None,
            open_browser: true,
        }
    }

    /// Start from a token loaded from configuration. Empty strings are ignored.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Offer to save newly issued tokens into this configuration file.
    pub fn persist_to(mut self, path: PathBuf) -> Self {
        self.persist_to = Some(path);
        self
    }

    /// Skip the offer to open the verification page in a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Forget the resident token; the next [`authenticate`](Self::authenticate)
    /// runs the device flow.
    pub fn discard(&mut self) {
        self.token = None;
    }

    pub async fn authenticate(&mut self) -> Result<Identity, AuthError> {
        if let Some(token) = self.token.take() {
            match self.host.current_user(&token).await {
                Ok(user) => {
                    debug!(login = %user.login, "resident token accepted");
                    self.token = Some(token.clone());
                    return Ok(Identity { token, user });
                }
                Err(HostError::Unauthorized) => {
                    warn!("stored token was rejected, requesting a new one");
                    self.forget_saved(&token)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            let token = self.device_flow().await?;
            let user = self.host.current_user(&token).await?;
            let question = format!("Authenticated as {}. Is this the right account?", user.login);
            if !self.prompter.confirm(&question, true)? {
                println!("Discarding that token; starting again.");
                continue;
            }
            self.offer_persistence(&token)?;
            self.token = Some(token.clone());
            return Ok(Identity { token, user });
        }
    }

    async fn device_flow(&self) -> Result<String, AuthError> {
        if self.client_id.is_empty() {
            return Err(AuthError::MissingClientId);
        }
        loop {
            let code = self.host.request_device_code(&self.client_id, SCOPE).await?;
            println!(
                "Open {} and enter the code {}",
                style(&code.verification_uri).cyan(),
                style(&code.user_code).bold()
            );
            println!("The code expires in {}.", human_duration(code.expires_in));

            if self.open_browser
                && self
                    .prompter
                    .confirm("Open the verification page in your browser?", true)?
            {
                if let Err(e) = open::that(&code.verification_uri) {
                    warn!(error = %e, "could not open a browser");
                }
            }

            let spinner = ui::spinner("Waiting for authorization...");
            let outcome = self.poll(&code, &spinner).await;
            spinner.finish_and_clear();

            match outcome? {
                Poll::Granted(token) => return Ok(token),
                Poll::Expired => println!("You didn't authorize the app in time! Please try again."),
            }
        }
    }

    async fn poll(&self, code: &DeviceCode, spinner: &ProgressBar) -> Result<Poll, AuthError> {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval.max(1));

        loop {
            wait(interval, spinner).await;
            if Instant::now() >= deadline {
                return Ok(Poll::Expired);
            }

            let resp = self.host.poll_token(&self.client_id, &code.device_code).await?;
            if let Some(token) = resp.access_token {
                return Ok(Poll::Granted(token));
            }
            match resp.error.as_deref() {
                Some("authorization_pending") => {}
                Some("slow_down") => {
                    interval += SLOW_DOWN_STEP;
                    debug!(interval_secs = interval.as_secs(), "host asked to slow down");
                }
                Some("expired_token") => return Ok(Poll::Expired),
                Some("access_denied") => return Err(AuthError::AccessDenied),
                Some("incorrect_device_code") => return Err(AuthError::IncorrectDeviceCode),
                Some("unsupported_grant_type") => return Err(AuthError::UnsupportedGrantType),
                Some("incorrect_client_credentials") => {
                    return Err(AuthError::IncorrectClientCredentials);
                }
                Some(other) => return Err(AuthError::Unexpected(other.to_string())),
                None => {
                    return Err(AuthError::Unexpected(
                        "token response had neither a token nor an error".into(),
                    ));
                }
            }
        }
    }

    /// Remove `token` from the configuration file if that is where it came from.
    fn forget_saved(&self, token: &str) -> Result<(), AuthError> {
        let Some(path) = &self.persist_to else {
            return Ok(());
        };
        if ArkConfig::load(path)?.git.token == token {
            ArkConfig::update(path, |cfg| cfg.git.token.clear())?;
            debug!(path = %path.display(), "rejected token removed from configuration");
        }
        Ok(())
    }

    fn offer_persistence(&self, token: &str) -> Result<(), AuthError> {
        let Some(path) = &self.persist_to else {
            return Ok(());
        };
        let question = format!(
            "Save this token to {}? It is stored in plain text.",
            path.display()
        );
        if self.prompter.confirm(&question, false)? {
            ArkConfig::update(path, |cfg| cfg.git.token = token.to_string())?;
            println!(
                "{} anyone who can read {} can act as you on the repository host",
                style("Warning:").yellow().bold(),
                path.display()
            );
        }
        Ok(())
    }
}

/// Sleep for `period`, ticking the spinner while waiting.
async fn wait(period: Duration, spinner: &ProgressBar) {
    let deadline = Instant::now() + period;
    let mut ticker = tokio::time::interval(SPINNER_TICK);
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return,
            _ = ticker.tick() => spinner.tick(),
        }
    }
}

/// "15 minutes", "1 minute 30 seconds", "45 seconds".
pub fn human_duration(secs: u64) -> String {
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    let (minutes, seconds) = (secs / 60, secs % 60);
    match (minutes, seconds) {
        (0, s) => plural(s, "second"),
        (m, 0) => plural(m, "minute"),
        (m, s) => format!("{} {}", plural(m, "minute"), plural(s, "second")),
    }
}
