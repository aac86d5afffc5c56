//! Diagnostic operator tool: open the authenticated profile's first tab,
//! classify what's currently on screen, and print the classification.
//!
//! Purely read-only beyond the auto-dismiss behavior `Driver::detect_errors`
//! already performs. Meant to be run by hand during initial profile setup or
//! when a send is timing out and the owner suspects the session fell out of
//! being logged in.

use std::fmt;

use gem_pool::config;
use gem_pool::driver::ChromeDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginState {
    AlreadyLoggedIn,
    GoogleEmailPrompt,
    GooglePasswordPrompt,
    Google2faAuthenticator,
    Google2faSms,
    Google2faSecurityKey,
    Google2faBackupCodes,
    Google2faUnknown,
    GoogleConsent,
    GoogleCaptcha,
    GoogleAccountChooser,
    TargetLoading,
    TargetReady,
    Unknown,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoginState::AlreadyLoggedIn => "already_logged_in",
            LoginState::GoogleEmailPrompt => "google_email_prompt",
            LoginState::GooglePasswordPrompt => "google_password_prompt",
            LoginState::Google2faAuthenticator => "google_2fa_authenticator",
            LoginState::Google2faSms => "google_2fa_sms",
            LoginState::Google2faSecurityKey => "google_2fa_security_key",
            LoginState::Google2faBackupCodes => "google_2fa_backup_codes",
            LoginState::Google2faUnknown => "google_2fa_unknown",
            LoginState::GoogleConsent => "google_consent",
            LoginState::GoogleCaptcha => "google_captcha",
            LoginState::GoogleAccountChooser => "google_account_chooser",
            LoginState::TargetLoading => "target_loading",
            LoginState::TargetReady => "target_ready",
            LoginState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

const GOOGLE_EMAIL_FIELD: &str = "#identifierId, input[type=\"email\"][name=\"identifier\"]";
const GOOGLE_PASSWORD_FIELD: &str = "input[type=\"password\"][name=\"Passwd\"]";
const GOOGLE_2FA_AUTHENTICATOR: &str = "[data-challengetype=\"39\"], div[data-generic-prompt-challenge-tag=\"totp\"]";
const GOOGLE_2FA_SMS: &str = "[data-challengetype=\"9\"], input[type=\"tel\"][aria-label*=\"code\"]";
const GOOGLE_2FA_SECURITY_KEY: &str = "[data-challengetype=\"6\"], div:has-text(\"security key\")";
const GOOGLE_2FA_BACKUP_CODES: &str = "[data-challengetype=\"8\"], div:has-text(\"backup code\")";
const GOOGLE_2FA_GENERIC: &str = "div:has-text(\"2-Step Verification\"), div:has-text(\"Bestätigung in zwei Schritten\")";
const GOOGLE_CONSENT: &str = "#submit_approve_access, button:has-text(\"I agree\")";
const GOOGLE_CAPTCHA: &str = "iframe[src*=\"recaptcha\"], #captcha";
const GOOGLE_ACCOUNT_CHOOSER: &str = "div[data-identifier], ul[aria-label=\"Choose an account\"]";
const TARGET_LOADING: &str = "div.loading-indicator, mat-progress-spinner";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = config::load_config_from_env()?;
    let driver = ChromeDriver::new(config.browser.clone());
    gem_pool::driver::Driver::start(&driver).await?;

    let base_url = base_origin(&config.browser.target_url);
    let handle = driver.open_page(&base_url).await?;
    tokio::time::sleep(std::time::Duration::from_millis(2000)).await;

    let state = classify(&driver, handle).await?;
    println!("{state}");

    if let Some(snippet) = snippet_for(&driver, handle, state).await {
        println!("---");
        println!("{snippet}");
    }

    Ok(())
}

fn base_origin(target_url: &str) -> String {
    let without_scheme = target_url.splitn(2, "://").nth(1).unwrap_or(target_url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    let scheme = if target_url.starts_with("http://") {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{host}")
}

async fn classify(
    driver: &ChromeDriver,
    handle: gem_pool::driver::PageHandle,
) -> Result<LoginState, Box<dyn std::error::Error>> {
    use gem_pool::driver::Driver as _;

    if driver.is_logged_in(handle).await {
        return Ok(LoginState::AlreadyLoggedIn);
    }

    let page = driver.raw_page(handle).await?;

    let present = |selector: &str| {
        let page = page.clone();
        let selector = selector.to_string();
        async move { page.find_element(&selector).await.is_ok() }
    };

    if present(GOOGLE_ACCOUNT_CHOOSER).await {
        return Ok(LoginState::GoogleAccountChooser);
    }
    if present(GOOGLE_CAPTCHA).await {
        return Ok(LoginState::GoogleCaptcha);
    }
    if present(GOOGLE_CONSENT).await {
        return Ok(LoginState::GoogleConsent);
    }
    if present(GOOGLE_2FA_AUTHENTICATOR).await {
        return Ok(LoginState::Google2faAuthenticator);
    }
    if present(GOOGLE_2FA_SMS).await {
        return Ok(LoginState::Google2faSms);
    }
    if present(GOOGLE_2FA_SECURITY_KEY).await {
        return Ok(LoginState::Google2faSecurityKey);
    }
    if present(GOOGLE_2FA_BACKUP_CODES).await {
        return Ok(LoginState::Google2faBackupCodes);
    }
    if present(GOOGLE_2FA_GENERIC).await {
        return Ok(LoginState::Google2faUnknown);
    }
    if present(GOOGLE_PASSWORD_FIELD).await {
        return Ok(LoginState::GooglePasswordPrompt);
    }
    if present(GOOGLE_EMAIL_FIELD).await {
        return Ok(LoginState::GoogleEmailPrompt);
    }
    if present(TARGET_LOADING).await {
        return Ok(LoginState::TargetLoading);
    }
    if driver.is_logged_in(handle).await {
        return Ok(LoginState::TargetReady);
    }

    Ok(LoginState::Unknown)
}

/// A short supporting snippet (page title and URL) to help a human confirm
/// the classification at a glance.
async fn snippet_for(
    driver: &ChromeDriver,
    handle: gem_pool::driver::PageHandle,
    _state: LoginState,
) -> Option<String> {
    let page = driver.raw_page(handle).await.ok()?;
    let url = page.url().await.ok().flatten().unwrap_or_default();
    let title = page
        .evaluate("document.title")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .unwrap_or_default();
    Some(format!("url: {url}\ntitle: {title}"))
}
