//! Central selectors for the target LLM web UI.
//!
//! Each role name maps to an ordered list of CSS selector candidates, tried
//! together as a single comma-joined query. Update this module when the
//! target UI changes; nothing else in the crate should need to.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Cookie consent banner "Accept all" button.
pub const COOKIE_ACCEPT_BTN: &str = concat!(
    "button:has-text(\"Alle akzeptieren\"), ",
    "button:has-text(\"Accept all\"), ",
    "button:has-text(\"Alle annehmen\")",
);

/// Elements visible only when truly logged in.
pub const LOGGED_IN_INDICATORS: &str = concat!(
    "a[aria-label*=\"Google-Konto:\"], ",
    "a[aria-label*=\"Google Account:\"], ",
    "rich-textarea, ",
    ".ql-editor[contenteditable=\"true\"]",
);

/// Signals that the user is NOT logged in.
pub const NOT_LOGGED_IN_INDICATORS: &str = concat!(
    "button.sign-in-button, ",
    "button:has-text(\"Anmelden\"), ",
    "button:has-text(\"Sign in\"), ",
    "a:has-text(\"Sign in\"), ",
    "a:has-text(\"Anmelden\")",
);

/// Session expired: sign-in affordance reappears.
pub const SESSION_EXPIRED_INDICATORS: &str = concat!(
    "button.sign-in-button, ",
    "button:has-text(\"Sign in\"), ",
    "button:has-text(\"Anmelden\")",
);

/// Generic error dialogs with a retry affordance.
pub const ERROR_DIALOGS: &str = concat!(
    "button:has-text(\"Try again\"), ",
    "button:has-text(\"Erneut versuchen\"), ",
    "button:has-text(\"Retry\"), ",
    "div:has-text(\"Something went wrong\"), ",
    "div:has-text(\"Es ist ein Fehler aufgetreten\")",
);

/// Bot-detection interstitial.
pub const BOT_DETECTION: &str =
    "div:has-text(\"unusual traffic\"), div:has-text(\"ungewöhnlichen Datenverkehr\")";

/// Enterprise/premium account indicators.
pub const ENTERPRISE_INDICATORS: &str = concat!(
    "rich-textarea.enterprise, ",
    ".enterprise-indicator-logo-container, ",
    ".enterprise-display",
);

/// Each response is a custom element; this is the canonical way to count
/// and iterate them.
pub const RESPONSE_CONTAINER: &str = "model-response";

/// The rendered markdown panel within a response container.
pub const RESPONSE_TEXT: &str = ".markdown.markdown-main-panel";

/// Busy/done attribute selectors on the markdown panel.
pub const GENERATION_BUSY: &str = ".markdown.markdown-main-panel[aria-busy=\"true\"]";

/// Role name → ordered candidate CSS queries.
pub fn selectors() -> &'static HashMap<&'static str, Vec<&'static str>> {
    static SELECTORS: OnceLock<HashMap<&'static str, Vec<&'static str>>> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(
            "prompt_textarea",
            vec![
                ".ql-editor.textarea",
                "div[role=\"textbox\"][contenteditable=\"true\"]",
                ".ql-editor",
                "rich-textarea",
            ],
        );
        m.insert(
            "send_button",
            vec![
                "button.send-button",
                "button[aria-label=\"Nachricht senden\"]",
                "button[aria-label=\"Send message\"]",
            ],
        );
        m.insert(
            "stop_button",
            vec![
                "[data-mat-icon-name=\"stop\"]",
                "button:has([data-mat-icon-name=\"stop\"])",
                "button[aria-label=\"Stop generating\"]",
                "button[aria-label=\"Generierung stoppen\"]",
                "button[aria-label=\"Antwort stoppen\"]",
                "button.stop-button",
            ],
        );
        m.insert(
            "copy_button",
            vec![
                "button[data-test-id=\"copy-button\"]",
                "button[aria-label=\"Kopieren\"]",
                "button[aria-label=\"Copy\"]",
            ],
        );
        m.insert(
            "add_button",
            vec![
                "[aria-controls=\"upload-file-menu\"]",
                "div.file-uploader button",
            ],
        );
        m.insert(
            "file_upload_button",
            vec![
                "[data-test-id=\"local-images-files-uploader-button\"]",
                "button[data-test-id=\"local-images-files-uploader-button\"]",
            ],
        );
        m.insert(
            "model_selector",
            vec![
                "button[data-test-id=\"bard-mode-menu-button\"]",
                "button[aria-label=\"Modusauswahl öffnen\"]",
            ],
        );
        m.insert(
            "model_menu_item",
            vec![
                "button.mat-mdc-menu-item",
                "mat-option",
                "div[role=\"menuitem\"]",
                "button[role=\"menuitem\"]",
            ],
        );
        m.insert(
            "new_chat",
            vec![
                "a[aria-label=\"Neuer Chat\"]",
                "a[aria-label=\"New chat\"]",
                "side-nav-action-button[data-test-id=\"new-chat-button\"] a",
            ],
        );
        m
    })
}

/// The combined, comma-joined query for a named role.
///
/// Returns `None` if `name` is not a known selector role.
pub fn combined(name: &str) -> Option<String> {
    selectors().get(name).map(|candidates| candidates.join(", "))
}

/// Localized phrases indicating the model stopped generating mid-response.
pub const STOPPED_RESPONSE_INDICATORS: &[&str] = &[
    "antwort angehalten",
    "response stopped",
    "you stopped this response",
];

/// Sentinel written to the clipboard before the copy click, so a stale read
/// can be told apart from a fresh one.
pub const CLIPBOARD_SENTINEL: &str = "__SENTINEL__";
