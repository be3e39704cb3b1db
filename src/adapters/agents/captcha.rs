//! Substring heuristics run against the rendered page before any input.

/// Indicators of a CAPTCHA challenge, most specific first so the reported
/// indicator names the provider when possible.
pub const CAPTCHA_INDICATORS: &[&str] = &[
    "recaptcha",
    "hcaptcha",
    "cf-turnstile",
    "verify-you-are-human",
    "verify you are human",
    "are you a robot",
    "i'm not a robot",
    "captcha",
];

const ACCESS_DENIED_INDICATORS: &[&str] = &["403 forbidden", "access denied"];

/// First CAPTCHA indicator found in `page`, case-insensitively.
pub fn find_captcha_indicator(page: &str) -> Option<&'static str> {
    let page = page.to_lowercase();
    CAPTCHA_INDICATORS
        .iter()
        .copied()
        .find(|indicator| page.contains(indicator))
}

/// Whether the page is a 403-style refusal rather than the application form.
pub fn is_access_denied(page: &str) -> bool {
    let page = page.to_lowercase();
    ACCESS_DENIED_INDICATORS.iter().any(|i| page.contains(i))
}
