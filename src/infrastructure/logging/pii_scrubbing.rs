use regex::{Captures, Regex};
use std::fmt;

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const PHONE_PATTERN: &str = r"\+?\(?\d[\d\s().-]{6,}\d";

/// Digits a run must contain before it is treated as a phone number.
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

/// Redacts candidate contact details from free text before it is written to
/// the audit trail or logs.
///
/// Vendor error pages and validation messages often echo submitted values
/// back, so every message an agent records passes through here.
#[derive(Clone)]
pub struct PiiScrubber {
    email_pattern: Option<Regex>,
    phone_pattern: Option<Regex>,
}

impl PiiScrubber {
    pub fn new() -> Self {
        Self {
            email_pattern: Regex::new(EMAIL_PATTERN).ok(),
            phone_pattern: Regex::new(PHONE_PATTERN).ok(),
        }
    }

    /// Scrub a message of e-mail addresses and phone numbers
    pub fn scrub(&self, message: &str) -> String {
        let mut scrubbed = match &self.email_pattern {
            Some(re) => re.replace_all(message, "[EMAIL_REDACTED]").into_owned(),
            None => message.to_string(),
        };

        if let Some(re) = &self.phone_pattern {
            scrubbed = re
                .replace_all(&scrubbed, |caps: &Captures| {
                    let candidate = &caps[0];
                    let digits = candidate.chars().filter(char::is_ascii_digit).count();
                    // Shorter runs are dates, ports and ids.
                    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
                        "[PHONE_REDACTED]".to_string()
                    } else {
                        candidate.to_string()
                    }
                })
                .into_owned();
        }

        scrubbed
    }
}

impl Default for PiiScrubber {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PiiScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiiScrubber").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        let scrubber = PiiScrubber::new();
        assert!(scrubber.email_pattern.is_some());
        assert!(scrubber.phone_pattern.is_some());
    }

    #[test]
    fn test_scrub_email() {
        let scrubber = PiiScrubber::new();
        let scrubbed = scrubber.scrub("Invalid value 'ada.lovelace+jobs@example.co.uk' for #email");

        assert!(!scrubbed.contains("ada.lovelace"));
        assert!(scrubbed.contains("[EMAIL_REDACTED]"));
        assert!(scrubbed.contains("#email"));
    }

    #[test]
    fn test_scrub_phone_numbers() {
        let scrubber = PiiScrubber::new();
        for phone in ["+1 (555) 123-4567", "555.123.4567", "+44 20 7946 0958"] {
            let scrubbed = scrubber.scrub(&format!("phone {phone} rejected"));
            assert!(!scrubbed.contains(phone), "{phone} survived: {scrubbed}");
            assert!(scrubbed.contains("[PHONE_REDACTED]"));
        }
    }

    #[test]
    fn test_keeps_short_numbers() {
        let scrubber = PiiScrubber::new();
        let message = "Timed out after 60000ms on 2026-10-16 via localhost:4444";
        assert_eq!(scrubber.scrub(message), message);
    }
}
