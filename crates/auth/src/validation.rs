//! Input validation for login and profile data.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::AuthError;

static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").ok());

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_DISPLAY_NAME_LENGTH: usize = 64;

/// Trim and lowercase an email address and check its format.
pub fn normalise_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_ascii_lowercase();

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::InvalidEmail);
    }

    let regex = EMAIL_REGEX.as_ref().ok_or(AuthError::InvalidEmail)?;
    if !regex.is_match(&email) {
        return Err(AuthError::InvalidEmail);
    }

    Ok(email)
}

/// Check a normalised address against an allowlist of domains.
///
/// Subdomains of an allowed domain are accepted as well, so `uni.de` admits
/// `student.uni.de`.
pub fn domain_allowed(email: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }

    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };

    allowed.iter().any(|candidate| {
        domain == candidate
            || domain
                .strip_suffix(candidate.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

pub fn validate_display_name(display_name: &str) -> Result<String, AuthError> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(AuthError::InvalidDisplayName);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AuthError::InvalidDisplayName);
    }
    Ok(trimmed.to_owned())
}

/// Display name for a first login: the local part with separators turned into spaces.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let words: Vec<String> = local
        .split(['.', '_', '-', '+'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        local.to_owned()
    } else {
        words.join(" ")
    }
}
