//! Input checks shared by the chat services.

use crate::types::{ChatError, ChatResult};

pub const EXCERPT_CHARS: usize = 120;
pub const MAX_ATTACHMENTS_PER_MESSAGE: usize = 10;

const MAX_FILE_NAME_CHARS: usize = 128;

/// Trim a channel name and check it is 3 to 64 characters long.
pub fn channel_name(name: &str) -> ChatResult<String> {
    let name = name.trim();
    let length = name.chars().count();
    if !(3..=64).contains(&length) {
        return Err(ChatError::validation(
            "channel name must be between 3 and 64 characters",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(ChatError::validation("channel name contains control characters"));
    }
    Ok(name.to_owned())
}

pub fn channel_description(description: Option<&str>) -> ChatResult<Option<String>> {
    let Some(description) = description.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > 500 {
        return Err(ChatError::validation(
            "channel description must be at most 500 characters",
        ));
    }
    Ok(Some(description.to_owned()))
}

/// Trim message content and enforce the length limit.
///
/// Empty content is accepted only when the message carries attachments.
pub fn message_content(content: &str, max_chars: usize, has_attachments: bool) -> ChatResult<String> {
    let content = content.trim();
    if content.is_empty() && !has_attachments {
        return Err(ChatError::validation("message content cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(ChatError::validation(format!(
            "message content must be at most {max_chars} characters"
        )));
    }
    Ok(content.to_owned())
}

pub fn report_reason(reason: &str) -> ChatResult<String> {
    let reason = reason.trim();
    let length = reason.chars().count();
    if !(3..=500).contains(&length) {
        return Err(ChatError::validation(
            "report reason must be between 3 and 500 characters",
        ));
    }
    Ok(reason.to_owned())
}

/// First [`EXCERPT_CHARS`] characters of `content`, with an ellipsis when cut.
pub fn excerpt(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Reduce an uploaded file name to a safe base name.
pub fn file_name(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "attachment".to_owned()
    } else {
        cleaned.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_are_trimmed_and_bounded() {
        assert_eq!(channel_name("  Study Group  ").unwrap(), "Study Group");
        assert!(channel_name("ab").is_err());
        assert!(channel_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn empty_messages_need_attachments() {
        assert!(message_content("   ", 100, false).is_err());
        assert_eq!(message_content("   ", 100, true).unwrap(), "");
        assert!(message_content("toolong", 3, false).is_err());
    }

    #[test]
    fn excerpt_cuts_long_content_on_char_boundary() {
        let long = "ä".repeat(EXCERPT_CHARS + 5);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn file_names_lose_paths_and_odd_characters() {
        assert_eq!(file_name("../../etc/passwd"), "passwd");
        assert_eq!(file_name("C:\\Users\\me\\notes v2.pdf"), "notes v2.pdf");
        assert_eq!(file_name("<script>.png"), "_script_.png");
        assert_eq!(file_name(".hidden"), "hidden");
        assert_eq!(file_name(""), "attachment");
    }
}
