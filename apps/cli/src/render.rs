//! Plain-text rendering for the terminal.

use std::collections::HashMap;

use modnet_client::{MessageView, RoomKind, RoomPresence, RoomSummary, Timeline};

const EXCERPT_CHARS: usize = 40;

pub fn room_line(room: &RoomSummary) -> String {
    let kind = match room.kind {
        RoomKind::Module => "module",
        RoomKind::Channel => "channel",
    };
    format!(
        "{:<26} {:<8} {:<32} {} members",
        room.id, kind, room.name, room.member_count
    )
}

/// One message, with reply context and attachment names.
pub fn message_line(message: &MessageView) -> String {
    let time = message
        .created_at
        .get(11..19)
        .unwrap_or(message.created_at.as_str());

    let mut line = format!("[{time}] {}: ", message.author.display_name);
    if let Some(parent) = &message.reply_to {
        let quoted = match (&parent.excerpt, parent.deleted) {
            (_, true) | (None, _) => "deleted message".to_owned(),
            (Some(excerpt), false) => excerpt.chars().take(EXCERPT_CHARS).collect(),
        };
        line.push_str(&format!("(re: {quoted}) "));
    }

    match &message.content {
        Some(content) if !message.is_deleted() => line.push_str(content),
        _ => line.push_str("<message deleted>"),
    }
    if message.edited_at.is_some() && !message.is_deleted() {
        line.push_str(" (edited)");
    }
    for attachment in &message.attachments {
        line.push_str(&format!(" [{}]", attachment.file_name));
    }
    line
}

pub fn presence_line(presence: &RoomPresence) -> String {
    match presence.online_count {
        1 => "1 person here".to_owned(),
        count => format!("{count} people here"),
    }
}

/// Remembers which version of each message was printed so a timeline
/// refresh only prints what is new or changed.
#[derive(Debug, Default)]
pub struct TimelinePrinter {
    printed: HashMap<String, i64>,
}

impl TimelinePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&mut self, timeline: &Timeline) -> Vec<String> {
        let mut lines = Vec::new();
        for message in timeline.messages() {
            let seen = self.printed.get(&message.id).copied();
            if seen == Some(message.seq) {
                continue;
            }
            let line = message_line(message);
            lines.push(if seen.is_some() {
                format!("  * {line}")
            } else {
                line
            });
            self.printed.insert(message.id.clone(), message.seq);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modnet_client::{AttachmentView, AuthorView, ReplyPreview};

    fn message(id: &str, second: u32) -> MessageView {
        let at = format!("2024-05-01T10:00:{second:02}.000000Z");
        MessageView {
            id: id.to_owned(),
            room_id: "room".to_owned(),
            author: AuthorView {
                id: "user-ada".into(),
                display_name: "Ada".into(),
            },
            content: Some(format!("text {id}")),
            reply_to: None,
            attachments: Vec::new(),
            created_at: at.clone(),
            updated_at: at,
            edited_at: None,
            deleted_at: None,
            seq: i64::from(second),
        }
    }

    #[test]
    fn renders_replies_attachments_and_tombstones() {
        let mut reply = message("b", 2);
        reply.reply_to = Some(ReplyPreview {
            id: "a".into(),
            author: None,
            excerpt: Some("text a".into()),
            deleted: false,
        });
        reply.attachments.push(AttachmentView {
            id: "att".into(),
            file_name: "blatt1.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 10,
            url: "/api/attachments/att".into(),
        });
        assert_eq!(
            message_line(&reply),
            "[10:00:02] Ada: (re: text a) text b [blatt1.pdf]"
        );

        let mut gone = message("c", 3);
        gone.content = None;
        gone.deleted_at = Some(gone.updated_at.clone());
        assert_eq!(message_line(&gone), "[10:00:03] Ada: <message deleted>");
    }

    #[test]
    fn printer_only_emits_changes() {
        let mut timeline = Timeline::new("room");
        let mut printer = TimelinePrinter::new();
        timeline.apply_page(vec![message("a", 1), message("b", 2)]);
        assert_eq!(printer.pending(&timeline).len(), 2);
        assert!(printer.pending(&timeline).is_empty());

        let mut edited = message("a", 1);
        edited.content = Some("changed".into());
        edited.updated_at = "2024-05-01T10:00:09.000000Z".into();
        edited.seq = 9;
        edited.edited_at = Some(edited.updated_at.clone());
        timeline.upsert(edited);

        let lines = printer.pending(&timeline);
        assert_eq!(lines, ["  * [10:00:01] Ada: changed (edited)"]);
    }
}
