//! Toast summaries for newly accepted notifications.

use std::time::Duration;

use serde::Serialize;

use crate::config::NotifyConfig;
use crate::model::Notification;

/// A short-lived alert shown for freshly delivered notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    /// Notification type this toast summarizes
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Number of notifications folded into this toast
    pub count: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Build one toast per notification type, in order of first arrival.
///
/// A lone notification shows its own title and message; several of the same
/// type collapse into a "N new notifications" summary.
pub fn summarize(accepted: &[Notification], config: &NotifyConfig) -> Vec<Toast> {
    let mut groups: Vec<(&str, Vec<&Notification>)> = Vec::new();
    for notification in accepted {
        match groups.iter_mut().find(|(kind, _)| *kind == notification.kind) {
            Some((_, members)) => members.push(notification),
            None => groups.push((notification.kind.as_str(), vec![notification])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(kind, members)| {
            let count = members.len();
            let (title, message) = match members.as_slice() {
                [single] => (single.title.clone(), single.message.as_str()),
                [.., latest] => (format!("{count} new notifications"), latest.title.as_str()),
                [] => return None,
            };
            Some(Toast {
                kind: kind.to_string(),
                title,
                message: truncate_chars(message, config.toast_message_max_chars),
                count,
                duration: config.toast_duration(),
            })
        })
        .collect()
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    const ELLIPSIS: &str = "...";
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
