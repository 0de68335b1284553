use anichat_notify::{ClientEvent, MarkReadSummary, Notification, Toast};
use anyhow::Result;
#[cfg(feature = "colored-output")]
use colored::*;
use serde_json::json;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    /// One line for a `watch` event, or `None` for events not worth printing.
    pub fn format_event(&self, event: &ClientEvent, as_json: bool) -> Option<String> {
        if as_json {
            return event_json(event).map(|value| value.to_string());
        }

        match event {
            ClientEvent::Toast(toast) => Some(self.format_toast(toast)),
            ClientEvent::ConnectionChanged { connected: true } => {
                Some(self.colorize("● online", &Color::Green, true))
            }
            ClientEvent::ConnectionChanged { connected: false } => {
                Some(self.colorize("○ offline", &Color::Red, true))
            }
            ClientEvent::Reconnecting { attempt, delay } => Some(self.colorize(
                &format!("  reconnecting in {}ms (attempt {attempt})", delay.as_millis()),
                &Color::Yellow,
                false,
            )),
            _ => None,
        }
    }

    pub fn format_toast(&self, toast: &Toast) -> String {
        format!(
            "{} {}\n  {}",
            self.colorize(&format!("[{}]", toast.kind), &Color::Cyan, false),
            self.colorize(&toast.title, &Color::Green, true),
            toast.message
        )
    }

    pub fn format_notifications(
        &self,
        notifications: &[Notification],
        as_json: bool,
    ) -> Result<String> {
        if as_json {
            return Ok(serde_json::to_string_pretty(notifications)?);
        }
        if notifications.is_empty() {
            return Ok("No notifications.".to_string());
        }

        #[cfg(feature = "table-output")]
        {
            Ok(self.format_table(notifications))
        }
        #[cfg(not(feature = "table-output"))]
        {
            Ok(self.format_pretty(notifications))
        }
    }

    pub fn format_summary(&self, summary: &MarkReadSummary, as_json: bool) -> Result<String> {
        if as_json {
            return Ok(serde_json::to_string_pretty(summary)?);
        }
        if summary.requested == 0 {
            return Ok("Nothing to mark, all notifications are read.".to_string());
        }

        let mut output = format!(
            "{} {} of {} notifications in {} batches",
            self.colorize("✓ Marked read:", &Color::Green, true),
            summary.succeeded,
            summary.requested,
            summary.batches
        );
        if summary.failed > 0 {
            output.push('\n');
            output.push_str(&self.colorize(
                &format!("  {} failed and will be corrected on the next refresh", summary.failed),
                &Color::Red,
                false,
            ));
        }
        Ok(output)
    }

    #[cfg(feature = "table-output")]
    fn format_table(&self, notifications: &[Notification]) -> String {
        #[derive(Tabled)]
        struct NotificationRow<'a> {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Type")]
            kind: &'a str,
            #[tabled(rename = "Title")]
            title: &'a str,
            #[tabled(rename = "Read")]
            read: &'static str,
            #[tabled(rename = "Created")]
            created: String,
        }

        let rows = notifications.iter().map(|n| NotificationRow {
            id: n.id,
            kind: &n.kind,
            title: &n.title,
            read: if n.read { "yes" } else { "no" },
            created: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
        });
        Table::new(rows).with(Style::rounded()).to_string()
    }

    #[cfg(not(feature = "table-output"))]
    fn format_pretty(&self, notifications: &[Notification]) -> String {
        let mut output = String::new();
        for n in notifications {
            let marker = if n.read { " " } else { "*" };
            output.push_str(&format!(
                "{marker} {} {} {}\n    {}\n",
                self.colorize(&n.id.to_string(), &Color::Yellow, false),
                self.colorize(&format!("[{}]", n.kind), &Color::Cyan, false),
                self.colorize(&n.title, &Color::Green, !n.read),
                n.message
            ));
        }
        output
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Red => text.red(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

fn event_json(event: &ClientEvent) -> Option<serde_json::Value> {
    let value = match event {
        ClientEvent::Toast(toast) => json!({ "event": "toast", "toast": toast }),
        ClientEvent::ConnectionChanged { connected } => {
            json!({ "event": "connection", "connected": connected })
        }
        ClientEvent::Reconnecting { attempt, delay } => json!({
            "event": "reconnecting",
            "attempt": attempt,
            "delay_ms": delay.as_millis() as u64,
        }),
        ClientEvent::CacheUpdated { len, unread } => {
            json!({ "event": "cache", "len": len, "unread": unread })
        }
        ClientEvent::RefreshFailed { error } => {
            json!({ "event": "refresh_failed", "error": error })
        }
        ClientEvent::StateChanged(_) => return None,
    };
    Some(value)
}

enum Color {
    Green,
    Yellow,
    Red,
    Cyan,
}
