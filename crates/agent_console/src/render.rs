//! Line-oriented rendering of transcript snapshots.

use std::collections::HashMap;

use agent_link::{EventKind, InboundEvent, Role, TranscriptSnapshot, TurnId};

#[derive(Debug, Default, Clone, Copy)]
struct Printed {
    side_events: usize,
    finished: bool,
}

/// Turns successive snapshots into the lines not printed yet.
///
/// Side events are printed as they arrive, numbered from 1 within their
/// turn; assistant text is printed once the turn closes.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: HashMap<TurnId, Printed>,
    lost_notice: Option<String>,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &TranscriptSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        for turn in &snapshot.turns {
            let printed = self.printed.entry(turn.id).or_default();
            if printed.finished {
                continue;
            }

            match turn.role {
                Role::User => {
                    lines.push(format!("you[{}]: {}", turn.id, turn.text));
                    printed.finished = true;
                }
                Role::Assistant => {
                    for (index, side) in turn
                        .side_events
                        .iter()
                        .enumerate()
                        .skip(printed.side_events)
                    {
                        lines.push(format!(
                            "  [{} #{}] {}",
                            turn.id,
                            index + 1,
                            describe_event(&side.event)
                        ));
                    }
                    printed.side_events = turn.side_events.len();

                    if !turn.is_open {
                        lines.push(format!("agent[{}]: {}", turn.id, turn.text));
                        printed.finished = true;
                    }
                }
            }
        }

        if snapshot.connection_lost != self.lost_notice {
            if let Some(reason) = &snapshot.connection_lost {
                lines.push(format!("! connection lost: {reason} (use /connect to reconnect)"));
            }
            self.lost_notice = snapshot.connection_lost.clone();
        }

        lines
    }
}

pub fn describe_event(event: &InboundEvent) -> String {
    match event.kind {
        EventKind::ToolCall | EventKind::ToolResult => {
            let tool = event.tool.as_deref().unwrap_or("tool");
            match event.status.as_deref() {
                Some(status) => format!("{} {tool} ({status})", event.kind.as_str()),
                None => format!("{} {tool}", event.kind.as_str()),
            }
        }
        EventKind::Code => format!(
            "code ({})",
            event.language.as_deref().unwrap_or("text")
        ),
        EventKind::Error => format!(
            "error: {}",
            event
                .message
                .as_deref()
                .or(event.content.as_deref())
                .unwrap_or("unknown error")
        ),
        kind => match event.content.as_deref() {
            Some(content) if !content.is_empty() => format!("{}: {content}", kind.as_str()),
            _ => kind.as_str().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use agent_link::{EventFold, InboundEvent, TranscriptSnapshot};
    use serde_json::json;

    use super::TranscriptPrinter;

    fn snapshot(fold: &EventFold) -> TranscriptSnapshot {
        TranscriptSnapshot {
            turns: fold.turns().to_vec(),
            open_turn: fold.open_turn().map(|turn| turn.id),
            connection_lost: None,
            revision: 0,
        }
    }

    #[test]
    fn side_events_print_once_and_text_on_close() {
        let mut fold = EventFold::new();
        let mut printer = TranscriptPrinter::new();

        fold.fold(InboundEvent::text("Answer: "));
        fold.fold(InboundEvent::tool_call("sql", json!({})));
        assert_eq!(printer.render(&snapshot(&fold)), vec!["  [1 #1] tool_call sql"]);
        assert!(printer.render(&snapshot(&fold)).is_empty());

        fold.fold(InboundEvent::text_delta("7"));
        fold.fold(InboundEvent::done());
        assert_eq!(printer.render(&snapshot(&fold)), vec!["agent[1]: Answer: 7"]);
        assert!(printer.render(&snapshot(&fold)).is_empty());
    }

    #[test]
    fn connection_loss_is_announced_once() {
        let mut printer = TranscriptPrinter::new();
        let mut lost = TranscriptSnapshot::default();
        lost.connection_lost = Some("reset".to_string());

        assert_eq!(printer.render(&lost).len(), 1);
        assert!(printer.render(&lost).is_empty());
    }
}
