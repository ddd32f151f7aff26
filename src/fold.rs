//! Folds the live channel's inbound events into an ordered list of turns.
//!
//! The fold is the single writer of transcript state. At most one turn is
//! open at a time; it is created lazily by the first relevant event and
//! closed only by `done`.

use agent_protocol::{parse_inbound_frame, EventKind, InboundEvent};
use serde::Serialize;
use time::OffsetDateTime;

pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A side event together with the text position it arrived at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideEvent {
    /// Length in bytes of the turn's text buffer when the event arrived.
    pub text_offset: usize,
    pub event: InboundEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub text: String,
    pub side_events: Vec<SideEvent>,
    pub is_open: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Turn {
    fn new(id: TurnId, role: Role, is_open: bool) -> Self {
        Self {
            id,
            role,
            text: String::new(),
            side_events: Vec::new(),
            is_open,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Side events in arrival order, without their offsets.
    pub fn events(&self) -> impl Iterator<Item = &InboundEvent> {
        self.side_events.iter().map(|side| &side.event)
    }
}

/// What a single fold did to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldEffect {
    /// `done` arrived; carries the turn it closed, if one was open.
    Closed(Option<TurnId>),
    /// `pong`; nothing changed.
    Ignored,
    AppendedText(TurnId),
    AppendedSideEvent(TurnId),
}

#[derive(Debug, Default)]
pub struct EventFold {
    turns: Vec<Turn>,
    open: Option<usize>,
    next_id: TurnId,
}

impl EventFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, event: InboundEvent) -> FoldEffect {
        match event.kind {
            EventKind::Done => {
                let closed = self.open.take().map(|index| {
                    let turn = &mut self.turns[index];
                    turn.is_open = false;
                    turn.id
                });
                FoldEffect::Closed(closed)
            }
            EventKind::Pong => FoldEffect::Ignored,
            kind => {
                let index = self.ensure_open_turn();
                let turn = &mut self.turns[index];
                if kind.is_text() {
                    turn.text.push_str(event.content_or_empty());
                    FoldEffect::AppendedText(turn.id)
                } else {
                    turn.side_events.push(SideEvent {
                        text_offset: turn.text.len(),
                        event,
                    });
                    FoldEffect::AppendedSideEvent(turn.id)
                }
            }
        }
    }

    /// Parses and folds one raw frame. Malformed frames are logged and
    /// dropped; `None` means nothing was folded.
    pub fn fold_frame(&mut self, raw: &str) -> Option<FoldEffect> {
        match parse_inbound_frame(raw) {
            Ok(event) => Some(self.fold(event)),
            Err(error) => {
                tracing::warn!(%error, "dropping malformed frame");
                None
            }
        }
    }

    /// Appends a closed user turn. The open assistant turn, if any, stays open.
    pub fn push_user_turn(&mut self, text: impl Into<String>) -> TurnId {
        let id = self.allocate_id();
        let mut turn = Turn::new(id, Role::User, false);
        turn.text = text.into();
        self.turns.push(turn);
        id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn open_turn(&self) -> Option<&Turn> {
        self.open.map(|index| &self.turns[index])
    }

    /// Drops every turn. Identifiers keep increasing across clears.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.open = None;
    }

    fn ensure_open_turn(&mut self) -> usize {
        if let Some(index) = self.open {
            return index;
        }
        let id = self.allocate_id();
        self.turns.push(Turn::new(id, Role::Assistant, true));
        let index = self.turns.len() - 1;
        self.open = Some(index);
        index
    }

    fn allocate_id(&mut self) -> TurnId {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use agent_protocol::{EventKind, InboundEvent};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{EventFold, FoldEffect, Role};

    #[test]
    fn deltas_concatenate_and_done_closes() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::text_delta("a"));
        fold.fold(InboundEvent::text_delta("b"));
        let effect = fold.fold(InboundEvent::done());

        assert_eq!(fold.turns().len(), 1);
        assert_eq!(fold.turns()[0].text, "ab");
        assert!(!fold.turns()[0].is_open);
        assert_eq!(effect, FoldEffect::Closed(Some(fold.turns()[0].id)));
        assert!(fold.open_turn().is_none());
    }

    #[test]
    fn tool_call_keeps_relative_position() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::text("before "));
        fold.fold(InboundEvent::tool_call("sql", json!({"query": "select 1"})));
        fold.fold(InboundEvent::text("after"));

        let turn = fold.open_turn().expect("turn stays open");
        assert_eq!(turn.text, "before after");
        assert_eq!(turn.side_events.len(), 1);
        assert_eq!(turn.side_events[0].text_offset, "before ".len());
        assert_eq!(turn.side_events[0].event.kind, EventKind::ToolCall);
    }

    #[test]
    fn pong_is_ignored_entirely() {
        let mut fold = EventFold::new();
        assert_eq!(fold.fold(InboundEvent::pong()), FoldEffect::Ignored);
        assert!(fold.turns().is_empty());

        fold.fold(InboundEvent::text("x"));
        fold.fold(InboundEvent::pong());
        assert!(fold.turns()[0].side_events.is_empty());
    }

    #[test]
    fn done_without_open_turn_is_a_no_op() {
        let mut fold = EventFold::new();
        assert_eq!(fold.fold(InboundEvent::done()), FoldEffect::Closed(None));
        assert!(fold.turns().is_empty());
    }

    #[test]
    fn text_after_done_opens_a_new_turn() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::text("one"));
        fold.fold(InboundEvent::done());
        fold.fold(InboundEvent::text("two"));

        assert_eq!(fold.turns().len(), 2);
        assert!(!fold.turns()[0].is_open);
        assert!(fold.turns()[1].is_open);
        assert_eq!(fold.turns()[1].role, Role::Assistant);
        assert_ne!(fold.turns()[0].id, fold.turns()[1].id);
    }

    #[test]
    fn result_appends_and_missing_content_appends_nothing() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::new(EventKind::Result).with_content("42"));
        fold.fold(InboundEvent::new(EventKind::Text));
        assert_eq!(fold.open_turn().map(|turn| turn.text.as_str()), Some("42"));
    }

    #[test]
    fn side_events_are_not_deduplicated() {
        let mut fold = EventFold::new();
        let thinking = InboundEvent::new(EventKind::Thinking).with_content("hmm");
        fold.fold(thinking.clone());
        fold.fold(thinking.clone());

        let turn = fold.open_turn().expect("open turn");
        assert_eq!(turn.events().cloned().collect::<Vec<_>>(), vec![thinking.clone(), thinking]);
        assert!(turn.text.is_empty());
    }

    #[test]
    fn malformed_frame_is_dropped_without_side_effects() {
        let mut fold = EventFold::new();
        assert_eq!(fold.fold_frame("{not json"), None);
        assert_eq!(fold.fold_frame(r#"{"type":"mystery"}"#), None);
        assert!(fold.turns().is_empty());

        assert_eq!(
            fold.fold_frame(r#"{"type":"text","content":"ok"}"#),
            Some(FoldEffect::AppendedText(1))
        );
    }

    #[test]
    fn user_turn_does_not_touch_open_assistant_turn() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::text("partial"));
        let user = fold.push_user_turn("hello");
        fold.fold(InboundEvent::text(" reply"));

        let user_turn = fold.turn(user).expect("user turn");
        assert_eq!(user_turn.role, Role::User);
        assert!(!user_turn.is_open);

        let open = fold.open_turn().expect("assistant still open");
        assert_eq!(open.text, "partial reply");
        assert_eq!(fold.turns().len(), 2);
    }

    #[test]
    fn clear_resets_turns_but_not_ids() {
        let mut fold = EventFold::new();
        fold.fold(InboundEvent::text("a"));
        fold.clear();
        assert!(fold.turns().is_empty());
        assert!(fold.open_turn().is_none());

        fold.fold(InboundEvent::text("b"));
        assert_eq!(fold.turns()[0].id, 2);
    }
}
