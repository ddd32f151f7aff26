//! Pinned artifacts with append-only grid placement.
//!
//! The grid is 12 columns wide and holds three 4×3 widgets per row. A new
//! widget's slot depends only on how many widgets were ever pinned, so
//! removing one never moves the others.

use agent_protocol::{EventKind, InboundEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const GRID_COLUMNS: u32 = 12;
pub const SLOT_WIDTH: u32 = 4;
pub const SLOT_HEIGHT: u32 = 3;
const SLOTS_PER_ROW: u32 = GRID_COLUMNS / SLOT_WIDTH;
const ROW_STRIDE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Code,
    Chart,
    Diagram,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Layout {
    /// Slot for the `count`-th pinned widget (0-based).
    pub fn slot(count: u32) -> Self {
        Self {
            x: (count * SLOT_WIDTH) % GRID_COLUMNS,
            y: (count / SLOTS_PER_ROW) * ROW_STRIDE,
            w: SLOT_WIDTH,
            h: SLOT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: Uuid,
    pub kind: WidgetKind,
    pub payload: Value,
    pub layout: Layout,
}

/// A widget before the store assigns its identity and slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWidget {
    pub kind: WidgetKind,
    pub payload: Value,
}

impl NewWidget {
    pub fn new(kind: WidgetKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

/// Externally supplied placement for one widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutUpdate {
    pub id: Uuid,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Default)]
pub struct WidgetStore {
    widgets: Vec<Widget>,
    pinned_total: u32,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&mut self, widget: NewWidget) -> &Widget {
        let layout = Layout::slot(self.pinned_total);
        self.pinned_total += 1;
        self.widgets.push(Widget {
            id: Uuid::new_v4(),
            kind: widget.kind,
            payload: widget.payload,
            layout,
        });
        tracing::debug!(kind = ?widget.kind, x = layout.x, y = layout.y, "widget pinned");
        &self.widgets[self.widgets.len() - 1]
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Widget> {
        let index = self.widgets.iter().position(|widget| widget.id == id)?;
        Some(self.widgets.remove(index))
    }

    /// Applies placements to matching widgets and returns how many matched.
    /// Unknown ids are ignored.
    pub fn relayout(&mut self, layouts: &[LayoutUpdate]) -> usize {
        let mut applied = 0;
        for update in layouts {
            if let Some(widget) = self.widgets.iter_mut().find(|widget| widget.id == update.id) {
                widget.layout = Layout {
                    x: update.x,
                    y: update.y,
                    w: update.w,
                    h: update.h,
                };
                applied += 1;
            }
        }
        applied
    }

    pub fn get(&self, id: Uuid) -> Option<&Widget> {
        self.widgets.iter().find(|widget| widget.id == id)
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}

/// Derives a pinnable widget from a `code`, `chart` or `table` side event.
///
/// Charts whose data declares a `mermaid` or `diagram` type become diagrams.
pub fn widget_from_event(event: &InboundEvent) -> Option<NewWidget> {
    match event.kind {
        EventKind::Code => Some(NewWidget::new(
            WidgetKind::Code,
            json!({
                "language": event.language.clone().unwrap_or_else(|| "text".to_string()),
                "code": event.content_or_empty(),
            }),
        )),
        EventKind::Chart => {
            let data = event.data.clone().unwrap_or(Value::Null);
            let kind = if is_diagram(&data) {
                WidgetKind::Diagram
            } else {
                WidgetKind::Chart
            };
            Some(NewWidget::new(kind, data))
        }
        EventKind::Table => Some(NewWidget::new(
            WidgetKind::Table,
            event.data.clone().unwrap_or(Value::Null),
        )),
        _ => None,
    }
}

fn is_diagram(data: &Value) -> bool {
    data.get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| matches!(kind, "mermaid" | "diagram"))
}
