//! Session and event-folding layer for long-running agent tasks.
//!
//! - [`ConnectionManager`] owns the live channel: connect, keepalive,
//!   disconnect. No automatic reconnect.
//! - [`SessionDriver`] is the single consumer that folds inbound events into
//!   turns through [`EventFold`] and publishes [`TranscriptSnapshot`]s.
//! - [`CommandDispatcher`] sends user intents; sends are dropped, never
//!   queued, while the channel is closed.
//! - [`WidgetStore`] keeps pinned artifacts on an append-only grid.
//!
//! The pull-based pipeline ([`JobPoller`](workbench_api::JobPoller)) and the
//! REST collaborators live in the `workbench_api` crate; wire types of the
//! live channel live in `agent_protocol`.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod fold;
pub mod logging;
pub mod session;
pub mod widgets;

pub use crate::config::LinkConfig;
pub use crate::connection::{
    channel_url, ChannelConfig, ChannelState, ConnectionManager, Connector, FrameChannel,
    Session, TungsteniteConnector,
};
pub use crate::dispatch::CommandDispatcher;
pub use crate::error::{ConnectionError, SendStatus};
pub use crate::fold::{EventFold, FoldEffect, Role, SideEvent, Turn, TurnId};
pub use crate::logging::init_logging;
pub use crate::session::{
    session_channel, SessionDriver, SessionHandle, SessionInput, TranscriptSnapshot,
};
pub use crate::widgets::{
    widget_from_event, Layout, LayoutUpdate, NewWidget, Widget, WidgetKind, WidgetStore,
};

pub use agent_protocol::{EventKind, InboundEvent, OutboundFrame};
