use std::sync::Arc;

use agent_link::{
    widget_from_event, CommandDispatcher, ConnectionManager, LayoutUpdate, SendStatus,
    SessionHandle, WidgetStore,
};
use tokio::sync::mpsc;
use uuid::Uuid;
use workbench_api::{JobPoller, PipelineOptions, PipelineRun, WorkbenchBackend};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};

const NOT_CONNECTED: &str = "not connected; use /connect <project>";

/// Headless client state: one live session, a widget board, and on-demand
/// pipeline runs. Output lines go to `output`.
pub struct ConsoleApp {
    backend: Arc<dyn WorkbenchBackend>,
    connection: Arc<ConnectionManager>,
    dispatcher: CommandDispatcher,
    session: SessionHandle,
    widgets: WidgetStore,
    pipeline: PipelineOptions,
    session_id: Option<String>,
    output: mpsc::UnboundedSender<String>,
    pub should_exit: bool,
}

impl ConsoleApp {
    pub fn new(
        backend: Arc<dyn WorkbenchBackend>,
        connection: Arc<ConnectionManager>,
        session: SessionHandle,
        pipeline: PipelineOptions,
        output: mpsc::UnboundedSender<String>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::clone(&connection), session.sender());
        Self {
            backend,
            connection,
            dispatcher,
            session,
            widgets: WidgetStore::new(),
            pipeline,
            session_id: None,
            output,
            should_exit: false,
        }
    }

    pub fn widgets(&self) -> &WidgetStore {
        &self.widgets
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub async fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let Some(command) = parse_slash_command(line) else {
            match self.dispatcher.send_message(line) {
                SendStatus::Sent => {}
                SendStatus::NotConnected => self.print(NOT_CONNECTED),
                SendStatus::Rejected => self.print("message could not be encoded"),
            }
            return;
        };

        match command {
            SlashCommand::Connect { project } => self.connect(&project).await,
            SlashCommand::Disconnect => self.disconnect().await,
            SlashCommand::Code { source } => {
                if !self.dispatcher.send_code(source).is_sent() {
                    self.print(NOT_CONNECTED);
                }
            }
            SlashCommand::Resize { rows, cols } => {
                if !self.dispatcher.send_resize(rows, cols).is_sent() {
                    self.print(NOT_CONNECTED);
                }
            }
            SlashCommand::Run { project } => self.run_pipeline(&project).await,
            SlashCommand::Pin { turn, event } => self.pin(turn, event),
            SlashCommand::Unpin { id } => self.unpin(&id),
            SlashCommand::Widgets => self.list_widgets(),
            SlashCommand::Help => self.print(HELP_TEXT),
            SlashCommand::Quit => {
                self.disconnect().await;
                self.should_exit = true;
            }
            SlashCommand::Usage(usage) => self.print(format!("usage: {usage}")),
            SlashCommand::Unknown(command) => {
                self.print(format!("unknown command {command}; try /help"))
            }
        }
    }

    /// Applies externally computed placements to pinned widgets.
    pub fn relayout(&mut self, layouts: &[LayoutUpdate]) -> usize {
        self.widgets.relayout(layouts)
    }

    async fn connect(&mut self, project: &str) {
        if self.session_id.is_some() {
            self.disconnect().await;
        }

        let info = match self.backend.create_session(project).await {
            Ok(info) => info,
            Err(error) => {
                self.print(format!("could not create session: {error}"));
                return;
            }
        };

        match self.connection.connect(&info.session_id).await {
            Ok(()) => {
                self.print(format!(
                    "connected to session {} ({} data files)",
                    info.session_id,
                    info.data_files.len()
                ));
                self.session_id = Some(info.session_id);
            }
            Err(error) => {
                self.print(format!("connection failed: {error}"));
                if let Err(error) = self.backend.close_session(&info.session_id).await {
                    tracing::warn!(%error, "failed to close session after connect failure");
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        match self.backend.close_session(&session_id).await {
            Ok(()) => self.print(format!("disconnected from session {session_id}")),
            Err(error) => self.print(format!(
                "disconnected; closing session {session_id} failed: {error}"
            )),
        }
    }

    async fn run_pipeline(&mut self, project: &str) {
        let poller = JobPoller::with_options(Arc::clone(&self.backend), self.pipeline.clone());
        let output = self.output.clone();
        let mut printed = 0;
        let mut observer = |run: &PipelineRun| {
            for line in &run.log[printed..] {
                let _ = output.send(format!("[pipeline] {line}"));
            }
            printed = run.log.len();
        };

        match poller.run_pipeline_observed(project, &mut observer).await {
            Ok(report) => self.print(format!(
                "dashboard '{}' ready with {} widgets",
                report.dashboard.id,
                report.dashboard.widgets.len()
            )),
            Err(error) => self.print(format!("pipeline failed at {}: {error}", error.label())),
        }
    }

    fn pin(&mut self, turn_id: u64, event_number: usize) {
        let snapshot = self.session.snapshot();
        let Some(turn) = snapshot.turn(turn_id) else {
            self.print(format!("no turn {turn_id}"));
            return;
        };
        let Some(side) = event_number
            .checked_sub(1)
            .and_then(|index| turn.side_events.get(index))
        else {
            self.print(format!("turn {turn_id} has no event #{event_number}"));
            return;
        };
        let Some(widget) = widget_from_event(&side.event) else {
            self.print(format!(
                "{} events cannot be pinned",
                side.event.kind.as_str()
            ));
            return;
        };

        let pinned = self.widgets.pin(widget);
        let line = format!(
            "pinned {:?} widget {} at ({}, {})",
            pinned.kind, pinned.id, pinned.layout.x, pinned.layout.y
        );
        self.print(line);
    }

    fn unpin(&mut self, id: &str) {
        let removed = Uuid::parse_str(id)
            .ok()
            .and_then(|id| self.widgets.remove(id));
        match removed {
            Some(widget) => self.print(format!("unpinned {}", widget.id)),
            None => self.print(format!("no widget {id}")),
        }
    }

    fn list_widgets(&self) {
        if self.widgets.is_empty() {
            self.print("no pinned widgets");
            return;
        }
        for widget in self.widgets.widgets() {
            self.print(format!(
                "{} {:?} at ({}, {}) {}x{}",
                widget.id,
                widget.kind,
                widget.layout.x,
                widget.layout.y,
                widget.layout.w,
                widget.layout.h
            ));
        }
    }

    fn print(&self, line: impl Into<String>) {
        let _ = self.output.send(line.into());
    }
}
