use std::sync::Arc;
use std::time::Duration;

use agent_console::app::ConsoleApp;
use agent_link::connection::memory::{MemoryConnector, MemoryPeer};
use agent_link::{
    session_channel, ChannelConfig, ConnectionManager, Connector, SessionHandle, WidgetKind,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use workbench_api::{PipelineOptions, WorkbenchBackend};
use workbench_api_mock::{BackendCall, ScriptedBackend};

struct Console {
    app: ConsoleApp,
    backend: Arc<ScriptedBackend>,
    session: SessionHandle,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
    output: mpsc::UnboundedReceiver<String>,
}

impl Console {
    fn new() -> Self {
        let backend = Arc::new(ScriptedBackend::new().with_data_files(vec!["q3.csv".to_string()]));
        let (connector, peers) = MemoryConnector::new();
        let (session, driver) = session_channel();
        driver.spawn();
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(connector) as Arc<dyn Connector>,
            ChannelConfig::default(),
            session.sender(),
        ));
        let (output_tx, output) = mpsc::unbounded_channel();
        let app = ConsoleApp::new(
            Arc::clone(&backend) as Arc<dyn WorkbenchBackend>,
            connection,
            session.clone(),
            PipelineOptions::default()
                .with_settle_delays(Duration::from_millis(10), Duration::from_millis(10)),
            output_tx,
        );

        Self {
            app,
            backend,
            session,
            peers,
            output,
        }
    }

    fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.output.try_recv() {
            lines.push(line);
        }
        lines
    }

    async fn wait_for_revision(&self, revision: u64) {
        let mut snapshots = self.session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|snapshot| snapshot.revision >= revision),
        )
        .await
        .expect("transcript updated in time")
        .expect("driver alive");
    }
}

#[tokio::test]
async fn messages_before_connect_report_not_connected() {
    let mut console = Console::new();
    console.app.handle_line("hello there").await;
    console.app.handle_line("/code 1 + 1").await;

    assert_eq!(
        console.drain(),
        vec![
            "not connected; use /connect <project>".to_string(),
            "not connected; use /connect <project>".to_string(),
        ]
    );
}

#[tokio::test]
async fn connect_pin_and_disconnect_round_trip() {
    let mut console = Console::new();

    console.app.handle_line("/connect sales").await;
    let peer = console.peers.recv().await.expect("channel opened");
    assert_eq!(peer.address, "ws://127.0.0.1:8000/ws/session-1");
    assert_eq!(console.app.session_id(), Some("session-1"));
    assert_eq!(
        console.drain(),
        vec!["connected to session session-1 (1 data files)".to_string()]
    );

    peer.send_text(r#"{"type":"code","language":"python","content":"df.describe()"}"#);
    peer.send_text(r#"{"type":"done"}"#);
    console.wait_for_revision(2).await;

    console.app.handle_line("/pin 1 1").await;
    let widgets = console.app.widgets().widgets();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].kind, WidgetKind::Code);
    assert_eq!((widgets[0].layout.x, widgets[0].layout.y), (0, 0));

    console.app.handle_line("/pin 1 2").await;
    console.app.handle_line("/unpin not-a-uuid").await;
    let lines = console.drain();
    assert!(lines[0].starts_with("pinned Code widget"));
    assert_eq!(lines[1], "turn 1 has no event #2");
    assert_eq!(lines[2], "no widget not-a-uuid");

    console.app.handle_line("/disconnect").await;
    assert_eq!(
        console.drain(),
        vec!["disconnected from session session-1".to_string()]
    );
    assert!(console
        .backend
        .calls()
        .iter()
        .any(|record| record.call
            == BackendCall::CloseSession {
                session_id: "session-1".to_string()
            }));
}

#[tokio::test(start_paused = true)]
async fn run_streams_pipeline_log_lines() {
    let mut console = Console::new();

    console.app.handle_line("/run sales").await;
    let lines = console.drain();

    assert_eq!(lines.first().map(String::as_str), Some("[pipeline] [analyze] started"));
    assert!(lines.contains(&"[pipeline] [generate_dashboard] finished".to_string()));
    assert!(lines.contains(&"[pipeline] pipeline complete".to_string()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("dashboard 'default' ready with 0 widgets")
    );
}

#[tokio::test]
async fn quit_sets_exit_flag_and_unknown_commands_are_reported() {
    let mut console = Console::new();
    console.app.handle_line("/dance").await;
    console.app.handle_line("/quit").await;

    assert!(console.app.should_exit);
    assert_eq!(
        console.drain(),
        vec!["unknown command /dance; try /help".to_string()]
    );
}
