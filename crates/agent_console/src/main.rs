use std::io;
use std::sync::Arc;

use agent_console::app::ConsoleApp;
use agent_console::render::TranscriptPrinter;
use agent_link::{
    init_logging, session_channel, ConnectionManager, Connector, LinkConfig, TungsteniteConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use workbench_api::{WorkbenchApiClient, WorkbenchBackend};

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = LinkConfig::from_env();
    init_logging(config.log_filter.as_deref());

    let client = WorkbenchApiClient::new(config.api_config()).map_err(io::Error::other)?;
    let backend: Arc<dyn WorkbenchBackend> = Arc::new(client);

    let (session, driver) = session_channel();
    let driver = driver.spawn();
    let connector: Arc<dyn Connector> = Arc::new(TungsteniteConnector);
    let connection = Arc::new(ConnectionManager::new(
        connector,
        config.channel_config(),
        session.sender(),
    ));

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = output_rx.recv().await {
            println!("{line}");
        }
    });

    let transcript = tokio::spawn({
        let mut snapshots = session.subscribe();
        let output = output_tx.clone();
        async move {
            let mut printer = TranscriptPrinter::new();
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                for line in printer.render(&snapshot) {
                    if output.send(line).is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut app = ConsoleApp::new(
        backend,
        Arc::clone(&connection),
        session,
        config.pipeline_options(),
        output_tx,
    );
    app.handle_line("/help").await;
    tracing::info!(api = %config.api_url, channel = %config.channel_url, "console ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !app.should_exit {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        app.handle_line(&line).await;
    }

    connection.disconnect().await;
    drop(app);
    drop(connection);
    transcript.abort();
    let _ = driver.await;
    let _ = printer.await;
    Ok(())
}
