//! Interactive chat session over the streaming WebSocket.

use std::io::Write as _;

use anyhow::{Context, Result};
use dochat_core::config::{self, StartupConfig};
use dochat_core::connection::{self, ConnectionState};
use dochat_core::protocol::SearchMethod;
use dochat_core::session::Session;
use dochat_core::session::events::SessionEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

pub struct ChatSettings {
    pub app_url: String,
    pub model_arn: String,
    pub search_method: SearchMethod,
}

pub async fn run(settings: &ChatSettings) -> Result<()> {
    let http = reqwest::Client::new();
    let startup = config::load_startup_config(&http, &settings.app_url)
        .await
        .context("startup configuration unavailable")?;
    debug!(
        websocket_url = %startup.websocket_url,
        cloudfront_domain = %startup.cloudfront_domain,
        "startup config loaded"
    );

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let connection = connection::spawn(startup.websocket_url.clone(), frames_tx);
    let mut state_rx = connection.state_changes();
    let mut session = Session::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Chat endpoint: {}", startup.websocket_url);
    prompt();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                match *state_rx.borrow_and_update() {
                    ConnectionState::Closed | ConnectionState::Error => {
                        session.handle_disconnect();
                        eprintln!("[connection lost, retrying]");
                    }
                    ConnectionState::Open => eprintln!("[connected]"),
                    ConnectionState::Connecting => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let query = line.trim();
                if query.is_empty() {
                    prompt();
                    continue;
                }
                if connection.state() != ConnectionState::Open {
                    eprintln!("[not connected yet, try again shortly]");
                    prompt();
                    continue;
                }
                let frame =
                    session.begin_turn(query, &settings.model_arn, settings.search_method);
                connection.send(frame);
            }
            frame = frames_rx.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                for event in session.handle_frame(frame) {
                    render_event(&event, &session, &startup);
                }
            }
        }
    }

    connection.close();
    Ok(())
}

fn render_event(event: &SessionEvent, session: &Session, startup: &StartupConfig) {
    match event {
        SessionEvent::AssistantDelta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        SessionEvent::TurnCompleted { .. } => {
            println!();
            for (index, source) in session.sources().iter().enumerate() {
                let marker = if index == session.current_source_index() {
                    "*"
                } else {
                    " "
                };
                println!(
                    "  {marker} [{}] {} -> {}",
                    source.id,
                    source.title,
                    startup.resolve_document_url(&source.url)
                );
            }
            prompt();
        }
        SessionEvent::TurnFailed { message } => {
            println!();
            eprintln!("Error: {message}");
            prompt();
        }
        // The pointer is a document-viewer affordance; nothing to print
        // mid-stream.
        SessionEvent::SourceAdded { .. } | SessionEvent::CurrentSourceChanged { .. } => {}
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
