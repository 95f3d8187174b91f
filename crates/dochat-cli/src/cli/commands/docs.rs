//! Document pipeline commands: one-shot listing, live watching, upload.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dochat_core::documents::poller::{PollerEvent, StatusPoller};
use dochat_core::documents::{DocumentRecord, DocumentsClient};
use tokio::sync::mpsc;

pub async fn list(api_url: &str) -> Result<()> {
    let client = DocumentsClient::new(api_url);
    let records = client
        .fetch_status()
        .await
        .context("fetching document status")?;
    print_records(&records);
    Ok(())
}

/// Polls the status endpoint until every document reaches a terminal state
/// or the user interrupts.
pub async fn watch(api_url: &str, interval_ms: u64) -> Result<()> {
    let client = DocumentsClient::new(api_url);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let poller = StatusPoller::new(client, Duration::from_millis(interval_ms), events_tx);
    poller.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    PollerEvent::Documents(records) => print_records(&records),
                    PollerEvent::FetchFailed(message) => {
                        eprintln!("status fetch failed: {message}");
                    }
                    PollerEvent::Halted => {
                        println!("All documents processed.");
                        break;
                    }
                }
            }
        }
    }

    poller.close();
    Ok(())
}

pub async fn upload(api_url: &str, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("no usable file name in {}", path.display()))?;
    let content =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let client = DocumentsClient::new(api_url);
    let receipt = client
        .upload(file_name, &content)
        .await
        .with_context(|| format!("uploading {file_name}"))?;
    println!(
        "Uploaded {} ({}) -> {}",
        receipt.file_name, receipt.status, receipt.document_id
    );
    Ok(())
}

fn print_records(records: &[DocumentRecord]) {
    if records.is_empty() {
        println!("No documents uploaded yet.");
        return;
    }
    println!(
        "{:<32} {:<12} {:<12} {:<12} {:>8}",
        "FILE", "STATUS", "CR INDEX", "KB INDEX", "TOKENS"
    );
    for record in records {
        let (contextual, knowledge) = match record.index_status {
            Some(index) => (
                index.contextual_retrieval.to_string(),
                index.knowledge_base.to_string(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        let tokens = record
            .token_usage
            .map_or(0, |usage| usage.input_tokens + usage.output_tokens);
        println!(
            "{:<32} {:<12} {:<12} {:<12} {:>8}",
            record.file_name,
            record.status.to_string(),
            contextual,
            knowledge,
            tokens
        );
        if let Some(message) = &record.status_message {
            println!("{:<32} {message}", "");
        }
    }
}
