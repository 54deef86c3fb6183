//! Render a deck to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use deckreel_common::clock::Stopwatch;
use deckreel_common::config::AppConfig;
use deckreel_deck_model::job::RenderStatus;
use deckreel_deck_model::store::FsJobStore;
use deckreel_render_jobs::{RenderCoordinator, RenderEvent};
use tokio::sync::broadcast::error::RecvError;

use super::DeckSource;

pub async fn run(
    mut config: AppConfig,
    deck: String,
    kind: String,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let source = DeckSource::resolve(&config, &deck).await?;
    config.media_root = source.media_root.clone();
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }

    let jobs = Arc::new(FsJobStore::new(config.jobs_dir()));
    let coordinator = RenderCoordinator::from_config(&config, Arc::clone(&source.store), jobs);

    let ticket = coordinator
        .start_render(&source.deck_id, &kind)
        .await
        .map_err(|e| anyhow::anyhow!("Render rejected: {e}"))?;
    println!("Rendering deck {} ({kind})", source.deck_id);
    println!("  Job: {}", ticket.id);

    let stopwatch = Stopwatch::start();
    let mut events = coordinator.subscribe(ticket.id);
    // A job that finished before the subscription will publish nothing more.
    // Transitions land before their terminal event, so checking after
    // subscribing cannot miss one.
    let status = coordinator.job(ticket.id).await?.map(|job| job.status);
    if !follows_events(status) {
        events = None;
    }
    if let Some(mut events) = events {
        let mut cancel_sent = false;
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                    signal?;
                    cancel_sent = true;
                    println!("\n  Canceling...");
                    coordinator.cancel_render(ticket.id).await;
                }
                event = events.recv() => match event {
                    Ok(RenderEvent::Progress { percent, message, .. }) => {
                        print!("\r  Progress: {percent:5.1}% {message:<40}");
                        std::io::stdout().flush().ok();
                    }
                    Ok(_) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Progress display fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        println!();
    }

    let job = coordinator
        .wait(ticket.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job record {} disappeared", ticket.id))?;

    match job.status {
        RenderStatus::Succeeded => {
            let size_mb = job.file_size_bytes.unwrap_or(0) as f64 / (1024.0 * 1024.0);
            println!(
                "Render complete in {:.1}s: {} ({size_mb:.2} MB)",
                stopwatch.elapsed_secs(),
                job.output_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            );
            Ok(())
        }
        RenderStatus::Canceled => {
            println!("Render canceled.");
            Ok(())
        }
        status => Err(anyhow::anyhow!(
            "Render {status}: {}",
            job.error_message.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}

/// Whether a job in `status` still has events to wait for.
fn follows_events(status: Option<RenderStatus>) -> bool {
    status.is_some_and(|status| !status.is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follows_only_unfinished_jobs() {
        assert!(follows_events(Some(RenderStatus::Queued)));
        assert!(follows_events(Some(RenderStatus::Running)));
        assert!(!follows_events(Some(RenderStatus::Succeeded)));
        assert!(!follows_events(Some(RenderStatus::Failed)));
        assert!(!follows_events(Some(RenderStatus::Canceled)));
        assert!(!follows_events(None));
    }
}
