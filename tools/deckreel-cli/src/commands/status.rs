//! Show render job records.

use deckreel_common::config::AppConfig;
use deckreel_deck_model::job::RenderJob;
use deckreel_deck_model::store::{FsJobStore, JobStore};

pub async fn run(config: AppConfig, id: Option<uuid::Uuid>) -> anyhow::Result<()> {
    let store = FsJobStore::new(config.jobs_dir());

    if let Some(id) = id {
        let job = store
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No render job with id {id}"))?;
        print_detail(&job);
        return Ok(());
    }

    let jobs = store.list().await?;
    if jobs.is_empty() {
        println!("No render jobs in {}", config.jobs_dir().display());
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{}  {:<9} {:<7} {:>5.1}%  {}  {}",
            job.id,
            job.status.as_str(),
            job.kind.as_str(),
            job.progress_percent,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.deck_id
        );
    }
    Ok(())
}

fn print_detail(job: &RenderJob) {
    println!("Render job: {}", job.id);
    println!("  Deck: {}", job.deck_id);
    println!("  Kind: {}", job.kind);
    println!("  Status: {}", job.status);
    println!("  Progress: {:.1}% ({})", job.progress_percent, job.current_step_label);
    println!("  Created: {}", job.created_at);
    println!("  Updated: {}", job.updated_at);
    if let Some(ref path) = job.output_path {
        println!("  Output: {}", path.display());
    }
    if let Some(size) = job.file_size_bytes {
        println!("  Size: {size} bytes");
    }
    if let Some(ref error) = job.error_message {
        println!("  Error: {error}");
    }
}
