//! Sync command handler

use anyhow::{bail, Result};

use bookmirror_core::api::SyncParams;
use bookmirror_core::models::tree_totals;
use bookmirror_core::{
    AppEvent, JobKind, JobStatus, Mirror, MirrorError, PollOutcome, Subscription,
};

use crate::output::{Output, OutputFormat};

/// Issue a sync job and, unless `no_wait`, follow it until it finishes
pub async fn run(
    mirror: &Mirror,
    kind: JobKind,
    book: Option<String>,
    force: bool,
    no_wait: bool,
    output: &Output,
) -> Result<()> {
    let params = SyncParams {
        book_id: book,
        force,
    };

    let job_id = match mirror.jobs().issue(kind, &params).await {
        Ok(id) => id,
        Err(MirrorError::Validation(param)) if param == "book_id" => {
            bail!("{} needs a book. Pass it with --book <id>", kind)
        }
        Err(MirrorError::Validation(param)) => bail!(
            "Missing {}. Set it with:\n  bookmirror config set {} <value>",
            param,
            param
        ),
        Err(e) => bail!(e.user_message()),
    };

    if no_wait {
        match output.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "job_id": job_id })),
            OutputFormat::Quiet => println!("{}", job_id),
            OutputFormat::Human => {
                output.success(&format!("Started {} job {}", kind, job_id));
                println!("Check on it with: bookmirror job {}", job_id);
            }
        }
        return Ok(());
    }

    output.progress(&format!("Started {} job {}; waiting for it to finish...", kind, job_id));

    let mut events = mirror.events().subscribe();
    let mut task = mirror.jobs().poller(job_id.clone());

    let outcome = tokio::select! {
        outcome = task.join() => Some(outcome),
        _ = follow_progress(&mut events, output) => None,
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(outcome) => finish(mirror, &job_id, outcome, output).await,
        None => {
            task.cancel();
            output.message(&format!(
                "Stopped waiting. The job keeps running; check it with: bookmirror job {}",
                job_id
            ));
            Ok(())
        }
    }
}

/// Print progress events; returns only if the bus goes away
async fn follow_progress(events: &mut Subscription, output: &Output) {
    while let Some(event) = events.recv().await {
        if let AppEvent::JobProgress(job) = event {
            output.progress(&format!(
                "  {} {}/{} ({:.0}%)",
                job.status,
                job.completed_items,
                job.total_items,
                job.progress() * 100.0
            ));
        }
    }
}

async fn finish(mirror: &Mirror, job_id: &str, outcome: PollOutcome, output: &Output) -> Result<()> {
    match outcome {
        PollOutcome::Terminal(job) if job.status == JobStatus::Completed => {
            let tree = mirror
                .structure()
                .reload()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let (folders, notes) = tree_totals(&tree);

            match output.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "job": job,
                        "folders": folders,
                        "notes": notes
                    })
                ),
                OutputFormat::Quiet => println!("{}", job.id),
                OutputFormat::Human => {
                    output.success(&format!("Job {} completed", job.id));
                    println!("  Folders: {}, Notes: {}", folders, notes);
                }
            }
            Ok(())
        }
        PollOutcome::Terminal(job) => {
            if output.is_json() {
                crate::output::print_json(&job);
            }
            bail!(
                "Job {} failed: {}",
                job.id,
                job.error_message.as_deref().unwrap_or("no reason given")
            )
        }
        PollOutcome::Exhausted { attempts } | PollOutcome::Cancelled { attempts } => {
            output.message(&format!(
                "Gave up waiting after {} checks. The job may still finish; check it with: bookmirror job {}",
                attempts, job_id
            ));
            Ok(())
        }
    }
}
