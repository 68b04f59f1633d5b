//! Search queue command handlers

use anyhow::{Context, Result};

use bookmirror_core::{Mirror, QueueStatus, SearchRequest};

use crate::output::Output;

/// Queue a search and work through the queue
pub async fn add(mirror: &Mirror, request: SearchRequest, output: &Output) -> Result<()> {
    let id = mirror.search().enqueue(request)?;
    output.progress(&format!("Queued search {}; running queue...", id));

    mirror.search().wait_idle().await;

    let item = mirror
        .search()
        .get(id)
        .with_context(|| format!("Search {} disappeared from the queue", id))?;
    if output.is_quiet() {
        println!("{}", id);
    } else {
        output.print_queue_item(&item);
    }
    Ok(())
}

pub fn list(mirror: &Mirror, output: &Output) -> Result<()> {
    output.print_queue(&mirror.search().items());
    Ok(())
}

pub fn show(mirror: &Mirror, id: u64, output: &Output) -> Result<()> {
    let item = mirror
        .search()
        .get(id)
        .with_context(|| format!("No search with id {}", id))?;
    output.print_queue_item(&item);
    Ok(())
}

pub fn remove(mirror: &Mirror, id: u64, output: &Output) -> Result<()> {
    let item = mirror.search().remove(id)?;
    output.success(&format!("Removed search {} ({})", item.id, item.request.query()));
    Ok(())
}

/// Put a failed search back in the queue and run it
pub async fn retry(mirror: &Mirror, id: u64, output: &Output) -> Result<()> {
    mirror.search().retry(id)?;
    mirror.search().wait_idle().await;

    match mirror.search().get(id) {
        Some(item) if item.status == QueueStatus::Completed => {
            output.success(&format!("Search {} completed", id))
        }
        Some(item) => output.message(&format!(
            "Search {} failed again: {}",
            id,
            item.error_message.as_deref().unwrap_or("unknown error")
        )),
        None => {}
    }
    Ok(())
}

/// Remove completed and failed searches
pub fn clear(mirror: &Mirror, output: &Output) -> Result<()> {
    let removed = mirror.search().clear_finished();
    output.success(&format!("Cleared {} finished search(es)", removed));
    Ok(())
}

/// Run any pending searches left from earlier sessions
pub async fn run(mirror: &Mirror, output: &Output) -> Result<()> {
    let pending = mirror.search().pending_count();
    if pending == 0 {
        output.message("No pending searches.");
        return Ok(());
    }

    output.progress(&format!("Running {} pending search(es)...", pending));
    mirror.search().wait_idle().await;
    output.print_queue(&mirror.search().items());
    Ok(())
}
