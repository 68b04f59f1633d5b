//! Job command handler

use anyhow::Result;

use bookmirror_core::Mirror;

use crate::output::Output;

/// Show the current status of a remote job
pub async fn show(mirror: &Mirror, id: String, output: &Output) -> Result<()> {
    let job = mirror
        .jobs()
        .job_status(&id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    output.print_job(&job);
    Ok(())
}
