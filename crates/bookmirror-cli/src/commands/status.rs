//! Status command handler

use anyhow::Result;

use bookmirror_core::{Config, Mirror, QueueStatus};

use crate::output::{Output, OutputFormat};

/// Show configuration summary and local queue state
///
/// Makes no network calls.
pub fn show(config: Config, output: &Output) -> Result<()> {
    let mirror = Mirror::open(config.clone()).ok();
    let items = mirror
        .as_ref()
        .map(|m| m.search().items())
        .unwrap_or_default();
    let count = |status: QueueStatus| items.iter().filter(|i| i.status == status).count();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "backend": config.backend,
                    "authenticated": config.access_token.is_some(),
                    "data_dir": config.data_dir,
                    "queue": {
                        "pending": count(QueueStatus::Pending),
                        "completed": count(QueueStatus::Completed),
                        "error": count(QueueStatus::Error)
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", count(QueueStatus::Pending));
        }
        OutputFormat::Human => {
            println!("bookmirror Status");
            println!("=================");
            println!();
            println!("Remote:");
            println!(
                "  API:     {}",
                config.api_url.as_deref().unwrap_or("(not set)")
            );
            println!("  Backend: {}", config.backend);
            println!(
                "  Token:   {}",
                if config.access_token.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Search queue:");
            println!("  Pending:   {}", count(QueueStatus::Pending));
            println!("  Completed: {}", count(QueueStatus::Completed));
            println!("  Failed:    {}", count(QueueStatus::Error));
            if mirror.is_none() {
                println!();
                println!("Set the API URL to get started:");
                println!("  bookmirror config set api_url https://your-server");
            }
        }
    }

    Ok(())
}
