//! Run a stats function once.
//!
//! Usage: `quiz-stats <get|save>`
//!
//! Reads a function event (`{"httpMethod": ..., "body": ...}`) as JSON from
//! stdin and writes the function response as JSON to stdout.

use anyhow::{bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::error;

use quizkit_common::{init_logging, LogConfig};
use quizkit_stats::{FunctionEvent, FunctionResponse, StatsConfig, StatsService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LogConfig::from_env()).context("failed to initialize logging")?;

    let endpoint = std::env::args().nth(1).unwrap_or_default();
    if endpoint != "get" && endpoint != "save" {
        bail!("usage: quiz-stats <get|save>");
    }

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read event from stdin")?;
    let event: FunctionEvent =
        serde_json::from_str(&input).context("stdin is not a function event")?;

    let response = match StatsConfig::from_env().and_then(|config| config.connect()) {
        Ok(store) => {
            let service = StatsService::new(store);
            if endpoint == "get" {
                service.get_stats(&event).await
            } else {
                service.save_stats(&event).await
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to open stats store");
            let method = if endpoint == "get" { "GET" } else { "POST" };
            FunctionResponse::internal_error(method, &e.to_string())
        }
    };

    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
