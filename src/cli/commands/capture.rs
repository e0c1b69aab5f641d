//! Trace ingestion.

use std::io::Read;
use std::path::PathBuf;

use serde_json::json;

use crate::cli::{AppContext, CommandOutput};
use crate::domain::errors::{CoreError, CoreResult};
use crate::services::{parse_trace_payload, CaptureService};

/// Resolve the payload source: file path, then standard input, then the
/// literal argument.
fn read_payload(file: Option<PathBuf>, stdin: bool, data: Option<String>) -> CoreResult<String> {
    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }
    if stdin {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    data.ok_or_else(|| {
        CoreError::validation("payload", "provide --file, --stdin, or --data")
    })
}

pub async fn run(
    root: Option<PathBuf>,
    file: Option<PathBuf>,
    stdin: bool,
    data: Option<String>,
) -> CoreResult<CommandOutput> {
    let raw = read_payload(file, stdin, data)?;
    let input = parse_trace_payload(&raw)?;

    let ctx = AppContext::open(root).await?;
    let report = CaptureService::new(ctx.repo.clone()).capture(input).await;
    ctx.teardown().await;
    let report = report?;

    let human = if report.created {
        format!("captured trace {}", &report.trace_id[..8])
    } else {
        format!("trace {} already captured", &report.trace_id[..8])
    };
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}
