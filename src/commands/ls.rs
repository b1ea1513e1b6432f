use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::LsArgs;
use crate::paths::{self, bundle};
use crate::queue::{QueueState, RequestId, RequestQueue};
use crate::scheduler::JobReport;

#[derive(Debug, Serialize, Deserialize)]
struct RequestInfo {
    id: RequestId,
    state: QueueState,
    class: Option<String>,
    recovery: Option<String>,
}

pub async fn cmd_ls(args: LsArgs) -> Result<()> {
    let queue = RequestQueue::new(&paths::base_dir());
    queue.init().await?;

    let states: Vec<QueueState> = match args.state {
        Some(s) => vec![s.into()],
        None => QueueState::ALL.to_vec(),
    };

    let mut infos = Vec::new();
    for state in states {
        for id in queue.list(state).await? {
            let report = read_report(&queue.bundle_dir(&id)).await;
            infos.push(RequestInfo {
                class: report
                    .as_ref()
                    .and_then(|r| r.class)
                    .map(|c| c.as_str().to_string()),
                recovery: report.as_ref().map(|r| format!("{:?}", r.recovery)),
                id,
                state,
            });
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&infos)?;
        println!("{}", json);
    } else {
        println!(
            "{:<24} {:<12} {:<20} {:<12}",
            "REQUEST", "STATE", "CLASS", "RECOVERY"
        );
        println!("{}", "-".repeat(70));
        for info in infos {
            println!(
                "{:<24} {:<12} {:<20} {:<12}",
                info.id.as_str(),
                info.state,
                info.class.as_deref().unwrap_or("-"),
                info.recovery.as_deref().unwrap_or("-"),
            );
        }
    }

    Ok(())
}

/// Job summary of a finished request, if it has one
async fn read_report(dir: &Path) -> Option<JobReport> {
    let json = tokio::fs::read_to_string(dir.join(bundle::RESULT_JSON))
        .await
        .ok()?;
    serde_json::from_str(&json).ok()
}
