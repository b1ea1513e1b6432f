use anyhow::Result;
use tracing::info;

use crate::paths;
use crate::queue::RequestQueue;

pub async fn cmd_requeue() -> Result<()> {
    let queue = RequestQueue::new(&paths::base_dir());
    queue.init().await?;
    let moved = queue.requeue_processing().await?;
    info!(target: "queue", count = moved.len(), "requeued interrupted requests");
    for id in moved {
        println!("{}", id);
    }
    Ok(())
}
