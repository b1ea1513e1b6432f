use anyhow::Result;
use tracing::info;

use crate::paths;
use crate::queue::RequestQueue;

pub async fn cmd_submit() -> Result<()> {
    let queue = RequestQueue::new(&paths::base_dir());
    queue.init().await?;
    let id = queue.submit().await?;
    info!(target: "queue", request = %id, "request queued");
    println!("{}", id);
    Ok(())
}
