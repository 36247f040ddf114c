use std::time::Duration;

use stoker_core::{Config, QueueFactory, WorkSpec};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) One factory for the whole process; queues hang off it by category.
    let factory = QueueFactory::new(Config::default());
    let queue = factory
        .get_or_create_queue("default", 2)
        .await
        .expect("fresh category");

    // (B) Submit a couple of units of work: commands plus their arguments.
    let greeter = queue
        .add_task(
            WorkSpec::new("sh").arg("-c").arg("echo hello from stoker"),
            Some("greeter".to_string()),
            None,
        )
        .expect("queue accepts work");
    let doomed = queue
        .add_task(
            WorkSpec::new("sh").arg("-c").arg("echo boom >&2; exit 1"),
            Some("doomed".to_string()),
            Some("always fails, to show failure capture".to_string()),
        )
        .expect("queue accepts work");
    info!(%greeter, %doomed, "submitted");

    // (C) Poll the registry until everything is terminal.
    loop {
        let records = factory.registry().list_all();
        if records.iter().all(|r| r.status.is_terminal()) {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    for record in factory.registry().list_all() {
        println!(
            "{} [{}] -> {:?} result={} error={}",
            record.id,
            record.name,
            record.status,
            record
                .result
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record.error.as_deref().unwrap_or("-"),
        );
    }

    // (D) Orderly teardown: no orphaned worker processes.
    factory.shutdown(true).await;
}
