//! Example: Sync one prefix into another and move it
//!
//! Usage:
//!   cargo run --example sync -- [--workers N]

use std::env;
use std::sync::Arc;

use objfs::{FsConfig, MemoryStore, ObjectFileSystem, TransferProgress};
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("OBJFS_LOG").unwrap_or_else(|_| EnvFilter::new("objfs=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args: Vec<String> = env::args().collect();
    let workers = args
        .iter()
        .position(|a| a == "--workers")
        .and_then(|i| args.get(i + 1))
        .and_then(|n| n.parse().ok())
        .unwrap_or(4);

    let store = Arc::new(MemoryStore::new().with_bucket("backup", "demo"));
    for day in 1..=20 {
        store.insert(
            "ingest",
            "demo",
            &format!("logs/2024-03-{:02}.log", day),
            format!("entries for day {}\n", day),
        );
    }

    let config = FsConfig::default().with_workers(workers);
    let fs = ObjectFileSystem::with_config(store.clone(), config)?;
    fs.watch_status(Arc::new(|p: &TransferProgress| {
        if p.is_complete() {
            println!("  {} done ({} keys)", p.label, p.total);
        }
    }));

    println!("First sync:");
    let first = fs.sync("ingest@demo/logs", "backup@demo/logs", true)?;
    println!("  copied {}, failed {}", first.succeeded.len(), first.failed.len());

    fs.pipe("ingest@demo/logs/2024-03-05.log", b"rewritten\n")?;
    println!("Second sync after one change:");
    let second = fs.sync("ingest@demo/logs", "backup@demo/logs", true)?;
    for path in &second.succeeded {
        println!("  copied {}", path);
    }

    println!("Moving backup@demo/logs to backup@demo/2024-03:");
    fs.mv("backup@demo/logs", "backup@demo/2024-03")?;
    println!("  {} files", fs.find("backup@demo/2024-03", false, false)?.len());
    println!("  old prefix exists: {}", fs.exists("backup@demo/logs")?);

    let calls = store.calls();
    println!(
        "Store calls: {} list, {} copy, {} delete batches",
        calls.list, calls.copy, calls.delete_objects
    );
    Ok(())
}
