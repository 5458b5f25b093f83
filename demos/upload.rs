//! Example: Upload a local file with progress reporting
//!
//! Usage:
//!   cargo run --example upload -- <LOCAL_FILE> <REMOTE_PATH> [--part-size BYTES]
//!
//! The file goes to an in-memory store; files larger than the part size
//! (5 MiB by default) are sent as a multipart upload.

use std::env;
use std::process;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use objfs::{FsConfig, MemoryStore, ObjectFileSystem, TransferProgress};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str =
    "Usage: cargo run --example upload -- <LOCAL_FILE> <REMOTE_PATH> [--part-size BYTES]";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("OBJFS_LOG").unwrap_or_else(|_| EnvFilter::new("objfs=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();

    let mut positionals = Vec::new();
    let mut config = FsConfig::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--part-size" => {
                let size = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(config.part_size);
                config = config.with_part_size(size);
                i += 2;
            }
            other => {
                positionals.push(other.to_string());
                i += 1;
            }
        }
    }
    if positionals.len() != 2 {
        eprintln!("{}", USAGE);
        process::exit(1);
    }
    let local_file = &positionals[0];
    let remote_path = &positionals[1];

    let store = Arc::new(MemoryStore::new());
    let fs = ObjectFileSystem::with_config(store.clone(), config)?;
    fs.mkdir(remote_path)?;

    let file_size = std::fs::metadata(local_file)?.len();
    let progress_bar = ProgressBar::new(file_size.max(1));
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    let progress_bar_for_cb = progress_bar.clone();
    fs.watch_status(Arc::new(move |progress: &TransferProgress| {
        progress_bar_for_cb.set_position(progress.done.min(file_size));
        progress_bar_for_cb.set_message(progress.label.clone());
        if progress.done >= file_size && !progress_bar_for_cb.is_finished() {
            progress_bar_for_cb.finish_with_message(format!("{} complete", progress.label));
        }
    }));

    println!("Uploading {} to {}...", local_file, remote_path);
    match fs.put(local_file, remote_path) {
        Ok(bytes) => {
            progress_bar.finish_and_clear();
            println!("Upload complete! ({} bytes)", bytes);
            let info = fs.info(remote_path)?;
            println!(
                "Stored: {} ({} bytes, {})",
                info.path,
                info.size,
                info.content_type.as_deref().unwrap_or("unknown type")
            );
            let calls = store.calls();
            println!(
                "Store calls: {} put, {} parts, {} commit",
                calls.put, calls.upload_part, calls.commit
            );
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            process::exit(1);
        }
    }

    Ok(())
}
