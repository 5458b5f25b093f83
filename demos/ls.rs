//! Example: List a directory of an in-memory store
//!
//! Usage:
//!   cargo run --example ls -- [PATH] [--recursive] [--glob PATTERN]
//!
//! Set `OBJFS_LOG=objfs=debug` to see store calls and cache hits.

use std::env;
use std::sync::Arc;

use objfs::{MemoryStore, ObjectFileSystem};
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("OBJFS_LOG").unwrap_or_else(|_| EnvFilter::new("objfs=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn sample_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (key, data) in [
        ("raw/2024/01/events.json", "{\"n\":1}\n{\"n\":2}\n"),
        ("raw/2024/02/events.json", "{\"n\":3}\n"),
        ("raw/empty/", ""),
        ("curated/summary.csv", "month,events\n01,2\n02,1\n"),
        ("README.md", "# sample bucket\n"),
    ] {
        store.insert("analytics", "demo", key, data);
    }
    store.insert("archive", "demo", "old.tar", vec![0u8; 3 * 1024 * 1024]);
    Arc::new(store)
}

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().collect();

    let mut path = "analytics@demo".to_string();
    let mut recursive = false;
    let mut pattern = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--recursive" | "-r" => {
                recursive = true;
                i += 1;
            }
            "--glob" | "-g" => {
                pattern = args.get(i + 1).cloned();
                i += 2;
            }
            other => {
                path = other.to_string();
                i += 1;
            }
        }
    }

    let fs = ObjectFileSystem::new(sample_store());

    if let Some(pattern) = pattern {
        println!("\n🔎 Glob: {}\n", pattern);
        match fs.glob(&pattern) {
            Ok(paths) if paths.is_empty() => println!("  (no match)"),
            Ok(paths) => paths.iter().for_each(|p| println!("  {}", p)),
            Err(e) => eprintln!("❌ Glob failed: {}", e),
        }
        return;
    }

    println!("\n📁 Listing: {}\n", path);
    let listed = if recursive {
        fs.find(&path, true, false)
    } else {
        fs.ls(&path, false)
    };

    match listed {
        Ok(entries) if entries.is_empty() => println!("  (empty)"),
        Ok(entries) => {
            for entry in entries {
                let type_icon = if entry.is_file() { "📄" } else { "📁" };
                let size_str = if entry.is_file() {
                    format_size(entry.size)
                } else {
                    String::new()
                };
                println!("  {} {} {}", type_icon, entry.path, size_str);
            }
        }
        Err(e) => eprintln!("❌ Failed to list: {}", e),
    }

    if let Ok(total) = fs.du(&path) {
        println!("\n📊 Total: {}", format_size(total));
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2}GB", bytes as f64 / 1_073_741_824.0)
    }
}
