//! Index statistics.
//!
//! Used by `docent stats` to show what has been ingested: index file size
//! and, per collection, chunk and source counts with the time of the most
//! recent ingest.

use anyhow::Result;

use crate::config::Config;
use crate::index::{CollectionStats, SqliteIndex};

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let stats = index.collection_stats().await?;
    index.close().await;

    let file_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!("{}", render_stats(&config.index.path.display().to_string(), file_size, &stats));
    Ok(())
}

fn render_stats(path: &str, file_size: u64, stats: &[CollectionStats]) -> String {
    let total: i64 = stats.iter().map(|s| s.chunks).sum();
    let mut out = String::new();

    out.push_str("Docent Index Stats\n");
    out.push_str("==================\n\n");
    out.push_str(&format!("  Index:       {}\n", path));
    out.push_str(&format!("  Size:        {}\n", format_bytes(file_size)));
    out.push_str(&format!("  Chunks:      {}\n", total));

    if !stats.is_empty() {
        out.push_str("\n  By collection:\n");
        out.push_str(&format!(
            "  {:<24} {:>8} {:>8}   {}\n",
            "COLLECTION", "CHUNKS", "SOURCES", "LAST INGEST"
        ));
        out.push_str(&format!("  {}\n", "-".repeat(66)));
        for s in stats {
            let last = match s.last_ingested {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            out.push_str(&format!(
                "  {:<24} {:>8} {:>8}   {}\n",
                s.collection, s.chunks, s.sources, last
            ));
        }
    }

    out.push('\n');
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
