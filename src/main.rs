//! Chronoscope session inspector
//!
//! Run with: cargo run -- <session-dir> [window-secs]
//!
//! With a window size, also prints how many rows each stream has per window.
//!
//! Environment variables:
//! - CHRONOSCOPE_DIR: Session directory when no argument is given
//! - RUST_LOG: Log level (default: chronoscope=info)

use chronoscope::data::Timestamp;
use chronoscope::storage::{read_session, PersistedStream, Replay, SessionSnapshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chronoscope=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let dir = args
        .next()
        .or_else(|| std::env::var("CHRONOSCOPE_DIR").ok())
        .ok_or("usage: chronoscope <session-dir> [window-secs] (or set CHRONOSCOPE_DIR)")?;
    let window = args
        .next()
        .map(|w| w.parse::<f64>())
        .transpose()?
        .map(Timestamp::from_secs_f64);

    tracing::info!("Inspecting session at {}", dir);
    let snapshot = read_session(std::path::Path::new(&dir))?;
    print_session(&snapshot, 0);

    if let Some(size) = window {
        print_windows(&Replay::new(&snapshot, size)?);
    }

    Ok(())
}

fn print_session(snapshot: &SessionSnapshot, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}/", indent, snapshot.dir.display());

    for (name, stream) in &snapshot.entries {
        let range = match stream.time_range() {
            Some((start, end)) => format!("{} .. {}", start, end),
            None => "empty".to_string(),
        };
        println!(
            "{}  {:<24} {:<8} {:>8} rows  {}",
            indent,
            name,
            kind(stream),
            stream.len(),
            range
        );
        if let Some(last) = describe_last(stream) {
            println!("{}    last: {}", indent, last);
        }
    }

    for child in &snapshot.subsessions {
        print_session(child, depth + 1);
    }
}

fn kind(stream: &PersistedStream) -> &'static str {
    match stream {
        PersistedStream::Tabular(_) => "tabular",
        PersistedStream::Image(_) => "image",
    }
}

fn describe_last(stream: &PersistedStream) -> Option<String> {
    match stream {
        PersistedStream::Tabular(s) => s.last().map(|sample| {
            let mut fields: Vec<_> = sample.data.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let fields: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("@{} {{{}}}", sample.timestamp, fields.join(", "))
        }),
        PersistedStream::Image(s) => s.last().map(|sample| {
            let image = sample.data;
            format!(
                "@{} {}x{}x{} frame",
                sample.timestamp,
                image.width(),
                image.height(),
                image.channels()
            )
        }),
    }
}

fn print_windows(replay: &Replay<'_>) {
    println!();
    for chunk in replay.iter() {
        let counts: Vec<String> = chunk
            .samples
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, rows)| format!("{}={}", name, rows.len()))
            .collect();
        println!(
            "[{} .. {})  {}",
            chunk.window.start,
            chunk.window.end,
            counts.join(" ")
        );
    }
}
