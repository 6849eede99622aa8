//! Tracing setup. The terminal belongs to the TUI, so events go to a log file
//! (or nowhere) rather than stderr.
//!
//! - `RUST_LOG` filters, default `kraepelin=info`
//! - `RUST_LOG_FORMAT=json` switches to JSON lines

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "kraepelin=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn json_requested() -> bool {
    std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Installs the global subscriber, appending to `log_path` when it can be opened.
/// Returns whether a log file is in use. Later calls are no-ops.
pub fn init(log_path: Option<&Path>) -> bool {
    let file = log_path.and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    });
    let to_file = file.is_some();

    let writer = match file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::sink),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if json_requested() {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
    to_file
}
