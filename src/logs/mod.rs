// Logs module - Per-tenant log capture and tail reading

mod reader;
mod sink;

pub use reader::{extract_setup_url, find_setup_url, read_last_lines, tail_text};
pub use sink::{log_path, TenantLogSink, MARKER_PREFIX};
