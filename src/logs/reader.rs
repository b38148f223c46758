use crate::error::{FleetError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Path fragment of the backend's first-run installer link
const SETUP_LINK_MARKER: &str = "/_/#/pbinstal/";

/// Read the last N lines from a log file
///
/// A missing file reads as empty. Bytes that are not UTF-8 are replaced
/// rather than failing the read.
pub async fn read_last_lines(file_path: &Path, lines: usize) -> Result<Vec<String>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(file_path)
        .await
        .map_err(|e| FleetError::LogError(format!("Failed to open log file: {}", e)))?;

    let mut reader = BufReader::new(file);
    let mut all_lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| FleetError::LogError(format!("Failed to read log line: {}", e)))?;
        if read == 0 {
            break;
        }
        all_lines.push(decode_line(&buf));
    }

    let start_index = all_lines.len().saturating_sub(lines);
    Ok(all_lines.split_off(start_index))
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Last N lines joined for diagnostics; read errors yield `None`
pub async fn tail_text(file_path: &Path, lines: usize) -> Option<String> {
    match read_last_lines(file_path, lines).await {
        Ok(tail) if !tail.is_empty() => Some(tail.join("\n")),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(path = %file_path.display(), error = %e, "Could not read log tail");
            None
        }
    }
}

/// Find the backend's setup link in `text` and rewrite it onto the public host.
///
/// The token runs from the marker to the next whitespace.
pub fn extract_setup_url(text: &str, subdomain: &str, domain: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let idx = line.find(SETUP_LINK_MARKER)?;
        let rest = &line[idx + SETUP_LINK_MARKER.len()..];
        let token = rest.split_whitespace().next().unwrap_or("");
        Some(format!(
            "http://{}.{}{}{}",
            subdomain, domain, SETUP_LINK_MARKER, token
        ))
    })
}

/// Scan a tenant's log file for the setup link (best effort)
pub async fn find_setup_url(file_path: &Path, subdomain: &str, domain: &str) -> Option<String> {
    match tokio::fs::read(file_path).await {
        Ok(bytes) => extract_setup_url(&String::from_utf8_lossy(&bytes), subdomain, domain),
        Err(e) => {
            tracing::debug!(path = %file_path.display(), error = %e, "Setup link scan skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_last_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.log");
        let contents: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        tokio::fs::write(&path, contents).await.unwrap();

        let tail = read_last_lines(&path, 3).await.unwrap();
        assert_eq!(tail, vec!["line 28", "line 29", "line 30"]);

        let all = read_last_lines(&path, 100).await.unwrap();
        assert_eq!(all.len(), 30);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.log");

        assert!(read_last_lines(&path, 10).await.unwrap().is_empty());
        assert!(tail_text(&path, 10).await.is_none());
    }

    #[tokio::test]
    async fn test_tail_text_joins_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.log");
        tokio::fs::write(&path, "a\nb\nc\n").await.unwrap();

        assert_eq!(tail_text(&path, 2).await.as_deref(), Some("b\nc"));
    }

    #[test]
    fn test_extract_setup_url() {
        let log = "\
[fleetd] Starting tenant acme
2024/01/01 Server started at http://127.0.0.1:8084
(!) Launch the URL below in the browser:
http://127.0.0.1:8084/_/#/pbinstal/eyJhbGciOiJIUzI1NiJ9.abc  (expires in 1h)
";
        assert_eq!(
            extract_setup_url(log, "acme", "localhost.direct").as_deref(),
            Some("http://acme.localhost.direct/_/#/pbinstal/eyJhbGciOiJIUzI1NiJ9.abc")
        );
    }

    #[test]
    fn test_extract_setup_url_absent() {
        assert!(extract_setup_url("no link here\n", "acme", "example.com").is_none());
    }

    #[tokio::test]
    async fn test_tail_survives_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.log");
        tokio::fs::write(&path, b"[fleetd] Starting\n\xff\xfe garbage\r\nfatal: bind failed\n")
            .await
            .unwrap();

        let tail = read_last_lines(&path, 10).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[1], "\u{FFFD}\u{FFFD} garbage");
        assert_eq!(tail[2], "fatal: bind failed");

        let text = tail_text(&path, 2).await.unwrap();
        assert!(text.ends_with("fatal: bind failed"));
    }

    #[tokio::test]
    async fn test_find_setup_url_after_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("acme.log");
        tokio::fs::write(&path, b"\xff boot\nhttp://127.0.0.1:8084/_/#/pbinstal/tok3n\n")
            .await
            .unwrap();

        assert_eq!(
            find_setup_url(&path, "acme", "localhost.direct").await.as_deref(),
            Some("http://acme.localhost.direct/_/#/pbinstal/tok3n")
        );
    }

    #[tokio::test]
    async fn test_find_setup_url_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.log");
        assert!(find_setup_url(&path, "acme", "example.com").await.is_none());
    }
}
