//! Append-only CSV logs on local disk: the instance record log and the
//! command log written by `proxyfleet exec`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::application::ports::{CommandLogSink, RecordSink};
use crate::domain::{CommandLogRow, InstanceSummary};

/// Default command log location for `proxyfleet exec`.
pub const DEFAULT_COMMAND_LOG: &str = "command_log.csv";

/// An append+create file whose writes are serialized and synced to disk.
#[derive(Clone)]
struct AppendFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl AppendFile {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Write one line on the blocking pool; returns once it is durable.
    async fn append_line(&self, line: String) -> Result<()> {
        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = file
                .lock()
                .map_err(|_| anyhow::anyhow!("{} lock poisoned", path.display()))?;
            writeln!(file, "{line}").with_context(|| format!("cannot write {}", path.display()))?;
            file.flush()
                .with_context(|| format!("cannot flush {}", path.display()))?;
            file.sync_data()
                .with_context(|| format!("cannot sync {}", path.display()))?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?
    }
}

// ── Record log ────────────────────────────────────────────────────────────────

/// Instance record log: one `id,address,created_at,local_port` row per
/// published instance.
#[derive(Clone)]
pub struct CsvRecordLog {
    inner: AppendFile,
}

impl CsvRecordLog {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: AppendFile::open(path)?,
        })
    }
}

impl RecordSink for CsvRecordLog {
    async fn append(&self, record: &InstanceSummary) -> Result<()> {
        self.inner.append_line(record.to_row()).await
    }
}

/// Read every row of the record log. A missing file reads as empty.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row is malformed; the
/// message names the offending line.
pub fn read_records(path: &Path) -> Result<Vec<InstanceSummary>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse_records(&content).with_context(|| format!("cannot parse {}", path.display()))
}

fn parse_records(content: &str) -> Result<Vec<InstanceSummary>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            InstanceSummary::parse_row(line).with_context(|| format!("line {}", n + 1))
        })
        .collect()
}

// ── Command log ───────────────────────────────────────────────────────────────

/// Command log: one row per command run through a tunnel.
pub struct CsvCommandLog {
    inner: AppendFile,
}

impl CsvCommandLog {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: AppendFile::open(path)?,
        })
    }
}

impl CommandLogSink for CsvCommandLog {
    async fn append_command(&self, row: &CommandLogRow) -> Result<()> {
        self.inner.append_line(row.to_row()).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{CommandStatus, InstanceId};

    fn summary(id: u64, port: u16) -> InstanceSummary {
        InstanceSummary {
            id: InstanceId(id),
            address: Ipv4Addr::new(192, 0, 2, 10),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            local_port: port,
        }
    }

    #[tokio::test]
    async fn test_append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("droplets.csv");
        let log = CsvRecordLog::open(&path).unwrap();

        log.append(&summary(1, 8001)).await.unwrap();
        log.append(&summary(2, 8002)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "1,192.0.2.10,2024-05-01T09:00:00Z,8001\n2,192.0.2.10,2024-05-01T09:00:00Z,8002\n"
        );
        assert_eq!(
            read_records(&path).unwrap(),
            vec![summary(1, 8001), summary(2, 8002)]
        );
    }

    #[tokio::test]
    async fn test_open_appends_to_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("droplets.csv");
        std::fs::write(&path, "7,192.0.2.10,2024-05-01T09:00:00Z,8007\n").unwrap();

        let log = CsvRecordLog::open(&path).unwrap();
        log.append(&summary(8, 8008)).await.unwrap();

        let ids: Vec<_> = read_records(&path).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, [InstanceId(7), InstanceId(8)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("droplets.csv");
        let log = CsvRecordLog::open(&path).unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..50u16 {
            let log = log.clone();
            tasks.spawn(async move { log.append(&summary(u64::from(i), 8000 + i)).await });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        assert_eq!(read_records(&path).unwrap().len(), 50);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_records(&dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let rows = parse_records("\n1,192.0.2.10,2024-05-01T09:00:00Z,8001\n\n").unwrap();
        assert_eq!(rows, vec![summary(1, 8001)]);
    }

    #[test]
    fn test_read_names_malformed_line() {
        let err = parse_records("1,192.0.2.10,2024-05-01T09:00:00Z,8001\n2,192.0.2.10\n")
            .unwrap_err();
        assert_eq!(err.to_string(), "line 2");
        assert!(format!("{err:#}").contains("expected 4 fields"), "got: {err:#}");
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvRecordLog::open(&dir.path().join("nope").join("droplets.csv"))
            .err()
            .expect("open should fail");
        assert!(err.to_string().contains("cannot open"), "got: {err}");
    }

    #[tokio::test]
    async fn test_command_log_quotes_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("command_log.csv");
        let log = CsvCommandLog::open(&path).unwrap();

        log.append_command(&CommandLogRow {
            instance_id: InstanceId(5),
            egress_ip: "198.51.100.20".into(),
            ran_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            command: "sh -c \"echo hi\"".into(),
            status: CommandStatus::Success,
        })
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "5,198.51.100.20,2024-05-01T10:00:00Z,\"sh -c \"\"echo hi\"\"\",Success\n"
        );
    }
}
