//! Year-partitioned, append-only JSONL logs of summary rows.
//!
//! The logs are the system of record for summary statistics: the warehouse
//! can always be reloaded from them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::summary::SummaryRow;

const FILE_PREFIX: &str = "summary_";
const FILE_SUFFIX: &str = ".jsonl";

#[async_trait]
pub trait SummaryLog: Send + Sync {
    /// Durably appends one row to the log of the row's calendar year.
    async fn append(&self, row: &SummaryRow) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct JsonlSummaryLog {
    dir: PathBuf,
}

impl JsonlSummaryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for_year(&self, year: i32) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{year}{FILE_SUFFIX}"))
    }
}

#[async_trait]
impl SummaryLog for JsonlSummaryLog {
    async fn append(&self, row: &SummaryRow) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| PipelineError::persistence(&self.dir, err))?;

        let path = self.path_for_year(row.year());
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| PipelineError::persistence(&path, err))?;
        // a crash mid-append leaves a torn tail; start on a fresh line
        if !ends_with_newline(&mut file)
            .await
            .map_err(|err| PipelineError::persistence(&path, err))?
        {
            line.insert(0, b'\n');
        }
        file.write_all(&line)
            .await
            .map_err(|err| PipelineError::persistence(&path, err))?;
        file.sync_data()
            .await
            .map_err(|err| PipelineError::persistence(&path, err))?;
        Ok(())
    }
}

async fn ends_with_newline(file: &mut tokio::fs::File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(std::io::SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

/// Keeps rows in memory in append order.
#[derive(Clone, Debug, Default)]
pub struct InMemorySummaryLog {
    rows: Arc<Mutex<Vec<SummaryRow>>>,
}

impl InMemorySummaryLog {
    pub async fn rows(&self) -> Vec<SummaryRow> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl SummaryLog for InMemorySummaryLog {
    async fn append(&self, row: &SummaryRow) -> Result<()> {
        self.rows.lock().await.push(row.clone());
        Ok(())
    }
}

/// `summary_<year>.jsonl` files in `dir`, sorted by name.
pub async fn list_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PipelineError::persistence(dir, err)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| PipelineError::persistence(dir, err))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Rows of one log file plus the lines that did not parse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogContents {
    pub rows: Vec<SummaryRow>,
    /// 1-based numbers of lines that are not valid rows (torn writes, edits).
    pub bad_lines: Vec<usize>,
}

/// Parses every non-blank line of one log file.
///
/// A bad line is logged and recorded; it never hides the rows around it.
pub async fn read_log_file(path: &Path) -> Result<LogContents> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| PipelineError::persistence(path, err))?;

    let mut parsed = LogContents::default();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(row) => parsed.rows.push(row),
            Err(err) => {
                warn!(
                    file = %path.display(),
                    line = idx + 1,
                    error = %err,
                    "unparseable summary line"
                );
                parsed.bad_lines.push(idx + 1);
            }
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::summary::ReductionOutput;
    use crate::types::WorkUnit;

    fn row(y: i32, m: u32, d: u32) -> SummaryRow {
        let mut output = ReductionOutput::default();
        output.insert("sst_mean", Some(27.0));
        output.insert("sst_stdDev", Some(1.0));
        output.insert("sst_count", Some(4.0));
        SummaryRow::reduce(WorkUnit(NaiveDate::from_ymd_opt(y, m, d).unwrap()), &output)
    }

    #[tokio::test]
    async fn rows_land_in_their_year_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSummaryLog::new(dir.path().join("summaries"));

        let rows = [row(2023, 12, 31), row(2024, 1, 1), row(2024, 1, 2)];
        for r in &rows {
            log.append(r).await.unwrap();
        }

        let files = list_log_files(log.dir()).await.unwrap();
        assert_eq!(files, vec![log.path_for_year(2023), log.path_for_year(2024)]);
        assert_eq!(read_log_file(&files[0]).await.unwrap().rows, rows[..1].to_vec());
        assert_eq!(read_log_file(&files[1]).await.unwrap().rows, rows[1..].to_vec());
    }

    #[tokio::test]
    async fn unrelated_files_and_blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSummaryLog::new(dir.path());
        log.append(&row(2020, 6, 1)).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let path = log.path_for_year(2020);
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("\n   \n");
        std::fs::write(&path, contents).unwrap();

        let files = list_log_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![path.clone()]);
        assert_eq!(read_log_file(&path).await.unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn append_after_a_torn_tail_keeps_the_new_row_intact() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSummaryLog::new(dir.path());
        log.append(&row(2024, 1, 1)).await.unwrap();
        let path = log.path_for_year(2024);
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(br#"{"date":"2024-01-0"#).unwrap();
        }
        log.append(&row(2024, 1, 3)).await.unwrap();

        let contents = read_log_file(&path).await.unwrap();
        assert_eq!(contents.rows, vec![row(2024, 1, 1), row(2024, 1, 3)]);
        assert_eq!(contents.bad_lines, vec![2]);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_log_files(&dir.path().join("absent")).await.unwrap().is_empty());
    }
}
