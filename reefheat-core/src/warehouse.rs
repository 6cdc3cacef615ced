//! Warehouse bulk-loading of summary rows.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::summary::SummaryRow;
use crate::summary_log::{list_log_files, read_log_file};

/// Rejection of a single row in an insert call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub index: usize,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    /// Inserts `rows` into `table`; an empty result means every row landed.
    async fn insert_rows(&self, table: &str, rows: &[SummaryRow]) -> Result<Vec<RowError>>;
}

#[derive(Clone, Debug)]
pub struct HttpWarehouseLoader {
    http: reqwest::Client,
    endpoint: Url,
}

#[derive(Serialize)]
struct InsertBody<'a> {
    rows: &'a [SummaryRow],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertReply {
    #[serde(default)]
    insert_errors: Vec<RowError>,
}

impl HttpWarehouseLoader {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl WarehouseLoader for HttpWarehouseLoader {
    async fn insert_rows(&self, table: &str, rows: &[SummaryRow]) -> Result<Vec<RowError>> {
        let url = self
            .endpoint
            .join(&format!("tables/{table}/insertAll"))
            .map_err(|err| PipelineError::Warehouse(format!("bad table {table}: {err}")))?;
        let response = self
            .http
            .post(url.clone())
            .json(&InsertBody { rows })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        let reply: InsertReply = response.json().await?;
        Ok(reply.insert_errors)
    }
}

/// Totals of a directory load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files: usize,
    pub rows: usize,
    /// Unparseable log lines plus rows the warehouse rejected or never received.
    pub row_errors: usize,
    /// Log files that could not be read at all.
    pub skipped_files: usize,
}

/// Loads every year log in `dir` into `table`, one insert call per file.
///
/// Failures are reported and counted; they never stop the remaining files.
pub async fn load_summary_dir(
    dir: &Path,
    loader: &dyn WarehouseLoader,
    table: &str,
) -> Result<LoadReport> {
    let files = list_log_files(dir).await?;
    let mut report = LoadReport::default();
    if files.is_empty() {
        info!(dir = %dir.display(), "no summary logs found");
        return Ok(report);
    }

    for path in files {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (rows, bad_lines) = match read_log_file(&path).await {
            Ok(contents) => (contents.rows, contents.bad_lines),
            Err(err) => {
                warn!(file = %name, error = %err, "skipping unreadable summary log");
                report.skipped_files += 1;
                continue;
            }
        };
        if !bad_lines.is_empty() {
            let sample: Vec<_> = bad_lines.iter().take(3).collect();
            warn!(
                file = %name,
                bad_lines = bad_lines.len(),
                first_lines = ?sample,
                "summary log has unparseable lines"
            );
            report.row_errors += bad_lines.len();
        }
        if rows.is_empty() {
            continue;
        }

        report.files += 1;
        report.rows += rows.len();
        match loader.insert_rows(table, &rows).await {
            Ok(errors) if errors.is_empty() => {
                info!(file = %name, rows = rows.len(), "summary rows loaded");
            }
            Ok(errors) => {
                let sample: Vec<_> = errors.iter().take(3).collect();
                warn!(
                    file = %name,
                    rows = rows.len(),
                    rejected = errors.len(),
                    first_errors = ?sample,
                    "warehouse rejected rows"
                );
                report.row_errors += errors.len();
            }
            Err(err) => {
                warn!(file = %name, rows = rows.len(), error = %err, "warehouse insert failed");
                report.row_errors += rows.len();
            }
        }
    }

    info!(
        files = report.files,
        rows = report.rows,
        row_errors = report.row_errors,
        skipped_files = report.skipped_files,
        table,
        "warehouse load finished"
    );
    Ok(report)
}
