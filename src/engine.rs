//! Per-file formatting pipeline and run orchestration.
//!
//! Each file runs the same pipeline start to finish: read → decode →
//! validate (advisory) → canonicalize → change-detect → optional backup →
//! atomic write. Files are independent, so the engine runs them as
//! semaphore-bounded tokio tasks and aggregates the per-file reports after a
//! join; one file's failure never prevents the others from being processed
//! (unless the run opts into fail-fast).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::backup;
use crate::change::needs_write;
use crate::config::{AppConfig, FormatConfig, RunConfig};
use crate::document::Document;
use crate::error::{FormatError, Result};
use crate::file_discovery::FileDiscovery;
use crate::formatter::canonicalize;
use crate::validator::{self, ValidationReport};

/// Terminal status of one file's pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatStatus {
    /// File was rewritten with its canonical form
    Formatted,
    /// Dry run: file would be rewritten
    WouldFormat,
    /// File content is already canonical
    Unchanged,
    /// File was deliberately left alone
    Skipped { reason: String },
    /// File is not well-formed markup; left untouched
    ParseFailed { reason: String },
    /// I/O or encoding failure; left untouched
    Error { message: String },
}

impl FormatStatus {
    /// Check if the file was (or would be) rewritten
    pub fn is_formatted(&self) -> bool {
        matches!(self, FormatStatus::Formatted | FormatStatus::WouldFormat)
    }

    /// Check if the file needed no work
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FormatStatus::Unchanged)
    }

    /// Check if the file failed
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FormatStatus::ParseFailed { .. } | FormatStatus::Error { .. }
        )
    }

    /// Check if the file was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self, FormatStatus::Skipped { .. })
    }
}

/// Result of running the pipeline on a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Path to the processed file
    pub path: PathBuf,
    /// Terminal pipeline status
    pub status: FormatStatus,
    /// Advisory structural validation messages, possibly empty
    pub validation_messages: Vec<String>,
    /// Duration of the pipeline run
    pub duration: Duration,
}

impl FileReport {
    fn new(
        path: PathBuf,
        status: FormatStatus,
        validation: ValidationReport,
        duration: Duration,
    ) -> Self {
        Self {
            path,
            status,
            validation_messages: validation.into_messages(),
            duration,
        }
    }

    fn error(path: PathBuf, error: FormatError, duration: Duration) -> Self {
        Self::new(
            path,
            FormatStatus::Error {
                message: error.to_string(),
            },
            ValidationReport::default(),
            duration,
        )
    }

    pub fn has_validation_issues(&self) -> bool {
        !self.validation_messages.is_empty()
    }
}

/// Aggregated results of one run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunResults {
    /// Total number of files processed
    pub total_files: usize,
    /// Files rewritten (or, dry run, that would be)
    pub formatted_files: usize,
    /// Files already canonical
    pub unchanged_files: usize,
    /// Files deliberately skipped
    pub skipped_files: usize,
    /// Files with parse or I/O failures
    pub failed_files: usize,
    /// Files with structural validation issues
    pub validation_flagged_files: usize,
    /// Wall-clock duration of the whole run
    pub total_duration: Duration,
    /// Average pipeline duration per file
    pub average_duration: Duration,
    /// Individual file reports
    pub file_reports: Vec<FileReport>,
}

impl RunResults {
    /// Aggregate individual file reports into summary counters
    pub fn aggregate(file_reports: Vec<FileReport>, total_duration: Duration) -> Self {
        let total_files = file_reports.len();
        let mut formatted_files = 0;
        let mut unchanged_files = 0;
        let mut skipped_files = 0;
        let mut failed_files = 0;
        let mut validation_flagged_files = 0;
        let mut pipeline_duration = Duration::ZERO;

        for report in &file_reports {
            match report.status {
                FormatStatus::Formatted | FormatStatus::WouldFormat => formatted_files += 1,
                FormatStatus::Unchanged => unchanged_files += 1,
                FormatStatus::Skipped { .. } => skipped_files += 1,
                FormatStatus::ParseFailed { .. } | FormatStatus::Error { .. } => failed_files += 1,
            }
            if report.has_validation_issues() {
                validation_flagged_files += 1;
            }
            pipeline_duration += report.duration;
        }

        let average_duration = if total_files > 0 {
            pipeline_duration / total_files as u32
        } else {
            Duration::ZERO
        };

        Self {
            total_files,
            formatted_files,
            unchanged_files,
            skipped_files,
            failed_files,
            validation_flagged_files,
            total_duration,
            average_duration,
            file_reports,
        }
    }

    /// Check if any file had a parse or I/O failure
    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }

    /// Share of files that completed their pipeline, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            100.0
        } else {
            ((self.total_files - self.failed_files) as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Orchestrates the formatting pipeline across the files of one run.
pub struct FormatEngine {
    format_config: FormatConfig,
    run_config: RunConfig,
}

impl FormatEngine {
    pub fn new(format_config: FormatConfig, run_config: RunConfig) -> Self {
        Self {
            format_config,
            run_config,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(config.formatting.clone(), config.run.clone())
    }

    /// Discover files under `path` and run the pipeline on each.
    pub async fn run(&self, path: &Path, discovery: &FileDiscovery) -> Result<RunResults> {
        let started = Instant::now();

        let files = discovery.discover_files(path).await?;
        if files.is_empty() {
            return Ok(RunResults::aggregate(Vec::new(), started.elapsed()));
        }

        let reports = self.format_files(files).await?;
        Ok(RunResults::aggregate(reports, started.elapsed()))
    }

    /// Run the pipeline on an explicit list of files.
    pub async fn format_files(&self, files: Vec<PathBuf>) -> Result<Vec<FileReport>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        if self.run_config.fail_fast {
            return self.format_files_sequential(files).await;
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.run_config.threads.max(1)));

        let tasks: Vec<_> = files
            .into_iter()
            .map(|path| {
                let semaphore = Arc::clone(&semaphore);
                let format_config = self.format_config.clone();
                let run_config = self.run_config.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        FormatError::Concurrency {
                            details: "failed to acquire formatting semaphore".to_string(),
                        }
                    })?;
                    Ok::<FileReport, FormatError>(
                        Self::format_single_file(path, &format_config, &run_config).await,
                    )
                })
            })
            .collect();

        let task_results =
            try_join_all(tasks)
                .await
                .map_err(|err| FormatError::Concurrency {
                    details: format!("task join error: {err}"),
                })?;

        let mut reports = Vec::with_capacity(task_results.len());
        for result in task_results {
            reports.push(result?);
        }
        Ok(reports)
    }

    /// Fail-fast runs process files one at a time so that nothing after the
    /// first failure is touched.
    async fn format_files_sequential(&self, files: Vec<PathBuf>) -> Result<Vec<FileReport>> {
        let mut reports = Vec::with_capacity(files.len());
        for path in files {
            let report =
                Self::format_single_file(path, &self.format_config, &self.run_config).await;
            let failed = report.status.is_failure();
            reports.push(report);
            if failed {
                break;
            }
        }
        Ok(reports)
    }

    /// The per-file pipeline. Always returns a report; never panics a task.
    async fn format_single_file(
        path: PathBuf,
        format_config: &FormatConfig,
        run_config: &RunConfig,
    ) -> FileReport {
        let started = Instant::now();

        let encoding = match format_config.encoding() {
            Ok(encoding) => encoding,
            Err(err) => return FileReport::error(path, err, started.elapsed()),
        };

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => return FileReport::error(path, err.into(), started.elapsed()),
        };

        let (text, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            let err = FormatError::Decode {
                path: path.clone(),
                encoding: encoding.name().to_string(),
            };
            return FileReport::error(path, err, started.elapsed());
        }

        let document = Document::new(path.clone(), text.into_owned());

        if document.is_blank() {
            return FileReport::new(
                path,
                FormatStatus::Skipped {
                    reason: "empty file".to_string(),
                },
                ValidationReport::default(),
                started.elapsed(),
            );
        }

        let validation = if run_config.validate {
            validator::validate(&document)
        } else {
            ValidationReport::default()
        };

        let candidate = match canonicalize(document.text(), format_config) {
            Ok(candidate) => candidate,
            Err(err @ FormatError::Parse { .. }) => {
                return FileReport::new(
                    path,
                    FormatStatus::ParseFailed {
                        reason: err.to_string(),
                    },
                    validation,
                    started.elapsed(),
                );
            }
            Err(err) => return FileReport::error(path, err, started.elapsed()),
        };

        if !needs_write(document.text(), &candidate) {
            return FileReport::new(path, FormatStatus::Unchanged, validation, started.elapsed());
        }

        if format_config.strict_validation && !validation.passed() && !run_config.dry_run {
            return FileReport::new(
                path,
                FormatStatus::Skipped {
                    reason: "validation issues".to_string(),
                },
                validation,
                started.elapsed(),
            );
        }

        if run_config.dry_run {
            return FileReport::new(
                path,
                FormatStatus::WouldFormat,
                validation,
                started.elapsed(),
            );
        }

        if run_config.backup
            && let Err(err) = backup::create_backup(&path).await
        {
            return FileReport::new(
                path,
                FormatStatus::Skipped {
                    reason: format!("backup creation failed: {err}"),
                },
                validation,
                started.elapsed(),
            );
        }

        let (encoded, _, unmappable) = encoding.encode(&candidate);
        if unmappable {
            let err = FormatError::Encode {
                encoding: encoding.name().to_string(),
            };
            return FileReport::error(path, err, started.elapsed());
        }

        match write_atomic(&path, &encoded).await {
            Ok(()) => FileReport::new(path, FormatStatus::Formatted, validation, started.elapsed()),
            Err(err) => FileReport::error(path, err, started.elapsed()),
        }
    }
}

/// Replace `path` with `bytes` all-or-nothing: the content lands in a
/// temporary file in the same directory and is renamed over the original, so
/// a failure mid-write leaves the original exactly as it was.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let path = path.to_path_buf();
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || -> Result<()> {
        use std::io::Write;

        let permissions = std::fs::metadata(&path)?.permissions();
        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(&bytes)?;
        temp.persist(&path).map_err(|err| FormatError::Io(err.error))?;
        std::fs::set_permissions(&path, permissions)?;
        Ok(())
    })
    .await
    .map_err(|err| FormatError::Concurrency {
        details: format!("write task join error: {err}"),
    })?
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn engine() -> FormatEngine {
        FormatEngine::new(FormatConfig::default(), RunConfig::default())
    }

    fn engine_with(run_config: RunConfig) -> FormatEngine {
        FormatEngine::new(FormatConfig::default(), run_config)
    }

    async fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_formats_messy_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "a.xml", "<a><b>x</b></a>").await;

        let reports = engine().format_files(vec![path.clone()]).await.unwrap();
        assert_eq!(reports[0].status, FormatStatus::Formatted);

        let written = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            written,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n    <b>x</b>\n</a>\n"
        );
    }

    #[tokio::test]
    async fn test_second_run_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "a.xml", "<a><b>x</b></a>").await;

        let engine = engine();
        engine.format_files(vec![path.clone()]).await.unwrap();
        let reports = engine.format_files(vec![path]).await.unwrap();
        assert_eq!(reports[0].status, FormatStatus::Unchanged);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_file_alone() {
        let temp_dir = TempDir::new().unwrap();
        let original = "<a><b>x</b></a>";
        let path = write_file(&temp_dir, "a.xml", original).await;

        let run_config = RunConfig {
            dry_run: true,
            ..RunConfig::default()
        };
        let reports = engine_with(run_config)
            .format_files(vec![path.clone()])
            .await
            .unwrap();

        assert_eq!(reports[0].status, FormatStatus::WouldFormat);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let original = "<a><b>x</a>";
        let path = write_file(&temp_dir, "bad.xml", original).await;

        let reports = engine().format_files(vec![path.clone()]).await.unwrap();

        match &reports[0].status {
            FormatStatus::ParseFailed { reason } => assert!(!reason.is_empty()),
            other => panic!("expected parse failure, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_trailing_newline_only_difference_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        // Canonical output minus its trailing newline.
        let stored = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n    <b>x</b>\n</a>";
        let path = write_file(&temp_dir, "a.xml", stored).await;

        let reports = engine().format_files(vec![path.clone()]).await.unwrap();
        assert_eq!(reports[0].status, FormatStatus::Unchanged);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_empty_file_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "empty.xml", "  \n").await;

        let reports = engine().format_files(vec![path]).await.unwrap();
        assert!(reports[0].status.is_skipped());
    }

    #[tokio::test]
    async fn test_backup_created_before_write() {
        let temp_dir = TempDir::new().unwrap();
        let original = "<a><b>x</b></a>";
        let path = write_file(&temp_dir, "a.xml", original).await;

        let run_config = RunConfig {
            backup: true,
            ..RunConfig::default()
        };
        let reports = engine_with(run_config)
            .format_files(vec![path.clone()])
            .await
            .unwrap();
        assert_eq!(reports[0].status, FormatStatus::Formatted);

        let backup = fs::read_to_string(temp_dir.path().join("a.xml.bak"))
            .await
            .unwrap();
        assert_eq!(backup, original);
        assert_ne!(fs::read_to_string(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_manifest_validation_does_not_block() {
        let temp_dir = TempDir::new().unwrap();
        // Missing provider-name, and in need of reformatting.
        let path = write_file(
            &temp_dir,
            "addon.xml",
            "<addon id=\"x\" name=\"X\" version=\"1.0.0\"><extension/></addon>",
        )
        .await;

        let reports = engine().format_files(vec![path.clone()]).await.unwrap();

        assert_eq!(reports[0].status, FormatStatus::Formatted);
        assert_eq!(
            reports[0].validation_messages,
            vec!["missing required attribute 'provider-name'".to_string()]
        );
    }

    #[tokio::test]
    async fn test_strict_mode_skips_flagged_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let original = "<addon id=\"x\" name=\"X\" version=\"1.0.0\"><extension/></addon>";
        let path = write_file(&temp_dir, "addon.xml", original).await;

        let strict = FormatConfig {
            strict_validation: true,
            ..FormatConfig::default()
        };
        let engine = FormatEngine::new(strict, RunConfig::default());
        let reports = engine.format_files(vec![path.clone()]).await.unwrap();

        assert!(reports[0].status.is_skipped());
        assert!(reports[0].has_validation_issues());
        assert_eq!(fs::read_to_string(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let temp_dir = TempDir::new().unwrap();
        let bad = write_file(&temp_dir, "1-bad.xml", "<a><b></a>").await;
        let good = write_file(&temp_dir, "2-good.xml", "<a><b>x</b></a>").await;

        let run_config = RunConfig {
            fail_fast: true,
            ..RunConfig::default()
        };
        let reports = engine_with(run_config)
            .format_files(vec![bad, good.clone()])
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert!(reports[0].status.is_failure());
        // Nothing after the failure was touched.
        assert_eq!(
            fs::read_to_string(&good).await.unwrap(),
            "<a><b>x</b></a>"
        );
    }

    #[tokio::test]
    async fn test_run_aggregates_counters() {
        let temp_dir = TempDir::new().unwrap();
        write_file(&temp_dir, "messy.xml", "<a><b>x</b></a>").await;
        write_file(&temp_dir, "bad.xml", "<a><b></a>").await;
        write_file(
            &temp_dir,
            "canonical.xml",
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n    <b>x</b>\n</a>\n",
        )
        .await;

        let discovery = FileDiscovery::new();
        let results = engine().run(temp_dir.path(), &discovery).await.unwrap();

        assert_eq!(results.total_files, 3);
        assert_eq!(results.formatted_files, 1);
        assert_eq!(results.unchanged_files, 1);
        assert_eq!(results.failed_files, 1);
        assert!(results.has_failures());
        assert!((results.success_rate() - 66.7).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_missing_file_reports_io_error() {
        let reports = engine()
            .format_files(vec![PathBuf::from("/nonexistent/a.xml")])
            .await
            .unwrap();
        assert!(matches!(reports[0].status, FormatStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_reports_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latin.xml");
        fs::write(&path, b"<a>caf\xe9</a>".to_vec()).await.unwrap();

        let reports = engine().format_files(vec![path]).await.unwrap();
        match &reports[0].status {
            FormatStatus::Error { message } => assert!(message.contains("UTF-8")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_run_results() {
        let results = RunResults::aggregate(Vec::new(), Duration::ZERO);
        assert_eq!(results.total_files, 0);
        assert!(!results.has_failures());
        assert_eq!(results.success_rate(), 100.0);
    }
}
