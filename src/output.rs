//! Simple Output and Reporting
//!
//! This module renders per-file reports and the run summary. The pipeline
//! itself never prints; it returns values that are formatted here.

use std::time::Duration;

use crate::cli::VerbosityLevel;
use crate::engine::{FileReport, FormatStatus, RunResults};

/// Simple output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    #[cfg(test)]
    fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, results: &RunResults) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                if results.has_failures() {
                    output.push_str(&format!("Failed: {}\n", results.failed_files));
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose | VerbosityLevel::Debug => {
                for report in &results.file_reports {
                    if self.should_show(report) {
                        output.push_str(&self.format_file_report(report));
                        output.push('\n');
                    }
                }
                output.push_str(&self.format_summary(results));
            }
        }

        output
    }

    /// Normal verbosity reports files that changed or went wrong; unchanged
    /// files only show up in verbose runs.
    fn should_show(&self, report: &FileReport) -> bool {
        if self.verbosity >= VerbosityLevel::Verbose {
            return true;
        }
        !report.status.is_unchanged() || report.has_validation_issues()
    }

    pub fn format_file_report(&self, report: &FileReport) -> String {
        let path_display = report.path.display();

        let mut output = match &report.status {
            FormatStatus::Formatted => {
                format!("{}  {}", self.colorize("✓ FORMATTED", "32"), path_display)
            }
            FormatStatus::WouldFormat => {
                format!(
                    "{}  {}",
                    self.colorize("~ WOULD FORMAT", "36"),
                    path_display
                )
            }
            FormatStatus::Unchanged => {
                format!("{}  {}", self.colorize("= UNCHANGED", "2"), path_display)
            }
            FormatStatus::Skipped { reason } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("- SKIPPED", "36"),
                    path_display,
                    reason
                )
            }
            FormatStatus::ParseFailed { reason } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("✗ PARSE FAILED", "31"),
                    path_display,
                    reason
                )
            }
            FormatStatus::Error { message } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("⚠ ERROR", "33"),
                    path_display,
                    message
                )
            }
        };

        for message in &report.validation_messages {
            output.push_str(&format!(
                "\n    {} {}",
                self.colorize("validation:", "33"),
                message
            ));
        }

        output
    }

    fn format_summary(&self, results: &RunResults) -> String {
        let mut output = String::new();
        output.push_str("Format Summary:\n");
        output.push_str(&format!("  Total files: {}\n", results.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Formatted:", "32"),
            results.formatted_files
        ));
        output.push_str(&format!("  Unchanged: {}\n", results.unchanged_files));

        if results.skipped_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            ));
        }
        if results.failed_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Failed:", "31"),
                results.failed_files
            ));
        }
        if results.validation_flagged_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Validation issues:", "33"),
                results.validation_flagged_files
            ));
        }

        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(results.total_duration)
        ));

        if self.verbosity >= VerbosityLevel::Verbose && results.total_files > 0 {
            output.push_str(&format!(
                "  Average per file: {}\n",
                format_duration(results.average_duration)
            ));
            output.push_str(&format!("  Success rate: {:.1}%\n", results.success_rate()));
        }

        output
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
