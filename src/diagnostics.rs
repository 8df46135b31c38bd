//! Diagnostics collection for reading, distribution and writing.
//!
//! This module provides the reporter used across the pipeline. Fatal conditions that should not
//! stop independent per-file work right away are recorded here and turned into a single error
//! at a checkpoint with [`Diagnostics::fail_if_pending_errors`]. Recoverable warnings, such as a
//! main-dex-list entry that names an absent class, are recorded and processing continues.
//!
//! # Architecture
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` for thread-safe, lock-free append
//! operations, so rayon workers can report without synchronization. Every entry is also
//! forwarded to the `log` facade at the matching level.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Thread-safe container for diagnostic entries
//! - [`Diagnostic`] - Individual diagnostic entry with severity, category and origin
//! - [`DiagnosticSeverity`] - Severity level (Info, Warning, Error)
//! - [`DiagnosticCategory`] - Pipeline stage that produced the diagnostic
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::diagnostics::{Diagnostics, DiagnosticCategory};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.warning(DiagnosticCategory::MainDex, "Main dex class Lfoo/Bar; is absent");
//!
//! assert!(!diagnostics.has_errors());
//! assert!(diagnostics.fail_if_pending_errors().is_ok());
//!
//! diagnostics.error(DiagnosticCategory::Consumer, "Could not write classes2.dex");
//! assert!(diagnostics.fail_if_pending_errors().is_err());
//! ```
//!
//! # Thread Safety
//!
//! All types in this module are [`Send`] and [`Sync`].

use std::fmt::{self, Write};

use crate::{Error::PendingErrors, Result};

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational, no action required
    Info,
    /// Recoverable problem, processing continues
    Warning,
    /// Fatal problem, fails the next checkpoint
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// The pipeline stage a diagnostic originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Decoding an input container
    Reader,
    /// Serializing an output container
    Writer,
    /// Assigning classes to output files
    Distribution,
    /// A runtime capability required by a class is missing
    Capability,
    /// A program consumer failed
    Consumer,
    /// Main-dex list processing
    MainDex,
    /// Startup class processing
    Startup,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Reader => write!(f, "Reader"),
            DiagnosticCategory::Writer => write!(f, "Writer"),
            DiagnosticCategory::Distribution => write!(f, "Distribution"),
            DiagnosticCategory::Capability => write!(f, "Capability"),
            DiagnosticCategory::Consumer => write!(f, "Consumer"),
            DiagnosticCategory::MainDex => write!(f, "MainDex"),
            DiagnosticCategory::Startup => write!(f, "Startup"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity of the entry
    pub severity: DiagnosticSeverity,
    /// Stage that produced it
    pub category: DiagnosticCategory,
    /// Human readable description
    pub message: String,
    /// The input or output the diagnostic refers to, if known
    pub origin: Option<String>,
}

impl Diagnostic {
    /// Create an entry without origin.
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            origin: None,
        }
    }

    /// Attach the origin of the offending input or output.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;

        if let Some(origin) = &self.origin {
            write!(f, " (origin: {})", origin)?;
        }

        Ok(())
    }
}

/// Thread-safe, append-only collection of diagnostics.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record an informational entry.
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Record a recoverable warning.
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Record a fatal error that fails the next checkpoint.
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Record a prepared entry and forward it to the `log` facade.
    pub fn push(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Info => log::info!("{diagnostic}"),
            DiagnosticSeverity::Warning => log::warn!("{diagnostic}"),
            DiagnosticSeverity::Error => log::error!("{diagnostic}"),
        }
        self.entries.push(diagnostic);
    }

    /// Number of recorded entries.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Error)
    }

    /// Number of recorded errors.
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == DiagnosticSeverity::Error)
            .count()
    }

    /// Number of recorded warnings.
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == DiagnosticSeverity::Warning)
            .count()
    }

    /// Iterate over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All error entries.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == DiagnosticSeverity::Error)
            .map(|(_, d)| d)
            .collect()
    }

    /// All entries of one category.
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.entries
            .iter()
            .filter(|(_, d)| d.category == category)
            .map(|(_, d)| d)
            .collect()
    }

    /// Batch checkpoint.
    ///
    /// # Errors
    /// Returns [`crate::Error::PendingErrors`] carrying the number of recorded errors, if any.
    pub fn fail_if_pending_errors(&self) -> Result<()> {
        match self.error_count() {
            0 => Ok(()),
            count => Err(PendingErrors(count)),
        }
    }

    /// A multi-line summary of errors and warnings.
    pub fn summary(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "Diagnostics: {} error(s), {} warning(s)",
            self.error_count(),
            self.warning_count()
        );

        for diag in self
            .iter()
            .filter(|d| d.severity != DiagnosticSeverity::Info)
        {
            let _ = writeln!(output, "  {diag}");
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
