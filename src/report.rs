//! Diagnostics collected while inspecting or rewriting a table.
//!
//! Operations never print. They append to the [`Report`] they are handed, and every entry is also
//! emitted as a `tracing` event so a subscriber can pick it up.

use alloc::{string::String, vec::Vec};
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Info => f.write_str(&self.message),
            Severity::Warning => write!(f, "Warning: {}", self.message),
            Severity::Error => write!(f, "Error: {}", self.message),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    entries: Vec<Diagnostic>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.push(Severity::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(Severity::Error, message);
    }

    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Returns `true` if any entry of at least `severity` mentions `needle`.
    #[must_use]
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity >= severity && entry.message.contains(needle))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::{Report, Severity};

    #[test]
    pub fn report_keeps_entries_in_order() {
        let mut report = Report::new();

        report.info("reading header");
        report.warn("not revision 1.0");
        report.error("invalid checksum");

        let severities: std::vec::Vec<_> = report.entries().iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            [Severity::Info, Severity::Warning, Severity::Error]
        );
        assert_eq!(report.entries()[1].to_string(), "Warning: not revision 1.0");

        assert!(report.contains(Severity::Warning, "checksum"));
        assert!(!report.contains(Severity::Warning, "reading"));

        report.clear();
        assert!(report.entries().is_empty());
    }
}
