//! Structured compile log
//!
//! The log is the only error-reporting channel of [`Compiler::compile`]:
//! every stage appends entries, and a failed compile still returns
//! everything logged up to the failing stage.
//!
//! [`Compiler::compile`]: super::Compiler::compile

use crate::error::{Error, ErrorSeverity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Informational note
    Info,
    /// Problem that does not stop the compile
    Warning,
    /// Fatal problem
    Error,
}

/// Pipeline stage that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Option validation, before any source is read
    Options,
    /// `[[ ]]` template expansion
    Template,
    /// Block extraction
    Extract,
    /// Per-block assembly
    Assemble,
    /// Dummy function synthesis
    Synthesize,
    /// Device compilation
    Build,
    /// Binary patching
    Patch,
}

impl Stage {
    /// Stage an error originates from
    pub fn of(err: &Error) -> Stage {
        match err {
            Error::TemplateSyntaxError { .. }
            | Error::TemplateEvalError { .. }
            | Error::UndefinedVariable { .. }
            | Error::TypeError { .. }
            | Error::DivisionByZero
            | Error::UnknownFunction { .. }
            | Error::InvalidArguments { .. }
            | Error::TooManyIterations { .. }
            | Error::InvalidBreak
            | Error::InvalidContinue => Stage::Template,
            Error::UnknownParameterType { .. } | Error::MalformedBlock { .. } => Stage::Extract,
            Error::InvalidOptions(_) => Stage::Options,
            Error::AssemblyError { .. } => Stage::Assemble,
            Error::DeviceBuildError { .. } | Error::DeviceError(_) => Stage::Build,
            Error::PatchAnchorNotFound { .. } => Stage::Patch,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Stage::Options => "options",
            Stage::Template => "template",
            Stage::Extract => "extract",
            Stage::Assemble => "assemble",
            Stage::Synthesize => "synthesize",
            Stage::Build => "build",
            Stage::Patch => "patch",
        };
        write!(f, "{}", s)
    }
}

/// One log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Originating stage
    pub stage: Stage,
    /// Message text, possibly multi-line
    pub message: String,
}

/// Ordered log of one compile call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileLog {
    entries: Vec<LogEntry>,
}

impl CompileLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry
    pub fn push(&mut self, level: LogLevel, stage: Stage, message: impl Into<String>) {
        self.entries.push(LogEntry {
            level,
            stage,
            message: message.into(),
        });
    }

    /// Appends an informational entry
    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        self.push(LogLevel::Info, stage, message);
    }

    /// Appends a warning
    pub fn warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.push(LogLevel::Warning, stage, message);
    }

    /// Appends an error
    pub fn error(&mut self, stage: Stage, message: impl Into<String>) {
        self.push(LogLevel::Error, stage, message);
    }

    /// Appends a pipeline error under the stage it came from, at the level
    /// its severity calls for
    pub fn record(&mut self, err: &Error) {
        let level = match err.classify() {
            ErrorSeverity::Fatal => LogLevel::Error,
            ErrorSeverity::Warning => LogLevel::Warning,
        };
        self.push(level, Stage::of(err), err.to_string());
    }

    /// All entries in order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries at exactly `level`
    pub fn at_level(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level == level)
    }

    /// True if any entry is an error
    pub fn has_errors(&self) -> bool {
        self.at_level(LogLevel::Error).next().is_some()
    }

    /// Number of warnings
    pub fn warning_count(&self) -> usize {
        self.at_level(LogLevel::Warning).count()
    }

    /// True if no entries were logged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the log as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for CompileLog {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            let level = match entry.level {
                LogLevel::Info => "info",
                LogLevel::Warning => "warning",
                LogLevel::Error => "error",
            };
            writeln!(f, "[{}] {}: {}", entry.stage, level, entry.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_counts() {
        let mut log = CompileLog::new();
        log.info(Stage::Extract, "2 blocks");
        log.warning(Stage::Patch, "anchor missing");
        log.record(&Error::DeviceBuildError {
            log: "bad".to_string(),
        });

        assert!(log.has_errors());
        assert_eq!(log.warning_count(), 1);
        let text = log.to_string();
        assert!(text.starts_with("[extract] info: 2 blocks\n"));
        assert!(text.contains("[patch] warning: anchor missing\n"));
        assert!(text.contains("[build] error: Device build failed:\nbad"));
    }

    #[test]
    fn test_json_export() {
        let mut log = CompileLog::new();
        log.warning(Stage::Extract, "unnamed parameter");
        let json = log.to_json().unwrap();
        let back: CompileLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
        assert!(json.contains("\"Warning\""));
    }

    #[test]
    fn test_stage_of_error() {
        assert_eq!(Stage::of(&Error::DivisionByZero), Stage::Template);
        assert_eq!(
            Stage::of(&Error::AssemblyError { functions: vec![] }),
            Stage::Assemble
        );
        assert_eq!(
            Stage::of(&Error::InvalidOptions("x".to_string())),
            Stage::Options
        );
    }

    #[test]
    fn test_record_uses_severity() {
        let mut log = CompileLog::new();
        log.record(&Error::PatchAnchorNotFound {
            function: "k".to_string(),
        });
        log.record(&Error::MalformedBlock {
            line: 3,
            message: "missing '{'".to_string(),
        });

        let levels: Vec<_> = log.entries().iter().map(|e| (e.level, e.stage)).collect();
        assert_eq!(
            levels,
            vec![
                (LogLevel::Warning, Stage::Patch),
                (LogLevel::Error, Stage::Extract)
            ]
        );
    }
}
