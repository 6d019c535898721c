use std::fmt;

/// Which stage of the pipeline produced a [`Report`]. Only affects how the
/// report is rendered: scan/parse errors point at a lexeme, runtime errors
/// don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Parse,
    Runtime,
}

#[derive(Debug, Clone)]
pub enum ReportLocation {
    /// A specific token's lexeme (or `"end"` handling is via `AtEnd`).
    Token(String),
    AtEnd,
    /// Runtime errors are located by line only.
    None,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub phase: Phase,
    pub message: String,
    pub line: u32,
    pub location: ReportLocation,
}

impl Report {
    pub fn parse(message: impl Into<String>, line: u32, location: ReportLocation) -> Self {
        Report {
            phase: Phase::Parse,
            message: message.into(),
            line,
            location,
        }
    }

    pub fn runtime(message: impl Into<String>, line: u32) -> Self {
        Report {
            phase: Phase::Runtime,
            message: message.into(),
            line,
            location: ReportLocation::None,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Phase::Runtime => write!(f, "{}\n[line {}] in script", self.message, self.line),
            Phase::Scan | Phase::Parse => match &self.location {
                ReportLocation::AtEnd => {
                    write!(f, "[line {}] Error at end: {}", self.line, self.message)
                }
                ReportLocation::Token(lexeme) => write!(
                    f,
                    "[line {}] Error at '{}': {}",
                    self.line, lexeme, self.message
                ),
                ReportLocation::None => write!(f, "[line {}] Error: {}", self.line, self.message),
            },
        }
    }
}

/// Decouples diagnostic production from presentation: the compiler and VM
/// emit `Report`s through this trait instead of printing directly, so tests
/// can assert on diagnostics without capturing process output.
pub trait Reporter {
    fn warning(&mut self, report: Report);
    fn error(&mut self, report: Report);
}

/// Production reporter: prints to stderr in the formats documented for the
/// CLI (see the external-interfaces section of the spec this crate
/// implements).
#[derive(Default)]
pub struct CliReporter;

impl CliReporter {
    pub fn new() -> Self {
        CliReporter
    }
}

impl Reporter for CliReporter {
    fn warning(&mut self, report: Report) {
        eprintln!("{}", report);
    }

    fn error(&mut self, report: Report) {
        eprintln!("{}", report);
    }
}

/// In-memory collector for tests: records every report instead of printing
/// it, so assertions can inspect messages directly.
#[derive(Default)]
pub struct CollectingReporter {
    pub warnings: Vec<Report>,
    pub errors: Vec<Report>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for CollectingReporter {
    fn warning(&mut self, report: Report) {
        self.warnings.push(report);
    }

    fn error(&mut self, report: Report) {
        self.errors.push(report);
    }
}
