// ABOUTME: User-facing command output in human, quiet, or JSON-lines form.
// ABOUTME: Logs go to stderr through tracing; this module owns what lands on stdout.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines plus the final result.
    Normal,
    /// Only the final result and problems.
    Quiet,
    /// One JSON object per line on stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Progress,
    Success,
    Warning,
    Error,
}

impl Kind {
    fn event(self) -> &'static str {
        match self {
            Kind::Progress => "progress",
            Kind::Success => "success",
            Kind::Warning => "warning",
            Kind::Error => "error",
        }
    }
}

pub struct Output {
    mode: OutputMode,
    started: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: None,
        }
    }

    /// Report elapsed time on success lines and JSON events from now on.
    pub fn timed(mut self) -> Self {
        self.started = Some(Instant::now());
        self
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    pub fn progress(&self, message: &str) {
        self.emit(Kind::Progress, message);
    }

    pub fn success(&self, message: &str) {
        self.emit(Kind::Success, message);
    }

    pub fn warning(&self, message: &str) {
        self.emit(Kind::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Kind::Error, message);
    }

    /// A structured result: `human` as text, or `value` under `data` in JSON mode.
    pub fn report<T: Serialize>(&self, value: &T, human: &str) {
        if self.is_json() {
            self.json_line("result", "", serde_json::to_value(value).ok());
        } else {
            println!("{human}");
        }
    }

    fn emit(&self, kind: Kind, message: &str) {
        match (self.mode, kind) {
            (OutputMode::Json, _) => self.json_line(kind.event(), message, None),
            (OutputMode::Quiet, Kind::Progress) => {}
            (_, Kind::Progress) => println!("{message}"),
            (_, Kind::Success) => match self.elapsed() {
                Some(secs) if self.mode == OutputMode::Normal => {
                    println!("{message} ({secs:.1}s)")
                }
                _ => println!("{message}"),
            },
            (_, Kind::Warning) => eprintln!("Warning: {message}"),
            (_, Kind::Error) => eprintln!("Error: {message}"),
        }
    }

    fn elapsed(&self) -> Option<f64> {
        self.started.map(|t| t.elapsed().as_secs_f64())
    }

    fn json_line(&self, event: &str, message: &str, data: Option<serde_json::Value>) {
        let line = JsonLine {
            event,
            message,
            elapsed_secs: self.elapsed(),
            data,
        };
        if let Ok(text) = serde_json::to_string(&line) {
            println!("{text}");
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}
