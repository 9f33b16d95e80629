//! Explicitly passed logger.
//!
//! Every component receives a `Logger` instead of reaching for process-wide state.
//! Output format follows `[git-lineage] message` on stderr.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    Capture(Arc<Mutex<Vec<String>>>),
}

#[derive(Debug, Clone)]
pub struct Logger {
    debug_enabled: bool,
    sink: Sink,
}

impl Logger {
    /// Logger writing to stderr. Debug lines are printed only when `debug_enabled`.
    pub fn stderr(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            sink: Sink::Stderr,
        }
    }

    /// Logger that keeps every line (debug included) in memory.
    pub fn capturing() -> Self {
        Self {
            debug_enabled: true,
            sink: Sink::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Logger that drops everything except warnings, which still go to stderr.
    pub fn quiet() -> Self {
        Self::stderr(false)
    }

    pub fn debug(&self, msg: &str) {
        if self.debug_enabled {
            self.emit(Level::Debug, msg);
        }
    }

    pub fn info(&self, msg: &str) {
        if self.debug_enabled {
            self.emit(Level::Info, msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        self.emit(Level::Warn, msg);
    }

    /// Lines collected by a capturing logger. Empty for stderr loggers.
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            Sink::Capture(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            Sink::Stderr => Vec::new(),
        }
    }

    fn emit(&self, level: Level, msg: &str) {
        match &self.sink {
            Sink::Stderr => match level {
                Level::Warn => eprintln!("\x1b[1;31m[git-lineage]\x1b[0m {}", msg),
                _ => eprintln!("\x1b[1;33m[git-lineage]\x1b[0m {}", msg),
            },
            Sink::Capture(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(format!("{}: {}", level.as_str(), msg));
                }
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::stderr(cfg!(debug_assertions))
    }
}
