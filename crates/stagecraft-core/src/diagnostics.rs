//! Diagnostics sink handed to every compile call.
//!
//! The core never reaches for a process-wide logger: callers choose where
//! events go by passing a [`Diagnostics`] implementation.

use core::fmt;
use std::cell::RefCell;
use std::path::Path;

use crate::model::Instruction;

#[derive(Debug)]
pub enum Event<'a> {
    StageResolved {
        stage: &'a str,
        instructions: &'a [Instruction],
    },
    BuildFileWritten {
        step: &'a str,
        path: &'a Path,
    },
    CleanupFailed {
        path: &'a Path,
        error: &'a std::io::Error,
    },
    Warning {
        line: Option<usize>,
        message: &'a str,
    },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageResolved {
                stage,
                instructions,
            } => write!(
                f,
                "resolved stage {stage} to {} instructions",
                instructions.len()
            ),
            Self::BuildFileWritten { step, path } => {
                write!(f, "wrote build file for {step} to {}", path.display())
            }
            Self::CleanupFailed { path, error } => {
                write!(f, "failed to remove {}: {error}", path.display())
            }
            Self::Warning {
                line: Some(line),
                message,
            } => write!(f, "line {line}: {message}"),
            Self::Warning {
                line: None,
                message,
            } => f.write_str(message),
        }
    }
}

pub trait Diagnostics {
    fn emit(&self, event: Event<'_>);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, event: Event<'_>) {
        match event {
            Event::StageResolved {
                stage,
                instructions,
            } => {
                for instruction in instructions {
                    tracing::trace!(
                        stage,
                        line = instruction.start_line,
                        "{}",
                        instruction.render()
                    );
                }
                tracing::debug!(stage, count = instructions.len(), "resolved stage");
            }
            Event::BuildFileWritten { step, path } => {
                tracing::info!(step, path = %path.display(), "wrote build file");
            }
            Event::CleanupFailed { path, error } => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "failed to remove partial build file"
                );
            }
            Event::Warning { line, message } => {
                tracing::warn!(line = ?line, "{message}");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn emit(&self, _event: Event<'_>) {}
}

/// Keeps rendered events in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: RefCell<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn messages(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, event: Event<'_>) {
        self.events.borrow_mut().push(event.to_string());
    }
}
