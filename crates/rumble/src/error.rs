use std::fmt::Write as _;

use crate::{
    envelope::{ErrorEnvelope, ErrorLoc},
    value::ValueKind,
};

/// One frame of a guest error's structured trace, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: usize,
    pub function: Option<String>,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            function: None,
        }
    }

    #[must_use]
    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// Errors attributable to guest code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestError {
    #[error("TypeMismatch: {context} argument must be {expected}, got {found}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
        found: ValueKind,
        line: Option<usize>,
    },

    #[error("ContractViolation: {message}")]
    ContractViolation {
        message: String,
        line: Option<usize>,
    },

    #[error("RuntimeError: {message}")]
    Runtime {
        message: String,
        line: Option<usize>,
        trace: Vec<Frame>,
    },
}

impl GuestError {
    #[must_use]
    pub const fn type_mismatch(
        context: &'static str,
        expected: &'static str,
        found: ValueKind,
    ) -> Self {
        Self::TypeMismatch {
            context,
            expected,
            found,
            line: None,
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
            line: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            line: None,
            trace: Vec::new(),
        }
    }

    /// Attaches an explicit source line unless one is already present.
    #[must_use]
    pub fn located(mut self, at: Option<usize>) -> Self {
        let (Self::TypeMismatch { line, .. }
        | Self::ContractViolation { line, .. }
        | Self::Runtime { line, .. }) = &mut self;
        if line.is_none() {
            *line = at;
        }
        self
    }

    /// Pushes a trace frame. Only runtime errors carry a trace; other kinds
    /// are returned unchanged.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        if let Self::Runtime { trace, .. } = &mut self {
            trace.push(frame);
        }
        self
    }

    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::TypeMismatch { line, .. }
            | Self::ContractViolation { line, .. }
            | Self::Runtime { line, .. } => *line,
        }
    }

    #[must_use]
    pub fn trace(&self) -> &[Frame] {
        match self {
            Self::Runtime { trace, .. } => trace,
            _ => &[],
        }
    }

    /// Converts into the wire envelope for a guest whose source file is
    /// named `source`.
    ///
    /// The location is the explicit line when there is one, otherwise the
    /// first trace frame in `source`.
    #[must_use]
    pub fn to_envelope(&self, source: &str) -> ErrorEnvelope {
        let line = self.line().or_else(|| {
            self.trace()
                .iter()
                .find(|frame| frame.file == source)
                .map(|frame| frame.line)
        });

        let mut envelope = ErrorEnvelope::new(self.to_string());
        if let Some(line) = line {
            envelope = envelope.with_loc(ErrorLoc::line(line));
        }
        if !self.trace().is_empty() {
            let mut details = String::from("Traceback (most recent call last):");
            for frame in self.trace() {
                let _ = write!(details, "\n  File \"{}\", line {}", frame.file, frame.line);
                if let Some(function) = &frame.function {
                    let _ = write!(details, ", in {function}");
                }
            }
            let _ = write!(details, "\n{self}");
            envelope = envelope.with_details(details);
        }
        envelope
    }
}
