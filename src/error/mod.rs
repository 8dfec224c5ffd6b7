//! Error types and diagnostics for XML output.
//!
//! Every writer operation either applies its whole effect or fails with
//! exactly one [`WriteError`]. Structural and namespace checks run before
//! anything is emitted for the offending call, so a `Structure` or
//! `NamespaceConstraint` error leaves the output untouched. An `Io` error is
//! different: the sink may have accepted part of the call, and the writer
//! must be discarded.
//!
//! Validators report [`ValidationProblem`]s tagged with an
//! [`ErrorSeverity`]. Warnings never abort a call; errors and fatal errors
//! surface as [`WriteError::Validation`].

use std::fmt;

use thiserror::Error;

/// Severity level of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational; output continues.
    Warning,
    /// The output is invalid against an attached schema.
    Error,
    /// The output is invalid and no further validator in a chain should see
    /// the event.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A single problem reported by a validator (or by the writer's own
/// content-class gating while validators are attached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProblem {
    /// How serious the problem is.
    pub severity: ErrorSeverity,
    /// Human-readable description.
    pub message: String,
    /// Qualified name of the innermost open element, if any.
    pub element: Option<String>,
}

impl ValidationProblem {
    /// Creates a problem with no element context.
    #[must_use]
    pub fn new(severity: ErrorSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            element: None,
        }
    }

    /// Attaches the qualified name of the element the problem refers to.
    #[must_use]
    pub fn at_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(element) => write!(f, "{}: {} (in <{}>)", self.severity, self.message, element),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// The error type returned by writer operations.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Well-formedness or writer-state violation: unmatched end element,
    /// attribute without an open start element, misplaced DOCTYPE, content
    /// that cannot be expressed (e.g. `]]>` inside CDATA).
    #[error("structure error: {message}")]
    Structure { message: String },

    /// Illegal `xml`/`xmlns` binding, or a namespace that cannot be
    /// resolved to a prefix in non-repairing mode.
    #[error("namespace constraint violated: {message}")]
    NamespaceConstraint { message: String },

    /// An ERROR or FATAL problem reported while validating.
    #[error("validation failed: {problem}")]
    Validation { problem: ValidationProblem },

    /// The underlying sink failed. The writer state is unspecified afterwards.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation has no meaning for this backend.
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: &'static str,
    },
}

impl WriteError {
    pub(crate) fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    pub(crate) fn namespace(message: impl Into<String>) -> Self {
        Self::NamespaceConstraint {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity_display() {
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
        assert_eq!(ErrorSeverity::Error.to_string(), "error");
        assert_eq!(ErrorSeverity::Fatal.to_string(), "fatal error");
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Fatal);
    }

    #[test]
    fn test_problem_display_with_element() {
        let problem = ValidationProblem::new(ErrorSeverity::Error, "text not allowed")
            .at_element("ns1:item");
        assert_eq!(problem.to_string(), "error: text not allowed (in <ns1:item>)");
    }

    #[test]
    fn test_problem_display_without_element() {
        let problem = ValidationProblem::new(ErrorSeverity::Warning, "odd root");
        assert_eq!(problem.to_string(), "warning: odd root");
    }

    #[test]
    fn test_write_error_display() {
        let err = WriteError::structure("no open start element");
        assert_eq!(err.to_string(), "structure error: no open start element");

        let err = WriteError::UnsupportedOperation {
            operation: "write_raw",
            backend: "tree",
        };
        assert_eq!(err.to_string(), "write_raw is not supported by the tree backend");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: WriteError = io.into();
        assert!(matches!(err, WriteError::Io(_)));
        let _: &dyn std::error::Error = &err;
    }
}
