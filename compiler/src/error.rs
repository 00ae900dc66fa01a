use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic as Report, Label, Severity};
use thiserror::Error;

/// Everything that can go wrong while compiling a reply.
///
/// None of these abort a compilation. Hard errors set the result's
/// `has_error` flag; the rest are recovered where they happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown command: /{0}")]
    UnknownCommand(String),

    #[error("missing required property for /{0}")]
    MissingRequiredProperty(String),

    #[error("command /{0} failed, original text kept")]
    CommandExecutionFailure(String),

    #[error("toolchain function /{name} failed: {message}")]
    ProviderException { name: String, message: String },

    #[error("illegal variable syntax: ${0}")]
    IllegalVariableSyntax(String),

    #[error("no element found for variable: ${0}")]
    UnresolvedVariableLocation(String),

    #[error("command /{name} exceeds the nesting limit of {limit}")]
    RecursionLimit { name: String, limit: usize },

    #[error("spec-kit command /{name} failed: {message}")]
    SpecKitFailure { name: String, message: String },

    #[error("unknown agent: @{0}")]
    UnknownAgent(String),

    #[error("cannot load agents: {0}")]
    AgentRegistry(String),

    #[error("command region contains no command, agent or variable")]
    NoDirective,
}

impl CompileError {
    /// Hard errors mark the whole result as failed.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            CompileError::UnknownCommand(_)
                | CompileError::MissingRequiredProperty(_)
                | CompileError::UnresolvedVariableLocation(_)
        )
    }
}

/// A compile error with its location in the compiled source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub error: CompileError,
    pub span: Option<Range<usize>>,
    pub severity: Severity,
}

impl Diagnostic {
    /// Severity follows the error: hard errors are errors, the rest warnings.
    pub fn new(error: CompileError, span: Option<Range<usize>>) -> Self {
        let severity = if error.is_hard() {
            Severity::Error
        } else {
            Severity::Warning
        };
        Diagnostic {
            error,
            span,
            severity,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Report<usize> {
        let report = Report::new(self.severity).with_message(self.error.to_string());
        match &self.span {
            Some(span) => report.with_labels(vec![Label::primary(file_id, span.clone())]),
            None => report,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}
