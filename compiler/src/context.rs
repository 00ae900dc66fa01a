use std::ops::Range;

use crate::error::{CompileError, Diagnostic};
use crate::registry::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    String,
}

/// One declared `$variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub name: String,
    pub kind: VariableKind,
    /// 0-based line of the reference in the compiled source.
    pub line: usize,
}

/// Declared variables in declaration order. Repeated names are kept; each
/// occurrence is its own declaration site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    entries: Vec<VariableEntry>,
}

impl VariableTable {
    pub fn add_variable(&mut self, name: impl Into<String>, kind: VariableKind, line: usize) {
        self.entries.push(VariableEntry {
            name: name.into(),
            kind,
            line,
        });
    }

    pub fn entries(&self) -> &[VariableEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&VariableEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable state of one compilation run.
#[derive(Debug, Default)]
pub struct CompilerContext {
    output: String,
    /// Set when the next block written to `output` needs a separating newline.
    pending_separator: bool,
    pub has_error: bool,
    pub variables: VariableTable,
    pub skip_next_code: bool,
    pub is_local_command: bool,
    pub delegate_agent: Option<AgentConfig>,
    pub diagnostics: Vec<Diagnostic>,
    pub cancelled: bool,
}

impl CompilerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.pending_separator {
            if !self.output.ends_with('\n') {
                self.output.push('\n');
            }
            self.pending_separator = false;
        }
        self.output.push_str(text);
    }

    /// Mark the start of a new top-level block.
    pub fn begin_block(&mut self) {
        self.pending_separator = !self.output.is_empty();
    }

    /// Record a diagnostic; hard errors also set `has_error`.
    pub fn report(&mut self, error: CompileError, span: Option<Range<usize>>) {
        if error.is_hard() {
            self.has_error = true;
        }
        self.diagnostics.push(Diagnostic::new(error, span));
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_newline_separated() {
        let mut ctx = CompilerContext::new();
        ctx.begin_block();
        ctx.append("first");
        ctx.begin_block();
        ctx.begin_block();
        ctx.append("second");
        assert_eq!(ctx.output(), "first\nsecond");
    }

    #[test]
    fn empty_blocks_add_nothing() {
        let mut ctx = CompilerContext::new();
        ctx.begin_block();
        ctx.append("line\n");
        ctx.begin_block();
        ctx.append("");
        assert_eq!(ctx.output(), "line\n");
    }

    #[test]
    fn only_hard_errors_flag_the_run() {
        let mut ctx = CompilerContext::new();
        ctx.report(CompileError::IllegalVariableSyntax("9".into()), None);
        assert!(!ctx.has_error);
        ctx.report(CompileError::UnknownCommand("nope".into()), Some(0..5));
        assert!(ctx.has_error);
        assert_eq!(ctx.diagnostics.len(), 2);
    }

    #[test]
    fn duplicate_variables_are_kept() {
        let mut table = VariableTable::default();
        table.add_variable("input", VariableKind::String, 0);
        table.add_variable("input", VariableKind::String, 3);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("input").map(|e| e.line), Some(0));
    }
}
