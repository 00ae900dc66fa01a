use crate::context::{CompilerContext, VariableTable};
use crate::error::Diagnostic;
use crate::registry::AgentConfig;

/// The outcome of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    pub input: String,
    pub output: String,
    /// Set by hard errors only. Callers use it to decide whether to re-prompt.
    pub has_error: bool,
    pub variables: VariableTable,
    pub is_local_command: bool,
    /// Set when an `@agent` reference took over; later regions were not run.
    pub delegate_agent: Option<AgentConfig>,
    pub diagnostics: Vec<Diagnostic>,
    /// The run stopped early on request. Not an error.
    pub cancelled: bool,
}

impl CompilationResult {
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_warning())
    }
}

/// Reads the final context into a result.
pub struct OutputAssembler;

impl OutputAssembler {
    pub fn finish(input: String, mut ctx: CompilerContext) -> CompilationResult {
        let output = ctx.take_output();
        CompilationResult {
            input,
            output,
            has_error: ctx.has_error,
            variables: ctx.variables,
            is_local_command: ctx.is_local_command,
            delegate_agent: ctx.delegate_agent,
            diagnostics: ctx.diagnostics,
            cancelled: ctx.cancelled,
        }
    }
}
