//! `$variable` binding.

use devins::{NodeId, SyntaxTree};

use crate::command::ERROR_SENTINEL;
use crate::compiler::Compiler;
use crate::context::{CompilerContext, VariableKind};
use crate::error::CompileError;

pub(crate) fn bind(compiler: &Compiler, tree: &SyntaxTree, id: NodeId, name: &str, ctx: &mut CompilerContext) {
    let span = tree.node(id).span.clone();
    let token = tree.text(id);

    if !is_identifier(name) {
        tracing::warn!(variable = name, "illegal variable syntax");
        ctx.report(CompileError::IllegalVariableSyntax(name.to_string()), Some(span));
        ctx.append(token);
        return;
    }

    let locator = &compiler.registries().locator;
    if locator
        .active_location()
        .or_else(|| locator.default_location())
        .is_none()
    {
        ctx.append(&format!("{} No element found for variable: {}", ERROR_SENTINEL, token));
        ctx.report(CompileError::UnresolvedVariableLocation(name.to_string()), Some(span));
        return;
    }

    ctx.variables
        .add_variable(name, VariableKind::String, tree.line_of(span.start));
    ctx.append(token);
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
