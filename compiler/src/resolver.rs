//! Command resolution and invocation.
//!
//! A `/name` directive resolves, in order, to a builtin command, a toolchain
//! function, a spec-kit command or a custom command. Names none of these
//! know are unknown commands, the one hard failure of resolution.

use std::ops::Range;

use devins::{NodeId, NodeKind, SyntaxTree};

use crate::cancel::CancelSignal;
use crate::command::{BodyRequirement, CommandInvocation, CommandKind, ERROR_SENTINEL, PrintCommand};
use crate::compiler::Compiler;
use crate::context::CompilerContext;
use crate::dispatcher::Flow;
use crate::error::{CompileError, Diagnostic};
use crate::registry::CommandExecutor;
use crate::toolchain;

pub(crate) async fn resolve(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    name: &str,
    prop: Option<Range<usize>>,
    ctx: &mut CompilerContext,
    cancel: &CancelSignal,
) -> Flow {
    let registries = compiler.registries();
    let prop = prop.map(|range| tree.slice(range).to_string());

    let kind = match registries.commands.resolve(name) {
        Some(kind) => kind,
        None if toolchain::find_provider(registries.toolchains.as_ref(), name).is_some() => {
            CommandKind::Toolchain
        }
        None => return fallback(compiler, tree, id, name, prop, ctx, cancel).await,
    };

    let prop = if kind.requires_props() {
        match prop {
            Some(prop) => prop,
            None => {
                tracing::warn!(command = name, "missing required property");
                ctx.append(tree.text(id));
                ctx.report(
                    CompileError::MissingRequiredProperty(name.to_string()),
                    Some(tree.node(id).span.clone()),
                );
                return Flow::Continue;
            }
        }
    } else if kind == CommandKind::Toolchain {
        prop.unwrap_or_default()
    } else {
        String::new()
    };

    invoke(compiler, tree, id, kind, name, prop, ctx).await;
    Flow::Continue
}

/// Run a resolved command and fold its result into the output.
async fn invoke(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    kind: CommandKind,
    name: &str,
    prop: String,
    ctx: &mut CompilerContext,
) {
    let body = match kind.body_requirement() {
        BodyRequirement::None => None,
        BodyRequirement::Optional | BodyRequirement::Required => {
            tree.next_code_after(id).and_then(|code| code_body(tree, code))
        }
    };

    if kind.is_local() {
        ctx.is_local_command = true;
    }

    let output = if kind == CommandKind::Toolchain {
        Some(toolchain::execute(compiler, tree, id, name, &prop, body.as_deref(), ctx).await)
    } else {
        let executor: Option<Box<dyn CommandExecutor>> =
            if kind.body_requirement() == BodyRequirement::Required && body.is_none() {
                Some(Box::new(PrintCommand::new(format!("/{}:{}", name, prop))))
            } else {
                compiler.registries().commands.executor(CommandInvocation {
                    kind,
                    name: name.to_string(),
                    prop,
                    body: body.clone(),
                    original_text: tree.text(id).to_string(),
                    source_agent: compiler.options().source_agent.clone(),
                })
            };
        match executor {
            Some(executor) => executor.execute().await,
            None => None,
        }
    };

    match output {
        Some(output) if !output.contains(ERROR_SENTINEL) => {
            if kind.consumes_body() && body.is_some() {
                ctx.skip_next_code = true;
            }
            ctx.append(&output);
        }
        _ => {
            tracing::warn!(command = name, "command failed, keeping original text");
            ctx.append(tree.text(id));
            ctx.report(
                CompileError::CommandExecutionFailure(name.to_string()),
                Some(tree.node(id).span.clone()),
            );
        }
    }
}

/// Spec-kit, then custom commands, then give up.
async fn fallback(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    name: &str,
    prop: Option<String>,
    ctx: &mut CompilerContext,
    cancel: &CancelSignal,
) -> Flow {
    let registries = compiler.registries();
    let span = tree.node(id).span.clone();
    let spec_kit = registries.spec_kit.from_full_name(name);
    let custom = registries.custom.from_string(name);

    let limit = compiler.options().max_depth;
    if (spec_kit.is_some() || custom.is_some()) && compiler.depth() >= limit {
        tracing::warn!(command = name, limit, "command nesting limit reached");
        ctx.append(tree.text(id));
        ctx.report(
            CompileError::RecursionLimit {
                name: name.to_string(),
                limit,
            },
            Some(span),
        );
        return Flow::Continue;
    }

    if let Some(command) = spec_kit {
        let nested = compiler.nested(cancel);
        let arguments = prop.unwrap_or_default();
        match command.execute_with_compiler(&arguments, &nested).await {
            Ok(output) => {
                ctx.append(&output);
                return Flow::Continue;
            }
            Err(e) => {
                tracing::warn!(command = name, "spec-kit command failed: {:#}", e);
                ctx.report(
                    CompileError::SpecKitFailure {
                        name: name.to_string(),
                        message: format!("{:#}", e),
                    },
                    Some(span.clone()),
                );
            }
        }
    }

    if let Some(custom) = custom {
        registries
            .notifier
            .notify("Custom command", &format!("Running custom command /{}", name));
        let result = compiler.nested(cancel).compile_script(&custom.content).await;

        ctx.append(&result.output);
        ctx.has_error |= result.has_error;
        ctx.is_local_command |= result.is_local_command;
        ctx.diagnostics.extend(result.diagnostics.into_iter().map(|d| Diagnostic {
            span: Some(span.clone()),
            ..d
        }));
        if let Some(agent) = result.delegate_agent {
            ctx.delegate_agent = Some(agent);
            return Flow::Delegate;
        }
        return Flow::Continue;
    }

    tracing::warn!(command = name, "unknown command");
    ctx.append(tree.text(id));
    ctx.report(CompileError::UnknownCommand(name.to_string()), Some(span));
    Flow::Continue
}

fn code_body(tree: &SyntaxTree, id: NodeId) -> Option<String> {
    match &tree.node(id).kind {
        NodeKind::Code { body, .. } => Some(tree.slice(body.clone()).to_string()),
        _ => None,
    }
}
