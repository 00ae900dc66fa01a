//! Routes each directive to the component that handles it.

use devins::{Directive, NodeId, SyntaxTree};

use crate::cancel::CancelSignal;
use crate::compiler::Compiler;
use crate::context::CompilerContext;
use crate::error::CompileError;
use crate::{resolver, variable};

/// What the pipeline does after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// An agent took over; nothing after this node runs.
    Delegate,
    Cancelled,
}

pub(crate) async fn dispatch(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    directive: &Directive,
    ctx: &mut CompilerContext,
    cancel: &CancelSignal,
) -> Flow {
    match directive {
        Directive::Command { name, prop } => {
            resolver::resolve(compiler, tree, id, name, prop.clone(), ctx, cancel).await
        }
        Directive::Agent { name } => delegate(compiler, tree, id, name, ctx).await,
        Directive::Variable { name } => {
            variable::bind(compiler, tree, id, name, ctx);
            Flow::Continue
        }
    }
}

async fn delegate(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    name: &str,
    ctx: &mut CompilerContext,
) -> Flow {
    let span = tree.node(id).span.clone();
    let agents = match compiler.registries().agents.load_agents_for_project().await {
        Ok(agents) => agents,
        Err(e) => {
            tracing::warn!(agent = name, "cannot load agents: {:#}", e);
            ctx.report(CompileError::AgentRegistry(format!("{:#}", e)), Some(span));
            ctx.append(tree.text(id));
            return Flow::Continue;
        }
    };

    match agents.into_iter().find(|agent| agent.name == name) {
        Some(agent) => {
            tracing::info!(agent = %agent.name, "delegating to agent");
            ctx.delegate_agent = Some(agent);
            Flow::Delegate
        }
        None => {
            ctx.report(CompileError::UnknownAgent(name.to_string()), Some(span));
            ctx.append(tree.text(id));
            Flow::Continue
        }
    }
}
