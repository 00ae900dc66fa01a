//! Toolchain function invocation.
//!
//! Providers are external code. Whatever they do, error or panic, stays on
//! this side of the boundary and comes back as an error string in the output.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use devins::{NodeId, SyntaxTree};
use futures_util::FutureExt;

use crate::command::ERROR_SENTINEL;
use crate::compiler::Compiler;
use crate::context::CompilerContext;
use crate::error::CompileError;
use crate::registry::{ToolchainMetadata, ToolchainProvider, ToolchainRegistry};

/// Registry key of the provider serving `name`: `docker` is served by
/// `DockerFunctionProvider`.
pub fn toolchain_provider_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{}FunctionProvider", first.to_uppercase(), chars.as_str()),
        None => "FunctionProvider".to_string(),
    }
}

/// The provider for `name`: by derived key first, then the first provider
/// listing `name` among its functions.
pub fn find_provider(registry: &dyn ToolchainRegistry, name: &str) -> Option<Arc<dyn ToolchainProvider>> {
    registry.lookup(&toolchain_provider_name(name)).or_else(|| {
        registry
            .all()
            .into_iter()
            .find(|provider| provider.func_names().iter().any(|func| func == name))
    })
}

pub(crate) async fn execute(
    compiler: &Compiler,
    tree: &SyntaxTree,
    id: NodeId,
    name: &str,
    prop: &str,
    body: Option<&str>,
    ctx: &mut CompilerContext,
) -> String {
    let Some(provider) = find_provider(compiler.registries().toolchains.as_ref(), name) else {
        return format!("{} toolchain function not found: {}", ERROR_SENTINEL, name);
    };

    let span = tree.node(id).span.clone();
    let args: Vec<String> = body.map(|code| vec![code.to_string()]).unwrap_or_default();
    let metadata = ToolchainMetadata {
        source_agent: compiler.options().source_agent.clone(),
        line: tree.line_of(span.start),
    };
    let origin = tree.text(id).trim_start_matches('/');

    tracing::debug!(function = name, provider = provider.key(), "calling toolchain function");
    let call = AssertUnwindSafe(provider.execute(prop, &args, &metadata, origin))
        .catch_unwind()
        .await;

    let message = match call {
        Ok(Ok(output)) => return output,
        Ok(Err(e)) => format!("{:#}", e),
        Err(panic) => panic_message(panic.as_ref()),
    };

    let error = format!(
        "Error executing toolchain function: {}:{}, {}\nError: {}\nPlease check the command and try again.",
        name,
        prop,
        body.unwrap_or(""),
        message
    );
    tracing::warn!(function = name, "toolchain function failed: {}", message);
    compiler
        .registries()
        .notifier
        .notify("Toolchain function failed", &error);
    ctx.report(
        CompileError::ProviderException {
            name: name.to_string(),
            message,
        },
        Some(span),
    );
    error
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "provider panicked".to_string()
    }
}
