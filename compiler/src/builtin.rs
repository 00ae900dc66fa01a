//! Dry-run command registry.
//!
//! Every builtin command resolves, and executing one renders a placeholder
//! such as `{{WRITE_FILE:src/main.rs}}` followed by its body. Hosts that
//! actually touch the filesystem supply their own [`CommandRegistry`].

use crate::command::{CommandInvocation, CommandKind};
use crate::registry::{CommandExecutor, CommandRegistry};

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCommands;

impl CommandRegistry for BuiltinCommands {
    fn resolve(&self, name: &str) -> Option<CommandKind> {
        // toolchain functions resolve through their providers, never by name
        CommandKind::from_name(name).filter(|kind| *kind != CommandKind::Toolchain)
    }

    fn executor(&self, invocation: CommandInvocation) -> Option<Box<dyn CommandExecutor>> {
        Some(Box::new(Placeholder {
            output: render(&invocation),
        }))
    }
}

struct Placeholder {
    output: String,
}

#[async_trait::async_trait]
impl CommandExecutor for Placeholder {
    async fn execute(&self) -> Option<String> {
        Some(self.output.clone())
    }
}

fn placeholder_name(kind: CommandKind) -> String {
    match kind {
        CommandKind::File => "FILE_CONTENT".into(),
        CommandKind::Symbol => "SYMBOL_INFO".into(),
        CommandKind::Write => "WRITE_FILE".into(),
        CommandKind::Run => "RUN_COMMAND".into(),
        CommandKind::Shell => "SHELL_EXEC".into(),
        CommandKind::LocalSearch | CommandKind::RipgrepSearch => "SEARCH_RESULTS".into(),
        CommandKind::Patch => "APPLY_PATCH".into(),
        CommandKind::Browse => "BROWSE_URL".into(),
        other => other.command_name().to_uppercase().replace('-', "_"),
    }
}

/// The placeholder text for one invocation.
pub fn render(invocation: &CommandInvocation) -> String {
    let mut output = format!("{{{{{}:{}}}}}", placeholder_name(invocation.kind), invocation.prop);
    if let Some(body) = &invocation.body {
        output.push('\n');
        output.push_str(body);
    }
    output
}
