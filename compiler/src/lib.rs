pub mod builtin;
pub mod cancel;
pub mod command;
pub mod compiler;
pub mod context;
mod dispatcher;
pub mod error;
pub mod output;
pub mod providers;
pub mod registry;
mod resolver;
pub mod toolchain;
mod variable;

pub use builtin::BuiltinCommands;
pub use cancel::{CancelHandle, CancelSignal};
pub use command::{BodyRequirement, CommandInvocation, CommandKind, ERROR_SENTINEL};
pub use compiler::{Compiler, CompilerOptions, DEFAULT_MAX_DEPTH};
pub use context::{CompilerContext, VariableEntry, VariableKind, VariableTable};
pub use error::{CompileError, Diagnostic};
pub use output::CompilationResult;
pub use registry::{
    AgentConfig, AgentRegistry, CommandExecutor, CommandRegistry, CustomCommand,
    CustomCommandRegistry, Notifier, Registries, SourceLocation, SourceLocator, SpecKitCommand,
    SpecKitRegistry, ToolchainMetadata, ToolchainProvider, ToolchainRegistry,
};
