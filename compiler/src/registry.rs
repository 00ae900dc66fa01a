//! Collaborator traits the compiler is handed at construction.
//!
//! Registries are read-only for the duration of a compilation. Every trait
//! is `Send + Sync` so a single [`Registries`] value can be shared by
//! concurrent compilations.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::builtin::BuiltinCommands;
use crate::command::{CommandInvocation, CommandKind};
use crate::compiler::Compiler;
use crate::providers::{AgentList, CustomCommands, LogNotifier, NoLocator, ProviderRegistry, SpecKitCommands};

// ----- Commands -----

/// Maps command names to kinds and kinds to executable units.
pub trait CommandRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<CommandKind>;

    /// Build the executor for one invocation. `None` means the command is
    /// not available in this host.
    fn executor(&self, invocation: CommandInvocation) -> Option<Box<dyn CommandExecutor>>;
}

/// A single command invocation, ready to run.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// `None`, or output containing the error sentinel, means failure.
    async fn execute(&self) -> Option<String>;
}

// ----- Toolchains -----

/// Extra context passed to a toolchain function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainMetadata {
    pub source_agent: Option<String>,
    /// 0-based line of the directive in the compiled source.
    pub line: usize,
}

#[async_trait::async_trait]
pub trait ToolchainProvider: Send + Sync {
    /// Registry key, e.g. `DockerFunctionProvider`.
    fn key(&self) -> &str;

    /// Command names this provider answers to.
    fn func_names(&self) -> Vec<String>;

    async fn execute(
        &self,
        prop: &str,
        args: &[String],
        metadata: &ToolchainMetadata,
        origin: &str,
    ) -> Result<String>;
}

pub trait ToolchainRegistry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<Arc<dyn ToolchainProvider>>;

    /// All providers, in a stable order.
    fn all(&self) -> Vec<Arc<dyn ToolchainProvider>>;
}

// ----- Agents -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[async_trait::async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn load_agents_for_project(&self) -> Result<Vec<AgentConfig>>;
}

// ----- Spec-kit and custom commands -----

pub trait SpecKitRegistry: Send + Sync {
    fn from_full_name(&self, name: &str) -> Option<Arc<dyn SpecKitCommand>>;
}

/// A project-level prompt command.
#[async_trait::async_trait]
pub trait SpecKitCommand: Send + Sync {
    /// Run the command. `compiler` compiles any DevIns the command expands to
    /// and is already one level deeper than the caller.
    async fn execute_with_compiler(&self, arguments: &str, compiler: &Compiler) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub name: String,
    /// DevIns source compiled in place of the command.
    pub content: String,
}

pub trait CustomCommandRegistry: Send + Sync {
    fn from_string(&self, name: &str) -> Option<CustomCommand>;
}

// ----- Editor context -----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
    pub offset: Option<usize>,
}

/// Where the user currently is, for binding variables.
pub trait SourceLocator: Send + Sync {
    fn active_location(&self) -> Option<SourceLocation>;

    fn default_location(&self) -> Option<SourceLocation> {
        None
    }
}

/// User-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

// ----- Bundle -----

/// All collaborators of one compiler.
#[derive(Clone)]
pub struct Registries {
    pub commands: Arc<dyn CommandRegistry>,
    pub toolchains: Arc<dyn ToolchainRegistry>,
    pub agents: Arc<dyn AgentRegistry>,
    pub spec_kit: Arc<dyn SpecKitRegistry>,
    pub custom: Arc<dyn CustomCommandRegistry>,
    pub locator: Arc<dyn SourceLocator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Registries {
    /// Registries with the given command registry and nothing else registered.
    pub fn new(commands: Arc<dyn CommandRegistry>) -> Self {
        Registries {
            commands,
            toolchains: Arc::new(ProviderRegistry::new()),
            agents: Arc::new(AgentList::default()),
            spec_kit: Arc::new(SpecKitCommands::new()),
            custom: Arc::new(CustomCommands::new()),
            locator: Arc::new(NoLocator),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_toolchains(mut self, toolchains: Arc<dyn ToolchainRegistry>) -> Self {
        self.toolchains = toolchains;
        self
    }

    pub fn with_agents(mut self, agents: Arc<dyn AgentRegistry>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_spec_kit(mut self, spec_kit: Arc<dyn SpecKitRegistry>) -> Self {
        self.spec_kit = spec_kit;
        self
    }

    pub fn with_custom(mut self, custom: Arc<dyn CustomCommandRegistry>) -> Self {
        self.custom = custom;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn SourceLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries").finish_non_exhaustive()
    }
}

impl Default for Registries {
    fn default() -> Self {
        Registries::new(Arc::new(BuiltinCommands))
    }
}
