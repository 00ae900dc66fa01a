//! In-memory collaborator implementations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Result, bail};

use crate::compiler::Compiler;
use crate::registry::{
    AgentConfig, AgentRegistry, CustomCommand, CustomCommandRegistry, Notifier, SourceLocation,
    SourceLocator, SpecKitCommand, SpecKitRegistry, ToolchainProvider, ToolchainRegistry,
};

// ----- Toolchain providers -----

/// Toolchain providers keyed by provider key, iterated in key order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<BTreeMap<String, Arc<dyn ToolchainProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Rejects duplicate keys.
    pub fn register(&self, provider: Arc<dyn ToolchainProvider>) -> Result<()> {
        let key = provider.key().to_string();
        let mut map = self
            .providers
            .write()
            .map_err(|e| anyhow::anyhow!("provider registry lock poisoned: {e}"))?;
        if map.contains_key(&key) {
            bail!("toolchain provider already registered: {key}");
        }
        map.insert(key, provider);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ToolchainRegistry for ProviderRegistry {
    fn lookup(&self, key: &str) -> Option<Arc<dyn ToolchainProvider>> {
        let map = self.providers.read().ok()?;
        map.get(key).cloned()
    }

    fn all(&self) -> Vec<Arc<dyn ToolchainProvider>> {
        self.providers
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }
}

// ----- Agents -----

#[derive(Debug, Clone, Default)]
pub struct AgentList {
    agents: Vec<AgentConfig>,
}

impl AgentList {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        AgentList { agents }
    }
}

#[async_trait::async_trait]
impl AgentRegistry for AgentList {
    async fn load_agents_for_project(&self) -> Result<Vec<AgentConfig>> {
        Ok(self.agents.clone())
    }
}

// ----- Spec-kit -----

#[derive(Clone, Default)]
pub struct SpecKitCommands {
    commands: BTreeMap<String, Arc<dyn SpecKitCommand>>,
}

impl SpecKitCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, command: Arc<dyn SpecKitCommand>) {
        self.commands.insert(name.into(), command);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl SpecKitRegistry for SpecKitCommands {
    fn from_full_name(&self, name: &str) -> Option<Arc<dyn SpecKitCommand>> {
        self.commands.get(name).cloned()
    }
}

/// A prompt template. `$ARGUMENTS` is replaced by the command property and
/// the result is compiled as DevIns.
#[derive(Debug, Clone)]
pub struct TemplateSpecKitCommand {
    template: String,
}

impl TemplateSpecKitCommand {
    pub fn new(template: impl Into<String>) -> Self {
        TemplateSpecKitCommand {
            template: template.into(),
        }
    }
}

#[async_trait::async_trait]
impl SpecKitCommand for TemplateSpecKitCommand {
    async fn execute_with_compiler(&self, arguments: &str, compiler: &Compiler) -> Result<String> {
        let source = self.template.replace("$ARGUMENTS", arguments);
        let result = compiler.compile_script(&source).await;
        if result.cancelled {
            bail!("compilation cancelled");
        }
        Ok(result.output)
    }
}

// ----- Custom commands -----

#[derive(Debug, Clone, Default)]
pub struct CustomCommands {
    commands: BTreeMap<String, CustomCommand>,
}

impl CustomCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: CustomCommand) {
        self.commands.insert(command.name.clone(), command);
    }
}

impl CustomCommandRegistry for CustomCommands {
    fn from_string(&self, name: &str) -> Option<CustomCommand> {
        self.commands.get(name).cloned()
    }
}

// ----- Locators -----

/// No editor: variables never resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocator;

impl SourceLocator for NoLocator {
    fn active_location(&self) -> Option<SourceLocation> {
        None
    }
}

/// Always reports the same location.
#[derive(Debug, Clone)]
pub struct FixedLocator(pub SourceLocation);

impl SourceLocator for FixedLocator {
    fn active_location(&self) -> Option<SourceLocation> {
        Some(self.0.clone())
    }
}

// ----- Notifiers -----

/// Sends notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::warn!(title, "{}", message);
    }
}

/// Keeps notifications for later inspection.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(title, message)` pairs in the order they were raised.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, title: &str, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((title.to_string(), message.to_string()));
        }
    }
}
