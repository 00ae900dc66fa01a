//! `devins.toml`: compiler options and the registries a compilation runs with.
//!
//! ```toml
//! speckit_dir = ".github/prompts"
//!
//! [compiler]
//! max_depth = 4
//!
//! [[agents]]
//! name = "reviewer"
//!
//! [[custom_commands]]
//! name = "context"
//! content = "/file:README.md"
//!
//! [[toolchains]]
//! name = "docker"
//! template = "docker $PROP"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use devins_compiler::providers::{
    AgentList, CustomCommands, FixedLocator, LogNotifier, NoLocator, ProviderRegistry,
    SpecKitCommands, TemplateSpecKitCommand,
};
use devins_compiler::toolchain::toolchain_provider_name;
use devins_compiler::{
    AgentConfig, CompilerOptions, CustomCommand, DEFAULT_MAX_DEPTH, Registries, SourceLocation,
    ToolchainMetadata, ToolchainProvider,
};
use serde::Deserialize;
use thiserror::Error;

/// File looked up next to the input when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "devins.toml";

const PROMPT_SUFFIX: &str = ".prompt.md";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compiler: CompilerSection,
    pub agents: Vec<AgentConfig>,
    pub custom_commands: Vec<CustomCommand>,
    pub speckit: Vec<SpecKitEntry>,
    /// Directory of `<name>.prompt.md` files, registered as `speckit.<name>`.
    /// Relative to the config file.
    pub speckit_dir: Option<PathBuf>,
    pub toolchains: Vec<ToolchainEntry>,
    pub locator: LocatorSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    pub max_depth: usize,
    pub source_agent: Option<String>,
}

impl Default for CompilerSection {
    fn default() -> Self {
        CompilerSection {
            max_depth: DEFAULT_MAX_DEPTH,
            source_agent: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecKitEntry {
    /// Full command name, e.g. `speckit.plan`.
    pub name: String,
    /// Prompt text; `$ARGUMENTS` is replaced by the command property.
    pub template: String,
}

/// A toolchain function answered from a template.
///
/// `$PROP`, `$ARGS` and `$ORIGIN` in `template` are substituted. With `fail`
/// set the function always errors with that message.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub fail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocatorSection {
    /// File reported as the active editor location. Without it, `$variables`
    /// cannot be bound.
    pub active_file: Option<String>,
}

impl Config {
    /// Load a config file. `Ok(None)` when the file does not exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    pub fn options(&self) -> CompilerOptions {
        CompilerOptions {
            max_depth: self.compiler.max_depth,
            source_agent: self.compiler.source_agent.clone(),
        }
    }

    /// Build the registries described by this config, on top of the dry-run
    /// builtin commands. Relative paths resolve against `base_dir`.
    pub fn registries(&self, base_dir: &Path) -> Result<Registries> {
        let toolchains = ProviderRegistry::new();
        for entry in &self.toolchains {
            toolchains
                .register(Arc::new(TemplateToolchain::new(entry.clone())))
                .with_context(|| format!("cannot register toolchain '{}'", entry.name))?;
        }

        let mut spec_kit = SpecKitCommands::new();
        if let Some(dir) = &self.speckit_dir {
            load_prompt_dir(&base_dir.join(dir), &mut spec_kit)?;
        }
        // inline entries take precedence over prompt files
        for entry in &self.speckit {
            spec_kit.insert(
                entry.name.clone(),
                Arc::new(TemplateSpecKitCommand::new(entry.template.clone())),
            );
        }

        let mut custom = CustomCommands::new();
        for command in &self.custom_commands {
            custom.insert(command.clone());
        }

        let registries = Registries::default()
            .with_toolchains(Arc::new(toolchains))
            .with_agents(Arc::new(AgentList::new(self.agents.clone())))
            .with_spec_kit(Arc::new(spec_kit))
            .with_custom(Arc::new(custom))
            .with_notifier(Arc::new(LogNotifier));

        Ok(match &self.locator.active_file {
            Some(path) => registries.with_locator(Arc::new(FixedLocator(SourceLocation {
                path: path.clone(),
                offset: None,
            }))),
            None => registries.with_locator(Arc::new(NoLocator)),
        })
    }
}

/// Register every `<name>.prompt.md` in `dir` as `speckit.<name>`.
fn load_prompt_dir(dir: &Path, spec_kit: &mut SpecKitCommands) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read spec-kit directory {}", dir.display()))?;

    let mut prompts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PROMPT_SUFFIX))
        })
        .collect();
    prompts.sort();

    for path in prompts {
        let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(PROMPT_SUFFIX))
        else {
            continue;
        };
        if name.is_empty() {
            bail!("prompt file without a name: {}", path.display());
        }
        let template = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read prompt {}", path.display()))?;
        tracing::debug!(command = %format!("speckit.{}", name), "loaded prompt");
        spec_kit.insert(
            format!("speckit.{}", name),
            Arc::new(TemplateSpecKitCommand::new(template)),
        );
    }
    Ok(())
}

// ----- Template toolchain -----

struct TemplateToolchain {
    key: String,
    entry: ToolchainEntry,
}

impl TemplateToolchain {
    fn new(entry: ToolchainEntry) -> Self {
        TemplateToolchain {
            key: toolchain_provider_name(&entry.name),
            entry,
        }
    }
}

#[async_trait::async_trait]
impl ToolchainProvider for TemplateToolchain {
    fn key(&self) -> &str {
        &self.key
    }

    fn func_names(&self) -> Vec<String> {
        std::iter::once(self.entry.name.clone())
            .chain(self.entry.aliases.iter().cloned())
            .collect()
    }

    async fn execute(
        &self,
        prop: &str,
        args: &[String],
        _metadata: &ToolchainMetadata,
        origin: &str,
    ) -> Result<String> {
        if let Some(message) = &self.entry.fail {
            bail!("{}", message);
        }
        Ok(self
            .entry
            .template
            .replace("$PROP", prop)
            .replace("$ARGS", &args.join("\n"))
            .replace("$ORIGIN", origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devins_compiler::Compiler;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from_path(temp_dir.path().join("devins.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.options(), CompilerOptions::default());
        assert!(config.agents.is_empty());
        assert!(config.speckit_dir.is_none());
    }

    #[test]
    fn malformed_config_names_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("devins.toml");
        std::fs::write(&path, "[compiler\nmax_depth = 2").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("devins.toml"));
    }

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(
            r#"
[compiler]
max_depth = 2
source_agent = "planner"

[[agents]]
name = "reviewer"
description = "Reviews diffs"

[[custom_commands]]
name = "context"
content = "/file:README.md"

[[speckit]]
name = "speckit.plan"
template = "Plan: $ARGUMENTS"

[[toolchains]]
name = "docker"
aliases = ["compose"]
template = "docker $PROP"

[locator]
active_file = "src/main.rs"
"#,
        )
        .unwrap();

        assert_eq!(config.options().max_depth, 2);
        assert_eq!(config.options().source_agent.as_deref(), Some("planner"));
        assert_eq!(config.agents[0].name, "reviewer");
        assert_eq!(config.custom_commands[0].content, "/file:README.md");
        assert_eq!(config.speckit[0].name, "speckit.plan");
        assert_eq!(config.toolchains[0].aliases, vec!["compose"]);
        assert_eq!(config.locator.active_file.as_deref(), Some("src/main.rs"));
    }

    #[tokio::test]
    async fn configured_registries_compile() {
        let config: Config = toml::from_str(
            r#"
[[custom_commands]]
name = "context"
content = "/dir:src"

[[toolchains]]
name = "docker"
aliases = ["compose"]
template = "ran $ORIGIN with $PROP"
"#,
        )
        .unwrap();
        let registries = config.registries(Path::new(".")).unwrap();
        let compiler = Compiler::new(registries).with_options(config.options());

        let result = compiler
            .compile("<cmd>/context</cmd>\n<cmd>/compose:up</cmd>")
            .await;
        assert_eq!(result.output, "{{DIR:src}}\nran compose:up with up");
        assert!(!result.has_error);
    }

    #[tokio::test]
    async fn prompt_directory_registers_spec_kit_commands() {
        let temp_dir = TempDir::new().unwrap();
        let prompts = temp_dir.path().join("prompts");
        std::fs::create_dir(&prompts).unwrap();
        std::fs::write(prompts.join("plan.prompt.md"), "Plan $ARGUMENTS").unwrap();
        std::fs::write(prompts.join("notes.md"), "ignored").unwrap();

        let config = Config {
            speckit_dir: Some(PathBuf::from("prompts")),
            ..Config::default()
        };
        let registries = config.registries(temp_dir.path()).unwrap();
        let result = Compiler::new(registries)
            .compile("<cmd>/speckit.plan:login</cmd>")
            .await;
        assert_eq!(result.output, "Plan login");
    }

    #[test]
    fn missing_prompt_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            speckit_dir: Some(PathBuf::from("nope")),
            ..Config::default()
        };
        assert!(config.registries(temp_dir.path()).is_err());
    }

    #[test]
    fn duplicate_toolchains_are_rejected() {
        let entry = ToolchainEntry {
            name: "docker".into(),
            aliases: vec![],
            template: String::new(),
            fail: None,
        };
        let config = Config {
            toolchains: vec![entry.clone(), entry],
            ..Config::default()
        };
        let err = config.registries(Path::new(".")).unwrap_err();
        assert!(format!("{:#}", err).contains("already registered"));
    }
}
