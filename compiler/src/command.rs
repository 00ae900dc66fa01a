//! The closed set of builtin command kinds and their metadata.

use crate::registry::CommandExecutor;

/// Marker a command embeds in its output to signal failure.
pub const ERROR_SENTINEL: &str = "<DevInsError>";

/// Whether a command takes the code block following it as its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRequirement {
    None,
    /// Used when present.
    Optional,
    /// Without a body the command degrades to printing its own label.
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    File,
    Rev,
    Symbol,
    Write,
    Patch,
    EditFile,
    Run,
    LibraryVersionFetch,
    Shell,
    Commit,
    Browse,
    Refactor,
    Structure,
    Dir,
    Database,
    LocalSearch,
    Related,
    Open,
    RipgrepSearch,
    Rule,
    Usage,
    /// Dynamically resolved toolchain function.
    Toolchain,
    LaunchProcess,
    ListProcesses,
    KillProcess,
    ReadProcessOutput,
    WriteProcessInput,
    A2a,
    Agents,
}

impl CommandKind {
    pub const ALL: &'static [CommandKind] = &[
        CommandKind::File,
        CommandKind::Rev,
        CommandKind::Symbol,
        CommandKind::Write,
        CommandKind::Patch,
        CommandKind::EditFile,
        CommandKind::Run,
        CommandKind::LibraryVersionFetch,
        CommandKind::Shell,
        CommandKind::Commit,
        CommandKind::Browse,
        CommandKind::Refactor,
        CommandKind::Structure,
        CommandKind::Dir,
        CommandKind::Database,
        CommandKind::LocalSearch,
        CommandKind::Related,
        CommandKind::Open,
        CommandKind::RipgrepSearch,
        CommandKind::Rule,
        CommandKind::Usage,
        CommandKind::Toolchain,
        CommandKind::LaunchProcess,
        CommandKind::ListProcesses,
        CommandKind::KillProcess,
        CommandKind::ReadProcessOutput,
        CommandKind::WriteProcessInput,
        CommandKind::A2a,
        CommandKind::Agents,
    ];

    pub fn from_name(name: &str) -> Option<CommandKind> {
        CommandKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.command_name() == name)
    }

    /// The name written after `/`.
    pub fn command_name(self) -> &'static str {
        match self {
            CommandKind::File => "file",
            CommandKind::Rev => "rev",
            CommandKind::Symbol => "symbol",
            CommandKind::Write => "write",
            CommandKind::Patch => "patch",
            CommandKind::EditFile => "edit_file",
            CommandKind::Run => "run",
            CommandKind::LibraryVersionFetch => "library-version-fetch",
            CommandKind::Shell => "shell",
            CommandKind::Commit => "commit",
            CommandKind::Browse => "browse",
            CommandKind::Refactor => "refactor",
            CommandKind::Structure => "structure",
            CommandKind::Dir => "dir",
            CommandKind::Database => "database",
            CommandKind::LocalSearch => "localSearch",
            CommandKind::Related => "related",
            CommandKind::Open => "open",
            CommandKind::RipgrepSearch => "ripgrepSearch",
            CommandKind::Rule => "rule",
            CommandKind::Usage => "usage",
            CommandKind::Toolchain => "x",
            CommandKind::LaunchProcess => "launch-process",
            CommandKind::ListProcesses => "list-processes",
            CommandKind::KillProcess => "kill-process",
            CommandKind::ReadProcessOutput => "read-process-output",
            CommandKind::WriteProcessInput => "write-process-input",
            CommandKind::A2a => "a2a",
            CommandKind::Agents => "agents",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CommandKind::File => "Read file",
            CommandKind::Rev => "Read revision",
            CommandKind::Symbol => "Read symbol",
            CommandKind::Write => "Write file",
            CommandKind::Patch => "Apply patch",
            CommandKind::EditFile => "Edit file",
            CommandKind::Run => "Run",
            CommandKind::LibraryVersionFetch => "Fetch library version",
            CommandKind::Shell => "Shell",
            CommandKind::Commit => "Commit",
            CommandKind::Browse => "Browse",
            CommandKind::Refactor => "Refactor",
            CommandKind::Structure => "File structure",
            CommandKind::Dir => "List directory",
            CommandKind::Database => "Database",
            CommandKind::LocalSearch => "Local search",
            CommandKind::Related => "Related code",
            CommandKind::Open => "Open file",
            CommandKind::RipgrepSearch => "Ripgrep search",
            CommandKind::Rule => "Project rule",
            CommandKind::Usage => "Find usages",
            CommandKind::Toolchain => "Toolchain function",
            CommandKind::LaunchProcess => "Launch process",
            CommandKind::ListProcesses => "List processes",
            CommandKind::KillProcess => "Kill process",
            CommandKind::ReadProcessOutput => "Read process output",
            CommandKind::WriteProcessInput => "Write process input",
            CommandKind::A2a => "Agent to agent",
            CommandKind::Agents => "List agents",
        }
    }

    /// Whether `/name` must be followed by `:property`.
    pub fn requires_props(self) -> bool {
        !matches!(
            self,
            CommandKind::Patch
                | CommandKind::EditFile
                | CommandKind::Commit
                | CommandKind::Toolchain
                | CommandKind::ListProcesses
                | CommandKind::Agents
        )
    }

    pub fn body_requirement(self) -> BodyRequirement {
        match self {
            CommandKind::Write | CommandKind::Patch | CommandKind::EditFile | CommandKind::Commit => {
                BodyRequirement::Required
            }
            CommandKind::Run
            | CommandKind::Database
            | CommandKind::Shell
            | CommandKind::Toolchain => BodyRequirement::Optional,
            _ => BodyRequirement::None,
        }
    }

    /// Commands that take the following code block, which must then not be
    /// emitted again.
    pub fn consumes_body(self) -> bool {
        self.body_requirement() != BodyRequirement::None
    }

    /// Whether running the command changes the local workspace.
    pub fn is_local(self) -> bool {
        !matches!(self, CommandKind::File | CommandKind::Rev)
    }
}

/// One resolved command, handed to the registry for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub kind: CommandKind,
    /// Name as written; differs from `kind.command_name()` for toolchain functions.
    pub name: String,
    pub prop: String,
    pub body: Option<String>,
    /// The directive text as it appeared in the source.
    pub original_text: String,
    pub source_agent: Option<String>,
}

/// Prints a fixed label. Used when a command's required body is missing.
pub struct PrintCommand {
    label: String,
}

impl PrintCommand {
    pub fn new(label: impl Into<String>) -> Self {
        PrintCommand {
            label: label.into(),
        }
    }
}

#[async_trait::async_trait]
impl CommandExecutor for PrintCommand {
    async fn execute(&self) -> Option<String> {
        Some(self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_name(kind.command_name()), Some(*kind));
        }
        assert_eq!(CommandKind::from_name("frobnicate"), None);
        assert_eq!(CommandKind::from_name("File"), None);
    }

    #[test]
    fn body_consumers() {
        let consumers: Vec<_> = CommandKind::ALL
            .iter()
            .filter(|k| k.consumes_body())
            .map(|k| k.command_name())
            .collect();
        assert_eq!(
            consumers,
            vec!["write", "patch", "edit_file", "run", "shell", "commit", "database", "x"]
        );
    }

    #[test]
    fn reads_are_not_local() {
        assert!(!CommandKind::File.is_local());
        assert!(!CommandKind::Rev.is_local());
        assert!(CommandKind::Write.is_local());
    }
}
