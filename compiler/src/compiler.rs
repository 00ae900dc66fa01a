use std::sync::Arc;

use devins::{BlockParser, LanguageRegistry, NodeId, NodeKind, SyntaxTree};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::cancel::CancelSignal;
use crate::context::CompilerContext;
use crate::dispatcher::{self, Flow};
use crate::error::CompileError;
use crate::output::{CompilationResult, OutputAssembler};
use crate::registry::Registries;

/// Default bound on custom command nesting.
pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// How deep spec-kit and custom commands may expand into nested compilations.
    pub max_depth: usize,
    /// Agent that produced the text, passed along to commands.
    pub source_agent: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            source_agent: None,
        }
    }
}

/// Compiles model replies into command output.
///
/// Command regions run strictly in source order; each command's output is
/// appended before the next command starts. A compiler is cheap to clone
/// and holds no per-run state.
#[derive(Clone)]
pub struct Compiler {
    registries: Registries,
    parser: BlockParser,
    options: CompilerOptions,
    depth: usize,
    cancel: CancelSignal,
}

impl Compiler {
    pub fn new(registries: Registries) -> Self {
        Compiler {
            registries,
            parser: BlockParser::new(),
            options: CompilerOptions::default(),
            depth: 0,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_languages(mut self, languages: Arc<dyn LanguageRegistry>) -> Self {
        self.parser = BlockParser::with_languages(languages);
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Nesting level; 0 for a top-level compilation.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// A compiler one nesting level deeper, sharing this run's cancellation.
    pub(crate) fn nested(&self, cancel: &CancelSignal) -> Compiler {
        Compiler {
            depth: self.depth + 1,
            cancel: cancel.clone(),
            ..self.clone()
        }
    }

    // ----- Public API -----

    /// Compile a reply: command regions are executed, everything else is
    /// passed through.
    pub async fn compile(&self, source: &str) -> CompilationResult {
        self.compile_with_cancel(source, self.cancel.clone()).await
    }

    pub async fn compile_with_cancel(&self, source: &str, cancel: CancelSignal) -> CompilationResult {
        let tree = SyntaxTree::build(self.parser.segment(source));
        self.run(source.to_string(), tree, cancel).await
    }

    /// Compile bare DevIns, as if the whole input were one command region.
    pub fn compile_script<'a>(&'a self, source: &str) -> BoxFuture<'a, CompilationResult> {
        let tree = SyntaxTree::script(source);
        let input = source.to_string();
        let cancel = self.cancel.clone();
        async move { self.run(input, tree, cancel).await }.boxed()
    }

    // ----- Pipeline -----

    async fn run(&self, input: String, tree: SyntaxTree, mut cancel: CancelSignal) -> CompilationResult {
        tracing::debug!(
            blocks = tree.blocks().len(),
            nodes = tree.nodes().len(),
            depth = self.depth,
            "compiling"
        );
        let mut ctx = CompilerContext::new();
        // handed to nested compilations; `cancel` itself is borrowed by the select below
        let shared = cancel.clone();

        'blocks: for (index, entry) in tree.blocks().iter().enumerate() {
            ctx.begin_block();

            if entry.block.is_command() && !tree.has_directive(index) {
                if !entry.block.text().is_empty() {
                    ctx.report(CompileError::NoDirective, Some(entry.span.clone()));
                    ctx.append(entry.block.text());
                }
                continue;
            }

            for id in entry.nodes.clone() {
                if cancel.is_cancelled() {
                    ctx.cancelled = true;
                    break 'blocks;
                }
                let flow = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Flow::Cancelled,
                    flow = self.step(&tree, id, &mut ctx, &shared) => flow,
                };
                match flow {
                    Flow::Continue => {}
                    Flow::Delegate => break 'blocks,
                    Flow::Cancelled => {
                        ctx.cancelled = true;
                        break 'blocks;
                    }
                }
            }
        }

        if ctx.cancelled {
            tracing::info!(depth = self.depth, "compilation cancelled");
        }
        OutputAssembler::finish(input, ctx)
    }

    async fn step(
        &self,
        tree: &SyntaxTree,
        id: NodeId,
        ctx: &mut CompilerContext,
        cancel: &CancelSignal,
    ) -> Flow {
        match &tree.node(id).kind {
            NodeKind::Text | NodeKind::Passthrough => ctx.append(tree.text(id)),
            NodeKind::Newline => ctx.append("\n"),
            NodeKind::Code { .. } => {
                if ctx.skip_next_code {
                    ctx.skip_next_code = false;
                } else {
                    ctx.append(tree.text(id).trim_end());
                }
            }
            NodeKind::Directive(directive) => {
                return dispatcher::dispatch(self, tree, id, directive, ctx, cancel).await;
            }
        }
        Flow::Continue
    }
}
