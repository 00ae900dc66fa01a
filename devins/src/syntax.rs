//! Immutable syntax arena over a segmented reply.
//!
//! Nodes are stored flat, in source order, and addressed by index. Command
//! region bodies are lexed into text, newline, code and directive nodes; all
//! other blocks become a single node each. Looking for the code body that
//! follows a command is a forward index scan.

use std::ops::Range;

use crate::assembler::{Segment, Segmentation, trim_code_body, trim_range};
use crate::block::ContentBlock;
use crate::scanner::fence_language;

pub type NodeId = usize;

/// A `/command`, `@agent` or `$variable` reference inside a command region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `/name` or `/name:prop`. `prop` is the byte range of the property text.
    Command {
        name: String,
        prop: Option<Range<usize>>,
    },
    Agent { name: String },
    Variable { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    Newline,
    /// A fenced block. `body` is the byte range of the code inside the fences.
    Code {
        language: Option<String>,
        body: Range<usize>,
        complete: bool,
    },
    /// A thinking or walkthrough region, emitted unchanged.
    Passthrough,
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Range<usize>,
    /// Index of the block this node belongs to.
    pub block: usize,
}

/// A top-level block and the nodes lexed from it.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub block: ContentBlock,
    pub span: Range<usize>,
    pub nodes: Range<NodeId>,
}

#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<SyntaxNode>,
    blocks: Vec<BlockEntry>,
    line_starts: Vec<usize>,
}

impl SyntaxTree {
    /// Build the arena for a segmented reply.
    pub fn build(segmentation: Segmentation) -> Self {
        let Segmentation {
            source,
            segments,
            line_starts,
            ..
        } = segmentation;

        let mut builder = Builder {
            source: &source,
            nodes: Vec::new(),
        };
        let mut blocks = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            let first = builder.nodes.len();
            builder.add_block(index, &segment);
            blocks.push(BlockEntry {
                block: segment.block,
                span: segment.span,
                nodes: first..builder.nodes.len(),
            });
        }
        let nodes = builder.nodes;

        SyntaxTree {
            source,
            nodes,
            blocks,
            line_starts,
        }
    }

    /// Build the arena for a bare script: the whole input is one command body.
    ///
    /// Custom command content and expanded prompt templates are compiled
    /// this way; they carry no `<cmd>` delimiters.
    pub fn script(source: &str) -> Self {
        let body = trim_range(source, 0..source.len());
        let segment = Segment {
            block: ContentBlock::Command {
                text: source[body.clone()].to_string(),
                complete: true,
            },
            span: 0..source.len(),
            body,
        };
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        SyntaxTree::build(Segmentation {
            source: source.to_string(),
            segments: vec![segment],
            line_starts,
            repaired: false,
        })
    }

    // ----- Access -----

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[SyntaxNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id]
    }

    pub fn blocks(&self) -> &[BlockEntry] {
        &self.blocks
    }

    /// Source text of a node.
    pub fn text(&self, id: NodeId) -> &str {
        &self.source[self.nodes[id].span.clone()]
    }

    pub fn slice(&self, range: Range<usize>) -> &str {
        &self.source[range]
    }

    /// Whether any node of `block` is a directive.
    pub fn has_directive(&self, block: usize) -> bool {
        self.blocks[block]
            .nodes
            .clone()
            .any(|id| matches!(self.nodes[id].kind, NodeKind::Directive(_)))
    }

    /// The next code node after `id`, stopping at the next directive.
    pub fn next_code_after(&self, id: NodeId) -> Option<NodeId> {
        for next in id + 1..self.nodes.len() {
            match self.nodes[next].kind {
                NodeKind::Code { .. } => return Some(next),
                NodeKind::Directive(_) => return None,
                _ => {}
            }
        }
        None
    }

    /// 0-based line of a byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }
}

struct Builder<'s> {
    source: &'s str,
    nodes: Vec<SyntaxNode>,
}

impl Builder<'_> {
    fn push(&mut self, kind: NodeKind, span: Range<usize>, block: usize) {
        self.nodes.push(SyntaxNode { kind, span, block });
    }

    fn add_block(&mut self, index: usize, segment: &Segment) {
        match &segment.block {
            ContentBlock::Text { .. } => self.push(NodeKind::Text, segment.body.clone(), index),
            ContentBlock::Code {
                language, complete, ..
            } => self.push(
                NodeKind::Code {
                    language: language.clone(),
                    body: segment.body.clone(),
                    complete: *complete,
                },
                segment.span.clone(),
                index,
            ),
            ContentBlock::Thinking { .. } | ContentBlock::Walkthrough { .. } => {
                self.push(NodeKind::Passthrough, segment.span.clone(), index)
            }
            ContentBlock::Command { .. } => self.lex_commands(index, segment.body.clone()),
        }
    }

    /// Lex a command region body line by line.
    fn lex_commands(&mut self, block: usize, body: Range<usize>) {
        let source = self.source;
        let mut pos = body.start;

        while pos < body.end {
            let line_end = line_end(source, pos, body.end);
            match fence_language(&source[pos..line_end]) {
                Some(language) => pos = self.lex_fence(block, pos, line_end, body.end, language),
                None => {
                    self.lex_line(block, pos..line_end);
                    pos = line_end;
                }
            }

            if pos < body.end && source[pos..].starts_with('\n') {
                self.push(NodeKind::Newline, pos..pos + 1, block);
                pos += 1;
            }
        }
    }

    /// Lex a fenced block starting at the line `start..open_end`. Returns the
    /// offset just past the closing fence (before its newline).
    fn lex_fence(
        &mut self,
        block: usize,
        start: usize,
        open_end: usize,
        limit: usize,
        language: Option<String>,
    ) -> usize {
        let source = self.source;
        let body_start = (open_end + 1).min(limit);
        let mut close = None;
        let mut line = body_start;
        while line < limit {
            let end = line_end(source, line, limit);
            if source[line..end].trim() == "```" {
                close = Some(line..end);
                break;
            }
            line = end + 1;
        }

        let (body_end, end) = match &close {
            Some(close) => (close.start, close.end),
            None => (limit, limit),
        };
        let body = trim_code_body(source, body_start..body_end.max(body_start));
        self.push(
            NodeKind::Code {
                language,
                body,
                complete: close.is_some(),
            },
            start..end,
            block,
        );
        end
    }

    fn lex_line(&mut self, block: usize, line: Range<usize>) {
        let source = self.source;
        let mut text_start = line.start;
        let mut indent_only = true;
        let mut word_start = true;
        let mut i = line.start;

        while i < line.end {
            let Some(c) = source[i..].chars().next() else {
                break;
            };
            let directive = match c {
                '/' if indent_only => self.directive_at(i, line.end, c),
                '@' | '$' if word_start => self.directive_at(i, line.end, c),
                _ => None,
            };

            if let Some((directive, span)) = directive {
                if text_start < i {
                    self.push(NodeKind::Text, text_start..i, block);
                }
                i = span.end;
                text_start = i;
                self.push(NodeKind::Directive(directive), span, block);
                indent_only = false;
                word_start = false;
                continue;
            }

            word_start = c.is_whitespace();
            if !c.is_whitespace() {
                indent_only = false;
            }
            i += c.len_utf8();
        }

        if text_start < line.end {
            self.push(NodeKind::Text, text_start..line.end, block);
        }
    }

    fn directive_at(&self, at: usize, limit: usize, sigil: char) -> Option<(Directive, Range<usize>)> {
        let source = self.source;
        let name_start = at + 1;
        let name_end = if sigil == '$' {
            scan_while(source, name_start, limit, |c| c.is_ascii_alphanumeric() || c == '_')
        } else {
            let end = scan_while(source, name_start, limit, |c| {
                c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
            });
            name_start + source[name_start..end].trim_end_matches('.').len()
        };
        if name_end == name_start {
            return None;
        }
        let name = source[name_start..name_end].to_string();

        let directive = match sigil {
            '/' => {
                let (prop, end) = if source[name_end..limit].starts_with(':') {
                    let prop_start = name_end + 1;
                    let prop_end = scan_while(source, prop_start, limit, |c| !c.is_whitespace());
                    ((prop_end > prop_start).then_some(prop_start..prop_end), prop_end)
                } else {
                    (None, name_end)
                };
                return Some((Directive::Command { name, prop }, at..end));
            }
            '@' => Directive::Agent { name },
            _ => Directive::Variable { name },
        };
        Some((directive, at..name_end))
    }
}

fn line_end(source: &str, from: usize, limit: usize) -> usize {
    source[from..limit]
        .find('\n')
        .map(|i| from + i)
        .unwrap_or(limit)
}

fn scan_while(source: &str, from: usize, limit: usize, pred: impl Fn(char) -> bool) -> usize {
    source[from..limit]
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| from + i)
        .unwrap_or(limit)
}
