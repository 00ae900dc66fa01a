//! Block assembly: scanner markers in, ordered `ContentBlock`s out.

pub mod legacy;

use std::ops::Range;
use std::sync::Arc;

use crate::block::ContentBlock;
use crate::language::{LanguageRegistry, StaticLanguages, resolve_extension};
use crate::scanner::{Marker, MarkerKind, TokenScanner};

/// A block together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub block: ContentBlock,
    /// Byte range of the whole block, delimiters included.
    pub span: Range<usize>,
    /// Byte range of the block's `text`.
    pub body: Range<usize>,
}

/// The full segmentation of one reply.
///
/// Spans index into `source`, which is the input after legacy repair (and
/// therefore not always byte-identical to what was passed in).
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub source: String,
    pub segments: Vec<Segment>,
    pub line_starts: Vec<usize>,
    /// True when legacy command fences were rewritten.
    pub repaired: bool,
}

impl Segmentation {
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.segments.iter().map(|s| &s.block)
    }

    pub fn into_blocks(self) -> Vec<ContentBlock> {
        self.segments.into_iter().map(|s| s.block).collect()
    }
}

/// Turns raw (possibly still streaming) model output into blocks.
#[derive(Clone)]
pub struct BlockParser {
    languages: Arc<dyn LanguageRegistry>,
}

impl Default for BlockParser {
    fn default() -> Self {
        BlockParser::new()
    }
}

impl BlockParser {
    pub fn new() -> Self {
        BlockParser {
            languages: Arc::new(StaticLanguages),
        }
    }

    /// Use a host language registry for extension lookup.
    pub fn with_languages(languages: Arc<dyn LanguageRegistry>) -> Self {
        BlockParser { languages }
    }

    // ----- Public API -----

    /// Parse the first fence or region in `text`.
    ///
    /// Without either, the result is an empty, incomplete, untagged code block.
    pub fn parse_one(&self, text: &str) -> ContentBlock {
        let scan = TokenScanner::new(text).scan();
        let mut markers = scan.markers.iter();
        while let Some(marker) = markers.next() {
            let closed = match &marker.kind {
                MarkerKind::FenceOpen { closed, .. } | MarkerKind::RegionOpen { closed, .. } => {
                    *closed
                }
                MarkerKind::FenceClose { .. } | MarkerKind::RegionClose(_) => continue,
            };
            let close = if closed { markers.next() } else { None };
            if let Some(segment) = self.assemble(text, marker, close) {
                return segment.block;
            }
        }

        ContentBlock::Code {
            language: None,
            text: String::new(),
            complete: false,
            extension: Some(resolve_extension(self.languages.as_ref(), "txt")),
        }
    }

    /// Segment `text` into ordered blocks.
    pub fn parse_all(&self, text: &str) -> Vec<ContentBlock> {
        self.segment(text).into_blocks()
    }

    /// Segment `text`, keeping the byte spans of every block.
    pub fn segment(&self, text: &str) -> Segmentation {
        let repaired = legacy::repair(text);
        let was_repaired = repaired.is_some();
        let source = repaired.unwrap_or_else(|| text.to_string());

        let scan = TokenScanner::new(&source).scan();
        let mut segments = Vec::new();
        let mut cursor = 0;
        let mut markers = scan.markers.iter();

        while let Some(marker) = markers.next() {
            let closed = match &marker.kind {
                MarkerKind::FenceOpen { closed, .. } | MarkerKind::RegionOpen { closed, .. } => {
                    *closed
                }
                MarkerKind::FenceClose { .. } | MarkerKind::RegionClose(_) => continue,
            };

            push_text(&source, cursor..marker.span.start, &mut segments);

            let close = if closed { markers.next() } else { None };
            let Some(segment) = self.assemble(&source, marker, close) else {
                continue;
            };
            cursor = match close {
                Some(close) if matches!(close.kind, MarkerKind::FenceClose { .. }) => {
                    end_of_line(&source, close.span.end)
                }
                Some(close) => close.span.end,
                None => source.len(),
            };

            let keep = match segment.block {
                ContentBlock::Code { .. } => !segment.body.is_empty(),
                _ => true,
            };
            if keep {
                segments.push(segment);
            }
        }

        push_text(&source, cursor..source.len(), &mut segments);

        Segmentation {
            source,
            segments,
            line_starts: scan.line_starts,
            repaired: was_repaired,
        }
    }

    // ----- Assembly -----

    /// Build the block opened by `open`. Close markers build nothing.
    fn assemble(&self, source: &str, open: &Marker, close: Option<&Marker>) -> Option<Segment> {
        let (body_end, span_end) = match close {
            Some(close) => (close.span.start, close.span.end),
            None => (source.len(), source.len()),
        };
        let span = open.span.start..span_end;
        let complete = close.is_some();

        match &open.kind {
            MarkerKind::FenceOpen { language, .. } => {
                let body = trim_code_body(source, open.span.end..body_end);
                let tag = language.as_deref().unwrap_or("txt");
                Some(Segment {
                    block: ContentBlock::Code {
                        language: language.clone(),
                        text: source[body.clone()].to_string(),
                        complete,
                        extension: Some(resolve_extension(self.languages.as_ref(), tag)),
                    },
                    span,
                    body,
                })
            }
            MarkerKind::RegionOpen { region, .. } => {
                let body = trim_range(source, open.span.end..body_end);
                Some(Segment {
                    block: ContentBlock::region(*region, source[body.clone()].to_string(), complete),
                    span,
                    body,
                })
            }
            MarkerKind::FenceClose { .. } | MarkerKind::RegionClose(_) => None,
        }
    }
}

fn push_text(source: &str, range: Range<usize>, segments: &mut Vec<Segment>) {
    if range.start >= range.end {
        return;
    }
    let body = trim_range(source, range.clone());
    if body.is_empty() {
        return;
    }
    segments.push(Segment {
        block: ContentBlock::Text {
            text: source[body.clone()].to_string(),
        },
        span: range,
        body,
    });
}

/// Offset just past the newline ending the line at `offset`, or `offset` at end of input.
fn end_of_line(source: &str, offset: usize) -> usize {
    if source[offset..].starts_with('\n') {
        offset + 1
    } else {
        offset
    }
}

/// Trim surrounding whitespace, returning the narrowed range.
pub(crate) fn trim_range(source: &str, range: Range<usize>) -> Range<usize> {
    let text = &source[range.clone()];
    let lead = text.len() - text.trim_start().len();
    let trail = text.trim_end().len();
    if lead >= trail {
        range.start..range.start
    } else {
        range.start + lead..range.start + trail
    }
}

/// Drop leading blank lines and trailing whitespace, keeping indentation.
pub(crate) fn trim_code_body(source: &str, range: Range<usize>) -> Range<usize> {
    let text = &source[range.clone()];
    let end = text.trim_end().len();
    let mut start = 0;
    for line in text[..end].split_inclusive('\n') {
        if line.ends_with('\n') && line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    range.start + start.min(end)..range.start + end
}
