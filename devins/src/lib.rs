pub mod assembler;
pub mod block;
pub mod language;
pub mod scanner;
pub mod syntax;

pub use assembler::{BlockParser, Segment, Segmentation};
pub use block::ContentBlock;
pub use language::{LanguageRegistry, StaticLanguages};
pub use syntax::{Directive, NodeId, NodeKind, SyntaxNode, SyntaxTree};

/// Segment `text` with the static language tables.
pub fn parse_all(text: &str) -> Vec<ContentBlock> {
    BlockParser::new().parse_all(text)
}

/// Parse the first fence or command region of `text`.
pub fn parse_one(text: &str) -> ContentBlock {
    BlockParser::new().parse_one(text)
}
