use std::fmt;

use crate::scanner::RegionKind;

/// A typed piece of model output.
///
/// A reply is segmented into an ordered sequence of blocks. Only the last
/// block of a sequence can be incomplete; everything before it had its
/// closing delimiter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// Prose outside any fence or region.
    Text { text: String },
    /// A fenced code block.
    Code {
        language: Option<String>,
        text: String,
        complete: bool,
        extension: Option<String>,
    },
    /// An embedded command region, `<cmd>…</cmd>`.
    Command { text: String, complete: bool },
    /// Model reasoning, `<thinking>…</thinking>`.
    Thinking { text: String, complete: bool },
    /// A walkthrough section delimited by HTML comments.
    Walkthrough { text: String, complete: bool },
}

impl ContentBlock {
    pub fn text(&self) -> &str {
        match self {
            ContentBlock::Text { text }
            | ContentBlock::Code { text, .. }
            | ContentBlock::Command { text, .. }
            | ContentBlock::Thinking { text, .. }
            | ContentBlock::Walkthrough { text, .. } => text,
        }
    }

    /// Whether the closing delimiter was observed. Text is always complete.
    pub fn is_complete(&self) -> bool {
        match self {
            ContentBlock::Text { .. } => true,
            ContentBlock::Code { complete, .. }
            | ContentBlock::Command { complete, .. }
            | ContentBlock::Thinking { complete, .. }
            | ContentBlock::Walkthrough { complete, .. } => *complete,
        }
    }

    /// Language identity a renderer would use for this block.
    pub fn language_id(&self) -> &str {
        match self {
            ContentBlock::Text { .. } => "markdown",
            ContentBlock::Code { language, .. } => language.as_deref().unwrap_or(""),
            ContentBlock::Command { .. } => "DevIn",
            ContentBlock::Thinking { .. } => "thinking",
            ContentBlock::Walkthrough { .. } => "walkthrough",
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { .. } => Some("md"),
            ContentBlock::Code { extension, .. } => extension.as_deref(),
            ContentBlock::Command { .. } => Some("devin"),
            ContentBlock::Thinking { .. } | ContentBlock::Walkthrough { .. } => None,
        }
    }

    /// Short lowercase name of the variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Code { .. } => "code",
            ContentBlock::Command { .. } => "command",
            ContentBlock::Thinking { .. } => "thinking",
            ContentBlock::Walkthrough { .. } => "walkthrough",
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, ContentBlock::Command { .. })
    }

    pub(crate) fn region(kind: RegionKind, text: String, complete: bool) -> Self {
        match kind {
            RegionKind::Command => ContentBlock::Command { text, complete },
            RegionKind::Thinking => ContentBlock::Thinking { text, complete },
            RegionKind::Walkthrough => ContentBlock::Walkthrough { text, complete },
        }
    }
}

/// Renders the block back to the source syntax it was parsed from.
impl fmt::Display for ContentBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentBlock::Text { text } => write!(f, "{}", text),
            ContentBlock::Code {
                language,
                text,
                complete,
                ..
            } => {
                write!(f, "```{}\n{}", language.as_deref().unwrap_or(""), text)?;
                if *complete {
                    write!(f, "\n```")?;
                }
                Ok(())
            }
            ContentBlock::Command { text, complete } => {
                write_region(f, "<cmd>", "</cmd>", text, *complete)
            }
            ContentBlock::Thinking { text, complete } => {
                write_region(f, "<thinking>", "</thinking>", text, *complete)
            }
            ContentBlock::Walkthrough { text, complete } => write_region(
                f,
                "<!-- walkthrough_start -->",
                "<!-- walkthrough_end -->",
                text,
                *complete,
            ),
        }
    }
}

fn write_region(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    close: &str,
    text: &str,
    complete: bool,
) -> fmt::Result {
    write!(f, "{}\n{}", open, text)?;
    if complete {
        write!(f, "\n{}", close)?;
    }
    Ok(())
}
