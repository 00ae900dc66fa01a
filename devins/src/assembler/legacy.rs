//! Rewrite of fenced command blocks into command regions.
//!
//! Older replies wrapped commands in a ```` ```devin ```` (or ```` ```cmd ````)
//! fence. When the command carried a code body, the inner fence's closing
//! line was taken as the outer close, leaving the inner block unterminated.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static LEGACY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```(?:devin|cmd)\n([\s\S]*?)\n```\n").expect("legacy block pattern")
});

static INNER_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```[\w#+ ]*\n").expect("inner fence pattern"));

/// Rewrite every finished legacy command fence in `source` as `<cmd>…</cmd>`.
///
/// Only one level of nesting is repaired. Returns `None` when nothing matched.
pub fn repair(source: &str) -> Option<String> {
    if !LEGACY_BLOCK.is_match(source) {
        return None;
    }

    let mut repaired = 0usize;
    let rewritten = LEGACY_BLOCK.replace_all(source, |caps: &Captures<'_>| {
        repaired += 1;
        let mut body = caps[1].to_string();
        if INNER_FENCE.is_match(&body) && !body.trim().ends_with("```") {
            body.push_str("\n```");
        }
        format!("\n<cmd>\n{}\n</cmd>\n", body)
    });

    tracing::debug!(blocks = repaired, "rewrote legacy command fences");
    Some(rewritten.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_without_legacy_fence() {
        assert_eq!(repair("```kotlin\nfun a() {}\n```\n"), None);
        assert_eq!(repair("<cmd>/dir:.</cmd>"), None);
    }

    #[test]
    fn plain_command_fence() {
        assert_eq!(
            repair("```devin\n/dir:src\n```\n").as_deref(),
            Some("\n<cmd>\n/dir:src\n</cmd>\n")
        );
    }

    #[test]
    fn cmd_tag_is_legacy_too() {
        assert_eq!(
            repair("before\n```cmd\n/file:a.txt\n```\nafter").as_deref(),
            Some("before\n\n<cmd>\n/file:a.txt\n</cmd>\nafter")
        );
    }

    #[test]
    fn synthesizes_inner_close() {
        let source = "```devin\n/write:a.kt\n```kotlin\nfun a() {}\n```\n```\n";
        let repaired = repair(source).unwrap_or_default();
        assert_eq!(
            repaired,
            "\n<cmd>\n/write:a.kt\n```kotlin\nfun a() {}\n```\n</cmd>\n```\n"
        );
    }

    #[test]
    fn unfinished_legacy_fence_is_left_alone() {
        assert_eq!(repair("```devin\n/dir:src\n```"), None);
    }
}
