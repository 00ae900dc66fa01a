use devins::{ContentBlock, parse_all, parse_one};

fn code(language: &str, text: &str, complete: bool, extension: &str) -> ContentBlock {
    ContentBlock::Code {
        language: Some(language.to_string()),
        text: text.to_string(),
        complete,
        extension: Some(extension.to_string()),
    }
}

fn command(text: &str, complete: bool) -> ContentBlock {
    ContentBlock::Command {
        text: text.to_string(),
        complete,
    }
}

fn text(text: &str) -> ContentBlock {
    ContentBlock::Text {
        text: text.to_string(),
    }
}

#[test]
fn closed_fence() {
    assert_eq!(
        parse_all("```java\npublic class A{}\n```"),
        vec![code("java", "public class A{}", true, "java")]
    );
}

#[test]
fn unterminated_fence() {
    assert_eq!(
        parse_all("```java\npublic class A{}"),
        vec![code("java", "public class A{}", false, "java")]
    );
}

#[test]
fn consecutive_command_regions() {
    assert_eq!(
        parse_all("<cmd>/write:f1</cmd><cmd>/write:f2</cmd><cmd>/write:f3</cmd>"),
        vec![
            command("/write:f1", true),
            command("/write:f2", true),
            command("/write:f3", true),
        ]
    );
}

#[test]
fn consecutive_regions_on_separate_lines() {
    let blocks = parse_all("<cmd>/write:f1</cmd>\n\n<cmd>/write:f2</cmd>\n");
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(ContentBlock::is_command));
}

#[test]
fn plain_text_is_one_trimmed_block() {
    assert_eq!(
        parse_all("\n  Some prose.\n\nMore prose.  \n"),
        vec![text("Some prose.\n\nMore prose.")]
    );
    assert!(parse_all("   \n ").is_empty());
}

#[test]
fn text_is_flushed_around_typed_blocks() {
    assert_eq!(
        parse_all("Here is the file:\n```rust\nfn main() {}\n```\nThen run it.\n<cmd>/run:main.rs</cmd>\nDone."),
        vec![
            text("Here is the file:"),
            code("rust", "fn main() {}", true, "rs"),
            text("Then run it."),
            command("/run:main.rs", true),
            text("Done."),
        ]
    );
}

#[test]
fn streaming_region_is_kept_when_empty() {
    assert_eq!(
        parse_all("Working on it\n<cmd>"),
        vec![text("Working on it"), command("", false)]
    );
}

#[test]
fn only_the_tail_is_incomplete() {
    let inputs = [
        "a\n```py\nprint(1)\n```\nb\n<cmd>/dir:.",
        "```py\nprint(1)\n<cmd>/dir:.</cmd>\n```sh\nls",
        "<thinking>hmm</thinking><cmd>/file:a</cmd>```js\nx",
        "<!-- walkthrough_start -->\nstep 1\n",
        "```\n```\n```\n",
    ];
    for input in inputs {
        let blocks = parse_all(input);
        let split = blocks.len().saturating_sub(1);
        assert!(
            blocks[..split].iter().all(ContentBlock::is_complete),
            "non-tail incomplete block in {:?}: {:?}",
            input,
            blocks
        );
    }
}

#[test]
fn indentation_inside_code_is_kept() {
    assert_eq!(
        parse_all("```python\n\n    if x:\n        y()\n\n```"),
        vec![code("python", "    if x:\n        y()", true, "py")]
    );
}

#[test]
fn untagged_fence_defaults_to_txt() {
    assert_eq!(
        parse_all("```\nplain\n```"),
        vec![ContentBlock::Code {
            language: None,
            text: "plain".into(),
            complete: true,
            extension: Some("txt".into()),
        }]
    );
}

#[test]
fn legacy_fence_with_unclosed_inner_block() {
    let source = "Let me write it.\n```devin\n/write:src/a.kt\n```kotlin\nfun a() = 1\n```\n```\n";
    assert_eq!(
        parse_all(source),
        vec![
            text("Let me write it."),
            command("/write:src/a.kt\n```kotlin\nfun a() = 1\n```", true),
        ]
    );
}

#[test]
fn thinking_and_walkthrough_regions() {
    let blocks = parse_all(
        "<thinking>\nread the file first\n</thinking>\n<!-- walkthrough_start -->\n1. open\n<!-- walkthrough_end -->",
    );
    assert_eq!(
        blocks,
        vec![
            ContentBlock::Thinking {
                text: "read the file first".into(),
                complete: true
            },
            ContentBlock::Walkthrough {
                text: "1. open".into(),
                complete: true
            },
        ]
    );
}

#[test]
fn devin_alias_region() {
    assert_eq!(
        parse_all("<devin>\n/dir:src\n</devin>"),
        vec![command("/dir:src", true)]
    );
}

#[test]
fn parse_one_finds_first_block() {
    assert_eq!(
        parse_one("intro\n```kotlin\nval a = 1\n```\n```java\nint b;\n```"),
        code("kotlin", "val a = 1", true, "kt")
    );
    assert_eq!(parse_one("<cmd>/dir:.\n"), command("/dir:.", false));
    assert_eq!(
        parse_one("no fences here"),
        ContentBlock::Code {
            language: None,
            text: String::new(),
            complete: false,
            extension: Some("txt".into()),
        }
    );
}

#[test]
fn source_order_is_preserved() {
    let source = "one\n```text\ntwo\n```\nthree\n<cmd>four</cmd>five";
    let joined: String = parse_all(source)
        .iter()
        .map(|b| b.text().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(joined, "one two three four five");
}
