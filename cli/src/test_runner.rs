use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use devins::BlockParser;
use devins_compiler::{CompilationResult, Compiler, Diagnostic};
use serde::Deserialize;

use crate::config::Config;

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedBlock {
    /// `text`, `code`, `command`, `thinking` or `walkthrough`.
    pub kind: String,

    #[serde(default)]
    pub language: Option<String>,

    /// Exact block text.
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Expected compiled output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected hard error: some error diagnostic must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected segmentation of the fixture source, checked before compiling.
    #[serde(default)]
    pub expect_blocks: Option<Vec<ExpectedBlock>>,

    /// Names of the bound variables, in declaration order.
    #[serde(default)]
    pub expect_variables: Option<Vec<String>>,

    /// Agent the compilation must delegate to.
    #[serde(default)]
    pub expect_agent: Option<String>,

    /// Expected warnings. If present (even empty), warning count and content are checked.
    /// Each entry checks message substring and optionally the source line.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,

    /// Registries and compiler options, same keys as `devins.toml`.
    #[serde(flatten)]
    pub setup: Config,
}

/// Parse a `.test.md` file into its TOML config and the model reply under test.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let source = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

async fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    // 1. Read file
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    // 2. Parse frontmatter
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };

    let description = config.description.clone();

    // 3. Segmentation
    if let Some(expected) = &config.expect_blocks {
        if let Some(reason) = check_blocks(source, expected) {
            return fail(description, reason);
        }
    }

    // 4. Build registries relative to the fixture
    let base_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let registries = match config.setup.registries(&base_dir) {
        Ok(registries) => registries,
        Err(e) => return fail(description, format!("config error: {:#}", e)),
    };

    // 5. Compile
    let compiler = Compiler::new(registries).with_options(config.setup.options());
    let result = compiler.compile(source).await;

    // 6. Check expectations, first mismatch wins. Spans index the repaired reply.
    let repaired = BlockParser::new().segment(source).source;
    let failure = check_errors(&config, &result)
        .or_else(|| check_output(&config, &result))
        .or_else(|| check_variables(&config, &result))
        .or_else(|| check_agent(&config, &result))
        .or_else(|| {
            config
                .expect_warnings
                .as_ref()
                .and_then(|expected| check_warnings(&repaired, &result.diagnostics, expected))
        });

    match failure {
        Some(reason) => fail(description, reason),
        None => TestResult {
            path: path.to_path_buf(),
            description,
            outcome: TestOutcome::Pass,
        },
    }
}

fn check_blocks(source: &str, expected: &[ExpectedBlock]) -> Option<String> {
    let actual = devins::parse_all(source);
    if actual.len() != expected.len() {
        let kinds: Vec<&str> = actual.iter().map(|b| b.kind_name()).collect();
        return Some(format!(
            "expected {} block(s), got {}: [{}]",
            expected.len(),
            actual.len(),
            kinds.join(", ")
        ));
    }

    for (i, (block, expected)) in actual.iter().zip(expected).enumerate() {
        if block.kind_name() != expected.kind {
            return Some(format!(
                "block[{}]: expected {}, got {}",
                i,
                expected.kind,
                block.kind_name()
            ));
        }
        if let Some(language) = &expected.language {
            if block.language_id() != language {
                return Some(format!(
                    "block[{}]: expected language \"{}\", got \"{}\"",
                    i,
                    language,
                    block.language_id()
                ));
            }
        }
        if let Some(text) = &expected.text {
            if block.text() != text {
                return Some(format!(
                    "block[{}]: text mismatch\n  expected: {:?}\n  actual:   {:?}",
                    i,
                    text,
                    block.text()
                ));
            }
        }
        if let Some(complete) = expected.complete {
            if block.is_complete() != complete {
                return Some(format!(
                    "block[{}]: expected complete = {}, got {}",
                    i,
                    complete,
                    block.is_complete()
                ));
            }
        }
    }
    None
}

fn check_errors(config: &TestConfig, result: &CompilationResult) -> Option<String> {
    let errors: Vec<String> = result.errors().map(|d| d.to_string()).collect();
    match (&config.expect_error, result.has_error) {
        (Some(expected), true) => {
            if errors.iter().any(|e| e.contains(expected.as_str())) {
                None
            } else {
                Some(format!(
                    "expected error containing \"{}\", got: {}",
                    expected,
                    errors.join("; ")
                ))
            }
        }
        (Some(expected), false) => Some(format!(
            "expected error containing \"{}\", but compilation succeeded",
            expected
        )),
        (None, true) => Some(format!("unexpected compile error: {}", errors.join("; "))),
        (None, false) => None,
    }
}

fn check_output(config: &TestConfig, result: &CompilationResult) -> Option<String> {
    let expected = config.expect_output.as_ref()?;
    let actual_trimmed = result.output.trim();
    let expected_trimmed = expected.trim();
    if actual_trimmed == expected_trimmed {
        None
    } else {
        Some(format!(
            "output mismatch\n  expected: {}\n  actual:   {}",
            expected_trimmed, actual_trimmed
        ))
    }
}

fn check_variables(config: &TestConfig, result: &CompilationResult) -> Option<String> {
    let expected = config.expect_variables.as_ref()?;
    let actual: Vec<&str> = result
        .variables
        .entries()
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    if actual == *expected {
        None
    } else {
        Some(format!(
            "variables mismatch\n  expected: [{}]\n  actual:   [{}]",
            expected.join(", "),
            actual.join(", ")
        ))
    }
}

fn check_agent(config: &TestConfig, result: &CompilationResult) -> Option<String> {
    let expected = config.expect_agent.as_ref()?;
    match &result.delegate_agent {
        Some(agent) if agent.name == *expected => None,
        Some(agent) => Some(format!(
            "expected delegation to \"{}\", got \"{}\"",
            expected, agent.name
        )),
        None => Some(format!(
            "expected delegation to \"{}\", but no agent was selected",
            expected
        )),
    }
}

/// Convert a byte offset in `source` to a 1-based line number.
fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}

/// Check that actual warnings match expectations. Returns `Some(reason)` on mismatch.
fn check_warnings(
    source: &str,
    diagnostics: &[Diagnostic],
    expected: &[ExpectedWarning],
) -> Option<String> {
    let actual_warnings: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_warning()).collect();

    if actual_warnings.len() != expected.len() {
        let actual_msgs: Vec<String> = actual_warnings
            .iter()
            .map(|w| format!("  - {}", w))
            .collect();
        return Some(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            actual_warnings.len(),
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual_warnings.iter().zip(expected.iter()).enumerate() {
        let msg = actual.to_string();

        if !msg.contains(&expected.contains) {
            return Some(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, msg
            ));
        }

        if let Some(expected_line) = expected.line {
            if let Some(span) = &actual.span {
                let actual_line = byte_offset_to_line(source, span.start);
                if actual_line != expected_line {
                    return Some(format!(
                        "warning[{}]: expected on line {}, but span is on line {}",
                        i, expected_line, actual_line
                    ));
                }
            } else {
                return Some(format!(
                    "warning[{}]: expected on line {}, but warning has no span",
                    i, expected_line
                ));
            }
        }
    }

    None
}

/// Discover `.test.md` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(".test.md") {
                let category = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                out.entry(category).or_default().push(path);
            }
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn ok_label(no_color: bool) -> &'static str {
    if no_color { "ok" } else { "\x1b[32mok\x1b[0m" }
}

fn failed_label(no_color: bool) -> &'static str {
    if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

fn test_label<'a>(result: &'a TestResult) -> &'a str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(".test.md"))
            .unwrap_or("?")
    })
}

/// Run all `.test.md` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub async fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let run_categories: BTreeMap<String, Vec<PathBuf>> = if path.is_file() {
        // single file mode ignores categories
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let all_categories = discover_categorized(path);
        if all_categories.is_empty() {
            eprintln!("no .test.md files found in {}", path.display());
            return 1;
        }
        select_categories(all_categories, categories)
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", bold(header, no_color));
        }

        for file in files {
            let result = run_single_test(file).await;
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), test_label(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", fail_label(no_color), test_label(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", ok_label(no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            failed_label(no_color),
            passed,
            failed,
            passed + failed
        );
        1
    }
}

/// Keep the requested categories and their subcategories.
fn select_categories(
    all_categories: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    if requested.is_empty() {
        return all_categories;
    }

    let mut selected = BTreeMap::new();
    for requested in requested {
        let req = requested.trim_matches('/');
        let mut found = false;
        for (cat, files) in &all_categories {
            if cat == req || cat.starts_with(&format!("{}/", req)) {
                selected.insert(cat.clone(), files.clone());
                found = true;
            }
        }
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all_categories
                    .keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn frontmatter_and_registries() {
        let (config, source) = parse_test_file(
            "---\ndescription = \"agents\"\nexpect_agent = \"reviewer\"\n\n[[agents]]\nname = \"reviewer\"\n---\n<cmd>@reviewer</cmd>\n",
        )
        .unwrap();
        assert_eq!(config.description.as_deref(), Some("agents"));
        assert_eq!(config.setup.agents.len(), 1);
        assert_eq!(source, "<cmd>@reviewer</cmd>\n");
    }

    #[test]
    fn missing_frontmatter_is_reported() {
        assert!(parse_test_file("<cmd>/dir:.</cmd>").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
    }

    #[test]
    fn lines_are_one_based() {
        assert_eq!(byte_offset_to_line("a\nb\nc", 0), 1);
        assert_eq!(byte_offset_to_line("a\nb\nc", 2), 2);
        assert_eq!(byte_offset_to_line("a\nb\nc", 99), 3);
    }

    #[tokio::test]
    async fn passing_and_failing_fixtures() {
        let temp_dir = TempDir::new().unwrap();
        let pass = write(
            temp_dir.path(),
            "commands/dir.test.md",
            "---\nexpect_output = \"{{DIR:src}}\"\n---\n<cmd>/dir:src</cmd>\n",
        );
        let fail = write(
            temp_dir.path(),
            "commands/unknown.test.md",
            "---\nexpect_output = \"/frobnicate\"\n---\n<cmd>/frobnicate</cmd>\n",
        );

        assert!(matches!(run_single_test(&pass).await.outcome, TestOutcome::Pass));
        let TestOutcome::Fail(reason) = run_single_test(&fail).await.outcome else {
            panic!("unknown command without expect_error must fail");
        };
        assert!(reason.contains("unexpected compile error"));

        assert_eq!(run_tests(temp_dir.path(), true, &[]).await, 1);
        assert_eq!(run_tests(&pass, true, &[]).await, 0);
    }

    #[tokio::test]
    async fn block_expectations_are_checked() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            temp_dir.path(),
            "blocks.test.md",
            "---\n[[expect_blocks]]\nkind = \"text\"\ntext = \"Hi\"\n\n[[expect_blocks]]\nkind = \"command\"\ncomplete = false\n---\nHi\n<cmd>/dir:src",
        );
        assert!(matches!(run_single_test(&path).await.outcome, TestOutcome::Pass));
    }

    #[tokio::test]
    async fn warning_lines_follow_legacy_repair() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = |line: usize| {
            format!(
                "---\n[[toolchains]]\nname = \"docker\"\nfail = \"daemon not running\"\n\n[[expect_warnings]]\ncontains = \"daemon not running\"\nline = {}\n---\nIntro\n```devin\n/docker:up\n```\n",
                line
            )
        };
        // the fence opens on line 2; repair inserts a blank line and `<cmd>`
        let repaired_line = write(temp_dir.path(), "repaired.test.md", &fixture(4));
        let raw_line = write(temp_dir.path(), "raw.test.md", &fixture(3));

        assert!(matches!(run_single_test(&repaired_line).await.outcome, TestOutcome::Pass));
        let TestOutcome::Fail(reason) = run_single_test(&raw_line).await.outcome else {
            panic!("line of the unrepaired reply must not match");
        };
        assert!(reason.contains("span is on line 4"));
    }

    #[test]
    fn categories_include_subfolders() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.test.md", "");
        write(temp_dir.path(), "scanner/b.test.md", "");
        write(temp_dir.path(), "scanner/legacy/c.test.md", "");
        write(temp_dir.path(), "compiler/d.test.md", "");

        let all = discover_categorized(temp_dir.path());
        assert_eq!(
            all.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["", "compiler", "scanner", "scanner/legacy"]
        );

        let selected = select_categories(all, &["scanner".to_string()]);
        assert_eq!(
            selected.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["scanner", "scanner/legacy"]
        );
    }
}
