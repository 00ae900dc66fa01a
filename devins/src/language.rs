//! Language tag tables for fenced code.
//!
//! Tags are what the model writes after the opening fence (`kotlin`, `c#`,
//! `http request`). Extensions are what a host uses to pick a file type.

/// Host-side language lookup, consulted before the static tables.
///
/// A host with a real language registry (an editor, an LSP client) can map
/// tags this crate has never heard of.
pub trait LanguageRegistry: Send + Sync {
    /// Resolve a language tag to a file extension, if the host knows it.
    fn extension_for(&self, tag: &str) -> Option<String>;
}

/// A registry that knows nothing; everything falls through to the static table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLanguages;

impl LanguageRegistry for StaticLanguages {
    fn extension_for(&self, _tag: &str) -> Option<String> {
        None
    }
}

const TAG_TO_EXT: &[(&str, &str)] = &[
    ("c#", "cs"),
    ("csharp", "cs"),
    ("c++", "cpp"),
    ("cpp", "cpp"),
    ("c", "c"),
    ("java", "java"),
    ("javascript", "js"),
    ("js", "js"),
    ("kotlin", "kt"),
    ("kt", "kt"),
    ("python", "py"),
    ("py", "py"),
    ("ruby", "rb"),
    ("rb", "rb"),
    ("swift", "swift"),
    ("typescript", "ts"),
    ("ts", "ts"),
    ("markdown", "md"),
    ("md", "md"),
    ("sql", "sql"),
    ("plantuml", "puml"),
    ("puml", "puml"),
    ("shell", "sh"),
    ("bash", "sh"),
    ("sh", "sh"),
    ("shell script", "sh"),
    ("objective-c", "m"),
    ("objective-c++", "mm"),
    ("go", "go"),
    ("html", "html"),
    ("css", "css"),
    ("dart", "dart"),
    ("scala", "scala"),
    ("rust", "rs"),
    ("rs", "rs"),
    ("http request", "http"),
    ("http", "http"),
    ("devin", "devin"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("xml", "xml"),
    ("toml", "toml"),
    ("dockerfile", "dockerfile"),
];

const EXT_TO_NAME: &[(&str, &str)] = &[
    ("cs", "C#"),
    ("cpp", "C++"),
    ("c", "C"),
    ("java", "Java"),
    ("js", "JavaScript"),
    ("kt", "Kotlin"),
    ("py", "Python"),
    ("rb", "Ruby"),
    ("swift", "Swift"),
    ("ts", "TypeScript"),
    ("md", "Markdown"),
    ("sql", "SQL"),
    ("puml", "PlantUML"),
    ("sh", "Shell Script"),
    ("m", "Objective-C"),
    ("mm", "Objective-C++"),
    ("go", "Go"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("dart", "Dart"),
    ("scala", "Scala"),
    ("rs", "Rust"),
    ("http", "HTTP Request"),
    ("devin", "DevIn"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("xml", "XML"),
    ("toml", "TOML"),
    ("dockerfile", "Dockerfile"),
];

/// Map a language tag to a file extension. Unmapped tags pass through unchanged.
pub fn lookup_file_ext(tag: &str) -> String {
    let lower = tag.trim().to_lowercase();
    TAG_TO_EXT
        .iter()
        .find(|(t, _)| *t == lower)
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_else(|| tag.trim().to_string())
}

/// Map a file extension back to a display name. Unmapped extensions are upper-cased.
pub fn display_name_by_ext(ext: &str) -> String {
    let lower = ext.trim().to_lowercase();
    EXT_TO_NAME
        .iter()
        .find(|(e, _)| *e == lower)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| ext.trim().to_uppercase())
}

/// Normalize a tag alias to the display name a host registry would use.
///
/// `cpp` becomes `C++`, `bash` becomes `Shell Script`. Unknown tags are
/// returned as written.
pub fn canonical_language_name(tag: &str) -> String {
    let lower = tag.trim().to_lowercase();
    if TAG_TO_EXT.iter().any(|(t, _)| *t == lower) {
        display_name_by_ext(&lookup_file_ext(&lower))
    } else {
        tag.trim().to_string()
    }
}

/// Resolve the extension for a tag: host registry first, static table second.
pub fn resolve_extension(registry: &dyn LanguageRegistry, tag: &str) -> String {
    registry
        .extension_for(tag)
        .unwrap_or_else(|| lookup_file_ext(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_tags() {
        assert_eq!(lookup_file_ext("kotlin"), "kt");
        assert_eq!(lookup_file_ext("Kotlin"), "kt");
        assert_eq!(lookup_file_ext("http request"), "http");
        assert_eq!(lookup_file_ext("c#"), "cs");
        assert_eq!(lookup_file_ext("yml"), "yaml");
    }

    #[test]
    fn unmapped_tags_pass_through() {
        assert_eq!(lookup_file_ext("zig"), "zig");
        assert_eq!(lookup_file_ext("Haskell"), "Haskell");
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name_by_ext("kt"), "Kotlin");
        assert_eq!(display_name_by_ext("sh"), "Shell Script");
        assert_eq!(display_name_by_ext("zig"), "ZIG");
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_language_name("cpp"), "C++");
        assert_eq!(canonical_language_name("bash"), "Shell Script");
        assert_eq!(canonical_language_name("http"), "HTTP Request");
        assert_eq!(canonical_language_name("brainfuck"), "brainfuck");
    }

    #[test]
    fn host_registry_wins() {
        struct Host;
        impl LanguageRegistry for Host {
            fn extension_for(&self, tag: &str) -> Option<String> {
                (tag == "kotlin").then(|| "kts".to_string())
            }
        }
        assert_eq!(resolve_extension(&Host, "kotlin"), "kts");
        assert_eq!(resolve_extension(&Host, "java"), "java");
        assert_eq!(resolve_extension(&StaticLanguages, "kotlin"), "kt");
    }
}
