//! Small text helpers: identifier slugs and command-line splitting.

use std::sync::OnceLock;

use regex::Regex;

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s/:]+").expect("static regex"))
}

fn disallowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9\-]+").expect("static regex"))
}

fn dashes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-+").expect("static regex"))
}

/// Turns arbitrary text into a filesystem and URL safe slug.
///
/// Returns `"run"` when nothing usable is left.
pub fn slugify(text: &str) -> String {
    let cleaned = separator_re().replace_all(text, "-");
    let cleaned = disallowed_re().replace_all(&cleaned, "-");
    let cleaned = dashes_re().replace_all(&cleaned, "-");
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Splits a command line into words using POSIX shell quoting rules.
///
/// Returns `None` on an unterminated quote or a trailing backslash.
pub fn split_command_line(line: &str) -> Option<Vec<String>> {
    shlex::split(line)
}
