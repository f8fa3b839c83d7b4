//! Hint rules for spawn failures.
//!
//! An ordered list of `(matcher, hint)` pairs evaluated against a structured
//! view of the OS error. First match wins.

use std::io;

/// Structured view of an error returned by `Command::spawn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnFailure {
    pub kind: io::ErrorKind,
    /// errno symbol (`ENOENT`, `EACCES`, ...) when the OS reported one we know.
    pub code: Option<&'static str>,
    pub message: String,
}

impl SpawnFailure {
    pub fn from_io(err: &io::Error) -> Self {
        SpawnFailure {
            kind: err.kind(),
            code: err.raw_os_error().and_then(errno_name),
            message: err.to_string(),
        }
    }
}

#[cfg(unix)]
fn errno_name(raw: i32) -> Option<&'static str> {
    let name = match raw {
        libc::ENOENT => "ENOENT",
        libc::EACCES => "EACCES",
        libc::EPERM => "EPERM",
        libc::ENOEXEC => "ENOEXEC",
        libc::ENOTDIR => "ENOTDIR",
        libc::E2BIG => "E2BIG",
        libc::ENOMEM => "ENOMEM",
        libc::EMFILE => "EMFILE",
        libc::EAGAIN => "EAGAIN",
        libc::ETXTBSY => "ETXTBSY",
        _ => return None,
    };
    Some(name)
}

#[cfg(not(unix))]
fn errno_name(raw: i32) -> Option<&'static str> {
    match raw {
        2 | 3 => Some("ENOENT"),
        5 => Some("EACCES"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintMatch {
    /// errno symbol; also matches when the symbol appears in the message.
    Code(String),
    Kind(io::ErrorKind),
    Contains(String),
}

impl HintMatch {
    fn matches(&self, failure: &SpawnFailure) -> bool {
        match self {
            HintMatch::Code(code) => {
                failure.code == Some(code.as_str()) || failure.message.contains(code.as_str())
            }
            HintMatch::Kind(kind) => failure.kind == *kind,
            HintMatch::Contains(needle) => failure.message.contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintRule {
    pub matcher: HintMatch,
    pub hint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintRules {
    rules: Vec<HintRule>,
}

impl HintRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: &str, hint: &str) -> Self {
        self.push(HintMatch::Code(code.to_owned()), hint);
        self
    }

    pub fn kind(mut self, kind: io::ErrorKind, hint: &str) -> Self {
        self.push(HintMatch::Kind(kind), hint);
        self
    }

    pub fn contains(mut self, needle: &str, hint: &str) -> Self {
        self.push(HintMatch::Contains(needle.to_owned()), hint);
        self
    }

    fn push(&mut self, matcher: HintMatch, hint: &str) {
        self.rules.push(HintRule {
            matcher,
            hint: hint.to_owned(),
        });
    }

    pub fn lookup(&self, failure: &SpawnFailure) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(failure))
            .map(|rule| rule.hint.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: io::ErrorKind, code: Option<&'static str>, message: &str) -> SpawnFailure {
        SpawnFailure {
            kind,
            code,
            message: message.to_owned(),
        }
    }

    #[test]
    fn code_rule_matches_errno_symbol() {
        let rules = HintRules::new().code("ENOENT", "binary not found");
        let f = failure(
            io::ErrorKind::NotFound,
            Some("ENOENT"),
            "No such file or directory (os error 2)",
        );
        assert_eq!(rules.lookup(&f), Some("binary not found"));
    }

    #[test]
    fn code_rule_matches_symbol_in_message_text() {
        let rules = HintRules::new().code("ENOENT", "binary not found");
        let f = failure(io::ErrorKind::Other, None, "spawn jadx ENOENT");
        assert_eq!(rules.lookup(&f), Some("binary not found"));
    }

    #[test]
    fn no_matching_rule_yields_none() {
        let rules = HintRules::new().code("EACCES", "permission denied");
        let f = failure(io::ErrorKind::NotFound, Some("ENOENT"), "not found");
        assert_eq!(rules.lookup(&f), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = HintRules::new()
            .kind(io::ErrorKind::NotFound, "first")
            .code("ENOENT", "second");
        let f = failure(io::ErrorKind::NotFound, Some("ENOENT"), "x");
        assert_eq!(rules.lookup(&f), Some("first"));
    }

    #[test]
    fn contains_rule_matches_substring() {
        let rules = HintRules::new().contains("JAVA_HOME", "set JAVA_HOME");
        let f = failure(io::ErrorKind::Other, None, "JAVA_HOME is not set");
        assert_eq!(rules.lookup(&f), Some("set JAVA_HOME"));
    }

    #[cfg(unix)]
    #[test]
    fn from_io_maps_raw_errno() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        let f = SpawnFailure::from_io(&err);
        assert_eq!(f.code, Some("EACCES"));
        assert_eq!(f.kind, io::ErrorKind::PermissionDenied);
    }
}
