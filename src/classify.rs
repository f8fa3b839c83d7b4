//! Message selection for tools that exit with a nonzero code.
//!
//! Best effort: the default policy looks for a line mentioning "error" and
//! falls back to the last stderr line. Tools with their own conventions pick
//! a different policy.

/// How to turn stderr into a one-line failure message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExitMessagePolicy {
    /// First line containing "error" (case-insensitive), else last line.
    #[default]
    ErrorSubstring,
    /// First line starting with the prefix, else last line.
    Prefix(String),
}

/// Pick the message for a nonzero exit.
///
/// Priority: policy match, then the last non-empty stderr line, then a
/// synthesized "<tool> exited with code <n>".
pub fn nonzero_exit_message(
    policy: &ExitMessagePolicy,
    tool: &str,
    stderr: &str,
    exit_code: Option<i32>,
) -> String {
    let lines: Vec<&str> = stderr
        .trim()
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();

    let matched = match policy {
        ExitMessagePolicy::ErrorSubstring => lines
            .iter()
            .find(|l| l.to_lowercase().contains("error"))
            .copied(),
        ExitMessagePolicy::Prefix(prefix) => lines
            .iter()
            .find(|l| l.trim_start().starts_with(prefix.as_str()))
            .copied(),
    };

    if let Some(line) = matched.or_else(|| lines.last().copied()) {
        return line.trim().to_owned();
    }

    match exit_code {
        Some(code) => format!("{tool} exited with code {code}"),
        None => format!("{tool} exited with code unknown"),
    }
}
