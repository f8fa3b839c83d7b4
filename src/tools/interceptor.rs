//! Interceptor Toolkit CLI (`python3 cli.py ...`): capture sessions,
//! security scans and OpenAPI generation.

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use super::ToolProfile;
use crate::availability::Availability;
use crate::classify::ExitMessagePolicy;
use crate::config::ToolgateConfig;
use crate::error::ToolError;
use crate::hints::HintRules;

pub const TOOL_NAME: &str = "Interceptor Toolkit";

/// Scans and spec generation replay a whole session.
const LONG_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl FromStr for Severity {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == lower)
            .ok_or_else(|| {
                ToolError::InvalidRequest(format!(
                    "Invalid severity. Must be one of: {}",
                    join(Severity::ALL.map(Severity::as_str))
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Auth,
    Exposure,
    Api,
    Transport,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Auth,
        Category::Exposure,
        Category::Api,
        Category::Transport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Auth => "auth",
            Category::Exposure => "exposure",
            Category::Api => "api",
            Category::Transport => "transport",
        }
    }
}

/// Parse a comma-separated category list, naming every invalid entry.
pub fn parse_categories(list: &str) -> Result<Vec<Category>, ToolError> {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for raw in list.split(',') {
        let name = raw.trim().to_ascii_lowercase();
        match Category::ALL.into_iter().find(|c| c.as_str() == name) {
            Some(c) => valid.push(c),
            None => invalid.push(name),
        }
    }
    if invalid.is_empty() {
        Ok(valid)
    } else {
        Err(ToolError::InvalidRequest(format!(
            "Invalid categories: {}. Must be one of: {}",
            invalid.join(", "),
            join(Category::ALL.map(Category::as_str))
        )))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpecFormat {
    #[default]
    Json,
    Yaml,
}

impl SpecFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecFormat::Json => "json",
            SpecFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecFormat {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SpecFormat::Json),
            "yaml" => Ok(SpecFormat::Yaml),
            _ => Err(ToolError::InvalidRequest(
                "Invalid format. Must be one of: yaml, json".to_owned(),
            )),
        }
    }
}

fn join<const N: usize>(names: [&str; N]) -> String {
    names.join(", ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub severity: Option<Severity>,
    pub categories: Vec<Category>,
}

pub fn scan_args(session_id: &str, opts: &ScanOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["scan", "--session", session_id, "--format", "json"]
        .map(OsString::from)
        .to_vec();
    if let Some(sev) = opts.severity {
        args.push("--severity".into());
        args.push(sev.as_str().into());
    }
    if !opts.categories.is_empty() {
        let list: Vec<&str> = opts.categories.iter().map(|c| c.as_str()).collect();
        args.push("--category".into());
        args.push(list.join(",").into());
    }
    args
}

/// `--dry-run` makes the CLI print the spec instead of writing a file.
pub fn openapi_args(session_id: &str, format: SpecFormat, include_examples: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "openapi",
        "--session",
        session_id,
        "--format",
        format.as_str(),
        "--quiet",
    ]
    .map(OsString::from)
    .to_vec();
    if include_examples {
        args.push("--include-examples".into());
    }
    args.push("--dry-run".into());
    args
}

/// JSON when stdout parses as JSON, otherwise the text itself.
pub fn parse_output(stdout: String) -> Value {
    serde_json::from_str(&stdout).unwrap_or(Value::String(stdout))
}

fn require_session(session_id: &str) -> Result<(), ToolError> {
    if session_id.trim().is_empty() {
        return Err(ToolError::precondition("sessionId is required", None));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Interceptor {
    profile: ToolProfile,
}

impl Interceptor {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        let install_hint = format!(
            "Ensure the interceptor-toolkit is installed at {}",
            cfg.interceptor_root.display()
        );
        let profile = ToolProfile {
            name: TOOL_NAME.to_owned(),
            root: cfg.interceptor_root.clone(),
            executable: cfg.interceptor_script.clone(),
            interpreter: Some(cfg.interceptor_python.clone()),
            default_timeout: Duration::from_secs(cfg.interceptor_timeout_sec),
            timeout_hint: None,
            build_hint: install_hint.clone(),
            install_hint,
            hints: HintRules::new()
                .code("ENOENT", "Python3 may not be installed or not in PATH")
                .code("EACCES", "Permission denied - check file permissions on cli.py"),
            exit_policy: ExitMessagePolicy::Prefix("Error:".to_owned()),
        };
        Interceptor { profile }
    }

    pub fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    pub fn availability(&self) -> Availability {
        self.profile.availability()
    }

    pub fn list_sessions(&self) -> Result<Value, ToolError> {
        self.profile
            .invoke(["sessions", "list", "--json"], None)
            .map(parse_output)
    }

    pub fn show_session(&self, session_id: &str) -> Result<Value, ToolError> {
        require_session(session_id)?;
        self.profile
            .invoke(["sessions", "show", session_id, "--json"], None)
            .map(parse_output)
    }

    /// Non-interactive delete (`--force`).
    pub fn delete_session(&self, session_id: &str) -> Result<Value, ToolError> {
        require_session(session_id)?;
        self.profile
            .invoke(["sessions", "delete", session_id, "--force", "--json"], None)
            .map(parse_output)
    }

    pub fn scan(&self, session_id: &str, opts: &ScanOptions) -> Result<Value, ToolError> {
        require_session(session_id)?;
        self.profile
            .invoke(scan_args(session_id, opts), Some(LONG_TIMEOUT))
            .map(parse_output)
    }

    pub fn openapi(
        &self,
        session_id: &str,
        format: SpecFormat,
        include_examples: bool,
    ) -> Result<Value, ToolError> {
        require_session(session_id)?;
        self.profile
            .invoke(
                openapi_args(session_id, format, include_examples),
                Some(LONG_TIMEOUT),
            )
            .map(parse_output)
    }
}
