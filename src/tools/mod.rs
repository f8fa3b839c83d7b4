//! Adapters for the wrapped command-line tools.
//!
//! Each adapter owns a [`ToolProfile`] (where the tool lives, how long it may
//! run, how its failures are explained) and turns typed options into an argv.
//! The argv builders are pure functions so they can be tested without the
//! tool installed.

pub mod ghidra;
pub mod interceptor;
pub mod jadx;
pub mod llm;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::availability::{Availability, ToolCheck};
use crate::classify::ExitMessagePolicy;
use crate::config::ToolgateConfig;
use crate::error::ToolError;
use crate::hints::HintRules;
use crate::subprocess::{self, RunRequest};

use self::ghidra::Ghidra;
use self::interceptor::Interceptor;
use self::jadx::Jadx;
use self::llm::LlmCli;

/// All adapters, built once from the resolved configuration.
#[derive(Debug, Clone)]
pub struct Toolset {
    pub jadx: Jadx,
    pub ghidra: Ghidra,
    pub interceptor: Interceptor,
    pub llm: LlmCli,
}

/// Availability of every tool, keyed by adapter.
#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub jadx: Availability,
    pub ghidra: Availability,
    pub interceptor: Availability,
    pub llm: Availability,
}

impl Toolset {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        Toolset {
            jadx: Jadx::from_config(cfg),
            ghidra: Ghidra::from_config(cfg),
            interceptor: Interceptor::from_config(cfg),
            llm: LlmCli::from_config(cfg),
        }
    }

    /// Fresh pre-flight of every tool; nothing is cached.
    pub fn report(&self) -> ToolReport {
        ToolReport {
            jadx: self.jadx.availability(),
            ghidra: self.ghidra.availability(),
            interceptor: self.interceptor.availability(),
            llm: self.llm.availability(),
        }
    }
}

/// Everything the runner needs to know about one installed tool.
#[derive(Debug, Clone)]
pub struct ToolProfile {
    pub name: String,
    pub root: PathBuf,
    /// Binary or script. With an interpreter it becomes the first argument.
    pub executable: PathBuf,
    pub interpreter: Option<String>,
    pub default_timeout: Duration,
    pub timeout_hint: Option<String>,
    pub install_hint: String,
    pub build_hint: String,
    pub hints: HintRules,
    pub exit_policy: ExitMessagePolicy,
}

impl ToolProfile {
    pub fn availability(&self) -> Availability {
        ToolCheck {
            tool_name: self.name.clone(),
            root: self.root.clone(),
            binary: self.executable.clone(),
            install_hint: self.install_hint.clone(),
            build_hint: self.build_hint.clone(),
        }
        .check()
    }

    /// Build the run request; runs from the tool root.
    pub fn request<I, S>(&self, args: I, timeout: Option<Duration>) -> RunRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let base = match &self.interpreter {
            Some(interpreter) => RunRequest::new(&self.name, interpreter, &self.root, timeout)
                .with_args([self.executable.as_os_str()]),
            None => RunRequest::new(&self.name, &self.executable, &self.root, timeout),
        };
        base.with_args(args)
            .with_timeout_hint(self.timeout_hint.clone())
            .with_hints(self.hints.clone())
            .with_exit_policy(self.exit_policy.clone())
    }

    /// Pre-flight, then run. Returns trimmed stdout.
    pub fn invoke<I, S>(&self, args: I, timeout: Option<Duration>) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.availability().into_result(&self.name)?;
        subprocess::run(&self.request(args, timeout)).into_result()
    }
}

/// Fail with a precondition error unless `path` is an existing file.
pub(crate) fn require_file(path: &Path, hint: &str) -> Result<(), ToolError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ToolError::precondition(
            format!("Input file not found: {}", path.display()),
            Some(hint),
        ))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::fs;
    use std::path::Path;

    /// Write an executable `sh` script standing in for a real tool.
    pub(crate) fn write_script(path: &Path, body: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
}
