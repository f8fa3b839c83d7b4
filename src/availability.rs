//! Pre-flight existence checks for installed tools.
//!
//! A check is evaluated fresh on every call; nothing is cached.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ToolError;

/// Where a tool is expected to live and what to tell the user when it isn't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub tool_name: String,
    pub root: PathBuf,
    pub binary: PathBuf,
    pub install_hint: String,
    pub build_hint: String,
}

/// Result of a pre-flight check. Serializes as `{available, error?, hint?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Availability {
    pub fn ok() -> Self {
        Availability {
            available: true,
            error: None,
            hint: None,
        }
    }

    pub fn missing(error: String, hint: String) -> Self {
        Availability {
            available: false,
            error: Some(error),
            hint: Some(hint),
        }
    }

    /// Convert a failed check into the error adapters short-circuit with.
    pub fn into_result(self, tool: &str) -> Result<(), ToolError> {
        if self.available {
            return Ok(());
        }
        Err(ToolError::NotAvailable {
            tool: tool.to_owned(),
            error: self.error.unwrap_or_else(|| format!("{tool} is not available")),
            hint: self.hint.unwrap_or_default(),
        })
    }
}

impl ToolCheck {
    /// The root is checked first: a missing root points at installation,
    /// a missing binary under an existing root points at the build step.
    pub fn check(&self) -> Availability {
        check_available(
            &self.root,
            &self.binary,
            &self.tool_name,
            &self.install_hint,
            &self.build_hint,
        )
    }
}

pub fn check_available(
    root: &Path,
    binary: &Path,
    tool_name: &str,
    install_hint: &str,
    build_hint: &str,
) -> Availability {
    if !root.exists() {
        return Availability::missing(
            format!("{tool_name} not found at {}", root.display()),
            install_hint.to_owned(),
        );
    }
    if !binary.exists() {
        return Availability::missing(
            format!("{tool_name} binary not found at {}", binary.display()),
            build_hint.to_owned(),
        );
    }
    Availability::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_for(root: PathBuf, binary: PathBuf) -> ToolCheck {
        ToolCheck {
            tool_name: "JADX".to_owned(),
            root,
            binary,
            install_hint: "clone it".to_owned(),
            build_hint: "build it".to_owned(),
        }
    }

    #[test]
    fn available_when_root_and_binary_exist() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("jadx");
        std::fs::write(&bin, "").unwrap();

        let result = check_for(dir.path().to_path_buf(), bin).check();
        assert_eq!(result, Availability::ok());
    }

    #[test]
    fn missing_binary_names_binary_and_uses_build_hint() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("build/jadx/bin/jadx");

        let result = check_for(dir.path().to_path_buf(), bin.clone()).check();
        assert!(!result.available);
        let error = result.error.unwrap();
        assert!(error.contains("binary not found"), "got: {error}");
        assert!(error.contains(&bin.display().to_string()));
        assert_eq!(result.hint.as_deref(), Some("build it"));
    }

    #[test]
    fn missing_root_names_root_and_uses_install_hint() {
        let result = check_for(
            PathBuf::from("/no/such/root"),
            PathBuf::from("/no/such/root/bin/jadx"),
        )
        .check();
        assert!(!result.available);
        assert_eq!(result.error.as_deref(), Some("JADX not found at /no/such/root"));
        assert_eq!(result.hint.as_deref(), Some("clone it"));
    }

    #[test]
    fn failed_check_converts_to_not_available() {
        let err = check_for(PathBuf::from("/no/such/root"), PathBuf::from("/x"))
            .check()
            .into_result("JADX")
            .unwrap_err();
        match err {
            ToolError::NotAvailable { tool, hint, .. } => {
                assert_eq!(tool, "JADX");
                assert_eq!(hint, "clone it");
            }
            other => panic!("expected NotAvailable, got: {other:?}"),
        }
    }

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_value(Availability::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "available": true }));
    }
}
