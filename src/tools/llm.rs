//! LLM CLI (Claude Code by default): code beautification, explanation and
//! the interceptor chat assistant.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::availability::Availability;
use crate::config::ToolgateConfig;
use crate::error::ToolError;
use crate::extract::{extract_fenced_block, extract_json_object};
use crate::hints::HintRules;
use crate::prompt;
use crate::resolve::resolve_command;
use crate::subprocess::{self, RunRequest};

pub const TOOL_NAME: &str = "Claude CLI";

/// Largest code payload accepted for beautify/explain (100 KiB).
pub const MAX_CODE_BYTES: usize = 100 * 1024;

const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

const INSTALL_HINT: &str = "Install it with: npm install -g @anthropic-ai/claude-code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    ListSessions,
    ShowSession,
    StartCapture,
    RunScan,
    #[serde(rename = "generateOpenAPI")]
    GenerateOpenApi,
    RunMock,
    Analyze,
}

/// Something the assistant wants the dashboard to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ChatAction>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    message: Option<String>,
    action: Option<Value>,
}

/// Turn the model's stdout into a reply.
///
/// A `{message, action?}` object is taken from the text (fences stripped,
/// outermost braces). An action the dashboard doesn't know is dropped; text
/// that isn't JSON at all becomes the message verbatim.
pub fn parse_chat_reply(stdout: &str) -> ChatReply {
    let parsed = extract_json_object(stdout)
        .and_then(|json| serde_json::from_str::<RawReply>(json).ok());

    let Some(raw) = parsed else {
        let text = stdout.trim();
        return ChatReply {
            message: if text.is_empty() {
                "I'm not sure how to help with that.".to_owned()
            } else {
                text.to_owned()
            },
            action: None,
        };
    };

    let action = raw.action.and_then(|v| match serde_json::from_value::<ChatAction>(v) {
        Ok(action) => Some(action),
        Err(e) => {
            debug!("dropping unrecognized chat action: {e}");
            None
        }
    });
    ChatReply {
        message: raw
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "I processed your request.".to_owned()),
        action,
    }
}

/// Reject empty or oversized code before anything is spawned.
pub fn check_code(code: &str) -> Result<(), ToolError> {
    if code.is_empty() {
        return Err(ToolError::precondition("Code is required", None));
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(ToolError::precondition(
            format!("Code exceeds maximum size of {}KB", MAX_CODE_BYTES / 1024),
            None,
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LlmCli {
    cmd: String,
    timeout: Duration,
    chat_timeout: Duration,
    hints: HintRules,
}

impl LlmCli {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        LlmCli {
            cmd: cfg.llm_cmd.clone(),
            timeout: Duration::from_secs(cfg.llm_timeout_sec),
            chat_timeout: CHAT_TIMEOUT.min(Duration::from_secs(cfg.llm_timeout_sec)),
            hints: HintRules::new()
                .code("ENOENT", INSTALL_HINT)
                .code("EACCES", "Permission denied - check execute permissions on the LLM CLI"),
        }
    }

    /// The CLI is looked up on `PATH` (or taken as an explicit path).
    pub fn availability(&self) -> Availability {
        match resolve_command(&self.cmd) {
            Some(_) => Availability::ok(),
            None => Availability::missing(
                format!("{TOOL_NAME} not found: {}", self.cmd),
                INSTALL_HINT.to_owned(),
            ),
        }
    }

    fn program(&self) -> Result<PathBuf, ToolError> {
        resolve_command(&self.cmd).ok_or_else(|| ToolError::NotAvailable {
            tool: TOOL_NAME.to_owned(),
            error: format!("{TOOL_NAME} not found: {}", self.cmd),
            hint: INSTALL_HINT.to_owned(),
        })
    }

    fn request(&self, program: PathBuf, timeout: Duration) -> RunRequest {
        RunRequest::new(TOOL_NAME, program, std::env::temp_dir(), timeout)
            .with_hints(self.hints.clone())
            .with_redacted_args()
    }

    /// Rewrite obfuscated JavaScript. Only the first fenced block of the
    /// reply is kept.
    pub fn beautify(&self, code: &str) -> Result<String, ToolError> {
        check_code(code)?;
        let program = self.program()?;
        let request = self
            .request(program, self.timeout)
            .with_args(["-p", prompt::BEAUTIFY_PROMPT])
            .with_input(code)
            .with_timeout_hint(Some("Request timed out - code may be too complex".to_owned()));
        let raw = subprocess::run(&request).into_result()?;
        Ok(extract_fenced_block(&raw).to_owned())
    }

    pub fn explain(&self, code: &str) -> Result<String, ToolError> {
        check_code(code)?;
        let program = self.program()?;
        let request = self
            .request(program, self.timeout)
            .with_args(["-p", prompt::EXPLAIN_PROMPT])
            .with_input(code)
            .with_timeout_hint(Some("Request timed out - code may be too complex".to_owned()));
        subprocess::run(&request).into_result()
    }

    /// One chat turn. A `cancel` token lets a newer turn kill this one.
    pub fn chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        cancel: Option<CancellationToken>,
    ) -> Result<ChatReply, ToolError> {
        if message.trim().is_empty() {
            return Err(ToolError::precondition("message is required", None));
        }
        let program = self.program()?;
        let request = self
            .request(program, self.chat_timeout)
            .with_args(["--print"])
            .with_input(prompt::chat_prompt(message, history))
            .with_timeout_hint(Some("Request timed out. Please try again.".to_owned()))
            .with_cancel(cancel);
        let raw = subprocess::run(&request).into_result()?;
        Ok(parse_chat_reply(&raw))
    }
}
