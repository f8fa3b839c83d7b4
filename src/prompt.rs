//! Every prompt handed to the LLM CLI is built here.
//!
//! # Injection risk
//!
//! Code submitted for beautify/explain and chat messages come straight from
//! HTTP callers. Code travels on stdin, separate from the `-p` instruction
//! argument, so it is never parsed as part of the instruction envelope. The
//! chat prompt has to inline the conversation; user text there is labelled
//! by role under fixed section headings.
//!
//! Arguments are passed to `std::process::Command` directly, never through
//! a shell, so shell meta-characters have no effect.

use crate::tools::llm::{ChatMessage, Role};

/// Conversation turns carried into each chat prompt.
pub const CHAT_HISTORY_LIMIT: usize = 6;

pub const BEAUTIFY_PROMPT: &str = "You are a JavaScript code beautifier. Your ONLY job is to output beautified code.

RULES:
1. Output ONLY valid JavaScript code - no markdown, no explanations, no questions
2. Rename obfuscated variables (a, b, _0x123) to meaningful names
3. Add brief comments for complex logic
4. Preserve all functionality

CRITICAL: Your response must start with code and contain ONLY code. Never ask questions or add explanations.";

pub const EXPLAIN_PROMPT: &str = "You are a reverse-engineering assistant. Explain the code provided on stdin.

Cover, in this order:
1. Purpose: what the code does overall, in two or three sentences
2. Flow: the main steps, naming the functions or variables involved
3. Data: inputs, outputs and any network, storage or crypto calls
4. Concerns: obfuscation tricks, security issues or suspicious behaviour

Be concise. Use plain text with short headings. Do not rewrite the code.";

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are an AI assistant for the Interceptor Toolkit, a network traffic capture and API analysis tool.

## Available Actions
You can help users by executing these actions (return them in your JSON response):

1. **listSessions** - List all capture sessions
   - No params needed

2. **showSession** - Show details of a session
   - params: { sessionId: string } (use "latest" for most recent)

3. **startCapture** - Guide user to start capturing traffic
   - params: { port: number, mode: "passive" | "active" }
   - NOTE: Capture runs in terminal, so provide the command for the user to run

4. **runScan** - Run security vulnerability scan on a session
   - params: { sessionId: string, severity?: "low" | "medium" | "high" | "critical" }

5. **generateOpenAPI** - Generate OpenAPI spec from captured traffic
   - params: { sessionId: string, format?: "yaml" | "json", includeExamples?: boolean }

6. **runMock** - Guide user to run mock server
   - params: { sessionId: string, port: number }
   - NOTE: Mock server runs in terminal, provide the command

7. **analyze** - Analyze traffic patterns
   - params: { sessionId: string, task: "summarize" | "endpoints" | "auth" }

## Response Format
Always respond with valid JSON:
{
  "message": "Your helpful response to the user",
  "action": { "type": "actionName", "params": { ... } }
}
The "action" field is optional.

## Guidelines
- Be concise and helpful
- If user wants to capture traffic, explain they need to run the capture command in a terminal
- For actions that can be executed via the API, include the action in your response
- If no action is needed (just answering a question), omit the action field
- If sessions don't exist yet, guide the user to start a capture first

## Example Responses

User: "list my sessions"
{"message": "Here are your capture sessions:", "action": {"type": "listSessions"}}

User: "scan the latest session for security issues"
{"message": "Running a security scan on your latest session...", "action": {"type": "runScan", "params": {"sessionId": "latest"}}}

User: "what is this tool?"
{"message": "The Interceptor Toolkit helps you capture HTTP traffic, analyze APIs, find security vulnerabilities, and generate OpenAPI specs. Start by capturing some traffic, then you can scan it or generate documentation."}"#;

/// Build the chat prompt: system prompt, the last
/// [`CHAT_HISTORY_LIMIT`] turns of `history`, then the current request.
pub fn chat_prompt(message: &str, history: &[ChatMessage]) -> String {
    let mut prompt = format!("{CHAT_SYSTEM_PROMPT}\n\n");

    let recent = &history[history.len().saturating_sub(CHAT_HISTORY_LIMIT)..];
    if !recent.is_empty() {
        prompt.push_str("## Conversation History\n");
        for turn in recent {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "## Current Request\nUser: {message}\n\nRespond with JSON only:"
    ));
    prompt
}
