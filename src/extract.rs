//! Text post-processing for LLM CLI replies.

use std::sync::OnceLock;

use regex::Regex;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| {
        Regex::new(r"```(?:[A-Za-z0-9_+.-]*[ \t]*\r?\n)?([\s\S]*?)```").expect("valid literal regex")
    })
}

/// Body of the first fenced block, trimmed; the whole input trimmed when
/// there is no complete fence.
pub fn extract_fenced_block(text: &str) -> &str {
    fence_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
}

/// The outermost `{...}` slice, after unwrapping a fenced block if present.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = extract_fenced_block(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tagged_block() {
        assert_eq!(extract_fenced_block("```js\nfoo();\n```"), "foo();");
    }

    #[test]
    fn no_fence_returns_trimmed_input() {
        assert_eq!(extract_fenced_block("  let x = 1;\n"), "let x = 1;");
    }

    #[test]
    fn takes_first_block_among_prose() {
        let text = "Here you go:\n```javascript\nconst a = 1;\n```\nand\n```\nb\n```";
        assert_eq!(extract_fenced_block(text), "const a = 1;");
    }

    #[test]
    fn untagged_block_without_newline() {
        assert_eq!(extract_fenced_block("```x = 2```"), "x = 2");
    }

    #[test]
    fn unterminated_fence_is_left_alone() {
        assert_eq!(extract_fenced_block("```js\nfoo();"), "```js\nfoo();");
    }

    #[test]
    fn json_object_inside_fence() {
        let text = "```json\n{\"message\": \"hi\"}\n```";
        assert_eq!(extract_json_object(text), Some("{\"message\": \"hi\"}"));
    }

    #[test]
    fn json_object_surrounded_by_prose() {
        let text = "Sure! {\"message\": \"ok\", \"action\": {\"type\": \"listSessions\"}} done";
        assert_eq!(
            extract_json_object(text),
            Some("{\"message\": \"ok\", \"action\": {\"type\": \"listSessions\"}}")
        );
    }

    #[test]
    fn no_braces_yields_none() {
        assert_eq!(extract_json_object("just words"), None);
    }
}
