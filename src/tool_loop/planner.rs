//! 推理输出解析：能力调用或纯文本
//!
//! 推理方每轮输出一个 `{"tool": "...", "args": {...}}`；parse_reasoner_output 从文本中提取 JSON 并解析为 CapabilityCall，
//! 提取不到时视为纯文本（工具循环会提醒推理方只输出能力调用）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 推理方请求的一次能力调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 单轮推理输出
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonerOutput {
    Call(CapabilityCall),
    /// 没有能力调用的文本
    Text(String),
}

/// 提取 JSON 块：优先 ```json ... ```，否则取第一个 '{' 到最后一个 '}'
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析推理输出：含有效 JSON 且 tool 非空则为 Call，否则为 Text
pub fn parse_reasoner_output(output: &str) -> ReasonerOutput {
    let trimmed = output.trim();
    let Some(json_str) = extract_json_block(trimmed) else {
        return ReasonerOutput::Text(trimmed.to_string());
    };
    match serde_json::from_str::<CapabilityCall>(json_str) {
        Ok(call) if !call.tool.trim().is_empty() => ReasonerOutput::Call(CapabilityCall {
            tool: call.tool.trim().to_string(),
            args: call.args,
        }),
        Ok(_) => ReasonerOutput::Text(trimmed.to_string()),
        Err(e) => {
            tracing::debug!(error = %e, "reasoner output is not a capability call");
            ReasonerOutput::Text(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_call() {
        let out = "Let me look.\n```json\n{\"tool\": \"get_whiteboard\", \"args\": {\"analyze\": true}}\n```";
        match parse_reasoner_output(out) {
            ReasonerOutput::Call(c) => {
                assert_eq!(c.tool, "get_whiteboard");
                assert_eq!(c.args, json!({"analyze": true}));
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_call_without_args() {
        match parse_reasoner_output("I'll check: {\"tool\": \"get_session_status\"} ok") {
            ReasonerOutput::Call(c) => {
                assert_eq!(c.tool, "get_session_status");
                assert!(c.args.is_null());
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(
            parse_reasoner_output("  The student is fine.  "),
            ReasonerOutput::Text("The student is fine.".to_string())
        );
        assert!(matches!(
            parse_reasoner_output("{\"tool\": \"\"}"),
            ReasonerOutput::Text(_)
        ));
        assert!(matches!(parse_reasoner_output("{not json}"), ReasonerOutput::Text(_)));
    }

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("x {\"a\": 1} y"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("} nothing {"), None);
        assert_eq!(extract_json_block("plain"), None);
    }
}
