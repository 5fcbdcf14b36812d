//! 能力参数的 JSON Schema 生成与解析
//!
//! 参数结构体派生 schemars::JsonSchema，parameters_schema 直接由类型生成，避免手写 schema 与实现不一致。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::TutorError;

/// 能力调用格式：与工具循环解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct CapabilityCallFormat {
    /// 能力名，如 get_audio_transcript、speak、end_observation_cycle
    pub tool: String,
    /// 能力参数，依能力不同而不同
    pub args: HashMap<String, Value>,
}

/// 返回能力调用的 JSON Schema 字符串，可拼入 system prompt
pub fn capability_call_schema_json() -> String {
    let schema = schema_for!(CapabilityCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 参数类型的 JSON Schema（去掉 $schema / title 等元信息）
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 解析能力参数；null 视为空对象，失败返回 InvalidArguments
pub fn parse_args<T: DeserializeOwned>(capability: &str, args: Value) -> Result<T, TutorError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| TutorError::InvalidArguments {
        capability: capability.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Args {
        text: String,
        #[serde(default)]
        loud: bool,
    }

    #[test]
    fn test_schema_of_lists_properties() {
        let s = schema_of::<Args>();
        assert_eq!(s["type"], "object");
        assert!(s["properties"]["text"].is_object());
        assert!(s.get("$schema").is_none());
        assert_eq!(s["required"], serde_json::json!(["text"]));
    }

    #[test]
    fn test_parse_args_errors_are_structured() {
        let err = parse_args::<Args>("speak", serde_json::json!({"loud": true})).unwrap_err();
        assert!(matches!(err, TutorError::InvalidArguments { ref capability, .. } if capability == "speak"));
        let ok: Args = parse_args("speak", serde_json::json!({"text": "hi"})).unwrap();
        assert_eq!(ok.text, "hi");
        assert!(!ok.loud);
    }

    #[test]
    fn test_call_format_schema() {
        let s = capability_call_schema_json();
        assert!(s.contains("\"tool\""));
        assert!(s.contains("\"args\""));
    }
}
