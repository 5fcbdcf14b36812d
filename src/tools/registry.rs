//! 能力注册表
//!
//! 所有能力实现 Capability trait（name / description / class / parameters_schema / invoke），
//! 由 CapabilityRegistry 按名注册与查找。合法的能力集合是数据而不是代码结构：
//! 工具循环在调用时按名解析，未注册的名字得到 UnknownCapability。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TutorError;
use crate::tools::context::ToolContext;

/// 能力类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    /// 只读
    Observation,
    /// 有副作用
    Action,
    /// 影响循环本身
    Control,
}

impl CapabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityClass::Observation => "observation",
            CapabilityClass::Action => "action",
            CapabilityClass::Control => "control",
        }
    }
}

/// 能力 trait：名称、描述（供推理方理解）、类别、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Capability: Send + Sync {
    /// 能力名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn class(&self) -> CapabilityClass;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError>;
}

/// 注册表条目（对外导出的描述）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub class: CapabilityClass,
}

/// 按名存储 Arc<dyn Capability>；BTreeMap 使导出顺序稳定
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的全部能力
    pub fn with_defaults() -> Self {
        use crate::tools::{action, control, observation, pedagogical};
        let mut r = Self::new();
        r.register(observation::GetAudioTranscript);
        r.register(observation::GetWhiteboard);
        r.register(observation::GetCameraFeed);
        r.register(observation::GetSessionStatus);
        r.register(observation::GetStudentProfile);
        r.register(observation::GetObservationMode);
        r.register(pedagogical::VerifyCalculation);
        r.register(pedagogical::AssessConfusionLevel);
        r.register(pedagogical::DetectQuestion);
        r.register(pedagogical::DetectStuckPattern);
        r.register(pedagogical::SuggestInterventionStrategy);
        r.register(action::Speak);
        r.register(action::UpdateStudentModel);
        r.register(action::UpdateStudentProfile);
        r.register(action::SendVisualHint);
        r.register(action::ClearVisualHint);
        r.register(action::DrawOnWhiteboard);
        r.register(action::LogObservation);
        r.register(control::WaitForEvent);
        r.register(control::SetObservationMode);
        r.register(control::EndObservationCycle);
        r
    }

    pub fn register(&mut self, capability: impl Capability + 'static) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, Arc::new(capability));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// 按名分发；未注册的名字返回 UnknownCapability
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> Result<Value, TutorError> {
        let capability = self
            .get(name)
            .ok_or_else(|| TutorError::UnknownCapability(name.to_string()))?;
        capability.invoke(ctx, args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<CapabilityEntry> {
        self.capabilities
            .values()
            .map(|c| CapabilityEntry {
                name: c.name().to_string(),
                description: c.description().to_string(),
                parameters_schema: c.parameters_schema(),
                class: c.class(),
            })
            .collect()
    }

    /// OpenAI function-calling 格式的能力列表
    pub fn to_function_specs(&self) -> Value {
        Value::Array(
            self.entries()
                .into_iter()
                .map(|e| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": e.name,
                            "description": format!("[{}] {}", e.class.as_str(), e.description),
                            "parameters": e.parameters_schema,
                        }
                    })
                })
                .collect(),
        )
    }

    /// 拼入 system prompt 的能力说明
    pub fn prompt_section(&self) -> String {
        let mut out = String::new();
        for class in [
            CapabilityClass::Observation,
            CapabilityClass::Action,
            CapabilityClass::Control,
        ] {
            out.push_str(&format!("{}:\n", class.as_str().to_uppercase()));
            for e in self.entries().into_iter().filter(|e| e.class == class) {
                out.push_str(&format!(
                    "- {}: {}\n  parameters: {}\n",
                    e.name, e.description, e.parameters_schema
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_three_classes() {
        let r = CapabilityRegistry::with_defaults();
        let entries = r.entries();
        for name in [
            "get_audio_transcript",
            "get_whiteboard",
            "get_session_status",
            "verify_calculation",
            "assess_confusion_level",
            "detect_question",
            "detect_stuck_pattern",
            "suggest_intervention_strategy",
            "speak",
            "update_student_model",
            "send_visual_hint",
            "wait_for_event",
            "set_observation_mode",
            "end_observation_cycle",
        ] {
            assert!(r.contains(name), "missing {name}");
        }
        let class_of = |n: &str| entries.iter().find(|e| e.name == n).unwrap().class;
        assert_eq!(class_of("get_whiteboard"), CapabilityClass::Observation);
        assert_eq!(class_of("verify_calculation"), CapabilityClass::Observation);
        assert_eq!(r.names().len(), 21);
        assert_eq!(class_of("speak"), CapabilityClass::Action);
        assert_eq!(class_of("end_observation_cycle"), CapabilityClass::Control);
    }

    #[test]
    fn test_function_specs_shape() {
        let r = CapabilityRegistry::with_defaults();
        let specs = r.to_function_specs();
        let arr = specs.as_array().unwrap();
        assert_eq!(arr.len(), r.names().len());
        let speak = arr
            .iter()
            .find(|s| s["function"]["name"] == "speak")
            .unwrap();
        assert_eq!(speak["type"], "function");
        assert!(speak["function"]["parameters"]["properties"]["text"].is_object());
    }

    #[test]
    fn test_entry_serializes_class_lowercase() {
        let r = CapabilityRegistry::with_defaults();
        let e = r.entries().into_iter().find(|e| e.name == "speak").unwrap();
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["class"], "action");
        assert!(v["parameters_schema"].is_object());
    }
}
