//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `OAIT__*` 覆盖（双下划线表示嵌套，如 `OAIT__CYCLE__MIN_INTERVAL_SECS=2`）。
//! 每个键都有默认值，空配置即可运行。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::TutorError;
use crate::models::DriveMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub evidence: EvidenceSection,
    pub triggers: TriggersSection,
    pub cycle: CycleSection,
    pub tool_loop: ToolLoopSection,
    pub llm: LlmSection,
    pub storage: StorageSection,
    pub gateway: GatewaySection,
}

impl AppConfig {
    /// 构建会话工厂前调用
    pub fn validate(&self) -> Result<(), TutorError> {
        self.cycle.validate()
    }
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 未设置 RUST_LOG 时的日志过滤
    pub log_filter: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "oait".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

/// [evidence] 段：滑动窗口与静默阈值（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvidenceSection {
    pub transcript_retention_secs: f64,
    pub silence_threshold_secs: f64,
    /// OBSERVING 阶段拼接的转写窗口
    pub observation_window_secs: f64,
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            transcript_retention_secs: 30.0,
            silence_threshold_secs: 3.0,
            observation_window_secs: 10.0,
        }
    }
}

/// [triggers] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    /// 检测显式提问时回看的秒数
    pub question_window_secs: f64,
    pub question_phrases: Vec<String>,
    /// 错误模式（正则，不区分大小写）
    pub error_patterns: Vec<String>,
    pub stuck_phrases: Vec<String>,
    /// 会话第一个周期无条件触发
    pub initial_analysis: bool,
}

impl Default for TriggersSection {
    fn default() -> Self {
        Self {
            question_window_secs: 5.0,
            question_phrases: vec![
                "how do".into(),
                "what is".into(),
                "can you".into(),
                "help".into(),
            ],
            error_patterns: vec![
                r"\b(oops|whoops)\b".into(),
                r"\bthat'?s (wrong|not right)\b".into(),
                r"\b(made|make) a mistake\b".into(),
                r"\bdoesn'?t (add up|work)\b".into(),
            ],
            stuck_phrases: vec![
                "i'm stuck".into(),
                "i am stuck".into(),
                "i don't know".into(),
                "no idea".into(),
                "confused".into(),
            ],
            initial_analysis: true,
        }
    }
}

/// [cycle] 段：周期控制器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleSection {
    pub drive_mode: DriveMode,
    /// 两次周期之间的最小间隔（秒）
    pub min_interval_secs: f64,
    /// 定时器节拍（秒）
    pub tick_interval_secs: f64,
    pub confidence_threshold: f64,
    /// OBSERVING 阶段白板缓存过期时是否向客户端拉取
    pub pull_whiteboard: bool,
    pub pull_timeout_secs: f64,
    /// 白板缓存有效期（秒）
    pub whiteboard_cache_secs: f64,
}

impl Default for CycleSection {
    fn default() -> Self {
        Self {
            drive_mode: DriveMode::Rules,
            min_interval_secs: 1.0,
            tick_interval_secs: 1.0,
            confidence_threshold: 0.7,
            pull_whiteboard: true,
            pull_timeout_secs: 5.0,
            whiteboard_cache_secs: 3.0,
        }
    }
}

impl CycleSection {
    /// 校验各时长字段；未通过校验时下面的访问器退回默认值
    pub fn validate(&self) -> Result<(), TutorError> {
        secs("cycle.min_interval_secs", self.min_interval_secs)?;
        secs("cycle.tick_interval_secs", self.tick_interval_secs)?;
        secs("cycle.pull_timeout_secs", self.pull_timeout_secs)?;
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        secs("cycle.min_interval_secs", self.min_interval_secs).unwrap_or(Duration::from_secs(1))
    }

    pub fn tick_interval(&self) -> Duration {
        secs("cycle.tick_interval_secs", self.tick_interval_secs).unwrap_or(Duration::from_secs(1))
    }

    pub fn pull_timeout(&self) -> Duration {
        secs("cycle.pull_timeout_secs", self.pull_timeout_secs).unwrap_or(Duration::from_secs(5))
    }
}

/// [tool_loop] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolLoopSection {
    /// 单个周期内最多的能力调用轮数
    pub max_iterations: usize,
    /// 单次能力调用超时（秒）
    pub capability_timeout_secs: u64,
    /// 带入下一周期的历史消息条数
    pub history_messages: usize,
}

impl Default for ToolLoopSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            capability_timeout_secs: 30,
            history_messages: 4,
        }
    }
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "google/gemini-3.0-pro".to_string(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.3,
        }
    }
}

/// [storage] 段：未设置 sqlite_path 时使用内存存储
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub sqlite_path: Option<PathBuf>,
}

/// [gateway] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub bind_addr: String,
    pub heartbeat_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7860".to_string(),
            heartbeat_secs: 30,
        }
    }
}

/// 秒数转 Duration：负数、NaN、无穷或超出 Duration 范围都是配置错误
fn secs(key: &str, v: f64) -> Result<Duration, TutorError> {
    if !v.is_finite() || v < 0.0 {
        return Err(TutorError::Config(format!("{key} must be a non-negative number of seconds, got {v}")));
    }
    Duration::try_from_secs_f64(v).map_err(|e| TutorError::Config(format!("{key} is out of range ({v}): {e}")))
}

/// 从 config 目录加载配置，环境变量 OAIT__* 可覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("OAIT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
