//! 长期学生档案
//!
//! 周期控制器在 DECIDING 开始时只读取 ProfileView（干预延迟、耐心等级、薄弱主题）；
//! 档案的写入只能经由 update_model / update_student_profile 动作。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 基础干预延迟（秒）
pub const DEFAULT_INTERVENTION_DELAY: f64 = 3.0;
/// 薄弱主题折扣：在已知薄弱点上更早介入
pub const STRUGGLE_TOPIC_DISCOUNT: f64 = 0.7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatienceLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl PatienceLevel {
    /// 干预延迟倍率
    pub fn multiplier(&self) -> f64 {
        match self {
            PatienceLevel::Low => 0.5,
            PatienceLevel::Medium => 1.0,
            PatienceLevel::High => 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LearningStyle {
    #[default]
    Visual,
    Verbal,
    Kinesthetic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HintPreference {
    Minimal,
    #[default]
    Moderate,
    Detailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetencyLevel {
    Unknown,
    Struggling,
    Mastered,
}

/// 教学偏好
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedagogyProfile {
    pub patience_level: PatienceLevel,
    pub learning_style: LearningStyle,
    pub hint_preference: HintPreference,
    pub encouragement_frequency: f64,
    /// 干预前等待的基础秒数
    pub optimal_intervention_delay: f64,
}

impl Default for PedagogyProfile {
    fn default() -> Self {
        Self {
            patience_level: PatienceLevel::Medium,
            learning_style: LearningStyle::Visual,
            hint_preference: HintPreference::Moderate,
            encouragement_frequency: 0.5,
            optimal_intervention_delay: DEFAULT_INTERVENTION_DELAY,
        }
    }
}

/// update_model 动作追加的观察笔记
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileNote {
    pub at: DateTime<Utc>,
    pub note: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_id: String,
    #[serde(default)]
    pub pedagogy: PedagogyProfile,
    #[serde(default)]
    pub known_struggle_topics: Vec<String>,
    #[serde(default)]
    pub competencies: BTreeMap<String, CompetencyLevel>,
    #[serde(default)]
    pub notes: Vec<ProfileNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    pub fn new(student_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            student_id: student_id.into(),
            pedagogy: PedagogyProfile::default(),
            known_struggle_topics: Vec::new(),
            competencies: BTreeMap::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn view(&self) -> ProfileView {
        ProfileView {
            optimal_intervention_delay: self.pedagogy.optimal_intervention_delay,
            patience_level: self.pedagogy.patience_level,
            known_struggle_topics: self.known_struggle_topics.clone(),
        }
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        let at = Utc::now();
        self.notes.push(ProfileNote { at, note: note.into() });
        self.updated_at = at;
    }

    /// 标记主题掌握程度；Struggling 同时加入薄弱主题集合
    pub fn set_competency(&mut self, topic: &str, level: CompetencyLevel) {
        self.competencies.insert(topic.to_string(), level);
        let known = self
            .known_struggle_topics
            .iter()
            .position(|t| topic_eq(t, topic));
        match (level, known) {
            (CompetencyLevel::Struggling, None) => self.known_struggle_topics.push(topic.to_string()),
            (CompetencyLevel::Mastered, Some(i)) => {
                self.known_struggle_topics.remove(i);
            }
            _ => {}
        }
        self.updated_at = Utc::now();
    }
}

/// DECIDING 阶段读取的档案字段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileView {
    pub optimal_intervention_delay: f64,
    pub patience_level: PatienceLevel,
    pub known_struggle_topics: Vec<String>,
}

impl Default for ProfileView {
    fn default() -> Self {
        StudentProfile::new("").view()
    }
}

impl ProfileView {
    /// 有效干预延迟：基础延迟 × 耐心倍率 × 薄弱主题折扣。纯函数，相同输入得到相同结果。
    pub fn effective_intervention_delay(&self, topic: Option<&str>) -> f64 {
        let base = if self.optimal_intervention_delay.is_finite() {
            self.optimal_intervention_delay.max(0.0)
        } else {
            DEFAULT_INTERVENTION_DELAY
        };
        let mut delay = base * self.patience_level.multiplier();
        if let Some(topic) = topic {
            if self.known_struggle_topics.iter().any(|t| topic_eq(t, topic)) {
                delay *= STRUGGLE_TOPIC_DISCOUNT;
            }
        }
        delay
    }
}

fn topic_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(patience: PatienceLevel, topics: &[&str]) -> ProfileView {
        ProfileView {
            optimal_intervention_delay: 3.0,
            patience_level: patience,
            known_struggle_topics: topics.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_effective_delay_patience_scaling() {
        assert_eq!(view(PatienceLevel::Medium, &[]).effective_intervention_delay(None), 3.0);
        assert_eq!(view(PatienceLevel::High, &[]).effective_intervention_delay(None), 6.0);
        assert_eq!(view(PatienceLevel::Low, &[]).effective_intervention_delay(None), 1.5);
    }

    #[test]
    fn test_effective_delay_struggle_discount_is_reproducible() {
        let v = view(PatienceLevel::High, &["Fractions"]);
        let first = v.effective_intervention_delay(Some("fractions"));
        let second = v.effective_intervention_delay(Some("fractions"));
        assert!((first - 4.2).abs() < 1e-9);
        assert_eq!(first, second);
        assert_eq!(v.effective_intervention_delay(Some("algebra")), 6.0);
    }

    #[test]
    fn test_set_competency_updates_struggle_topics() {
        let mut p = StudentProfile::new("s1");
        p.set_competency("algebra", CompetencyLevel::Struggling);
        assert_eq!(p.known_struggle_topics, vec!["algebra".to_string()]);
        p.set_competency("Algebra", CompetencyLevel::Mastered);
        assert!(p.known_struggle_topics.is_empty());
    }

    #[test]
    fn test_default_view() {
        let v = ProfileView::default();
        assert_eq!(v.optimal_intervention_delay, DEFAULT_INTERVENTION_DELAY);
        assert_eq!(v.patience_level, PatienceLevel::Medium);
    }
}
