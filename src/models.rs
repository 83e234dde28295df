use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// A question under spaced repetition. At most one card exists per `question_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCard {
    pub id: String,
    pub question_id: String,
    pub chapter_id: String,
    pub ease_factor: f64,
    /// Days between the last review and the next.
    pub interval: u32,
    pub repetitions: u32,
    pub next_review_date: DateTime<Utc>,
    pub last_review_date: Option<DateTime<Utc>>,
    pub last_quality: Option<u8>,
}

impl ReviewCard {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Sort rank used when ordering questions hardest first.
    pub fn hardness_rank(self) -> u8 {
        match self {
            Difficulty::Hard => 0,
            Difficulty::Medium => 1,
            Difficulty::Easy => 2,
        }
    }
}

/// Aggregated attempt statistics for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    pub question_id: String,
    pub chapter_id: String,
    pub attempts: u32,
    pub correct_attempts: u32,
    /// Mean response time in milliseconds.
    pub avg_response_time: f64,
    pub last_attempted: DateTime<Utc>,
    pub difficulty: Difficulty,
    pub bloom_level: u8,
}

impl LearningPattern {
    pub fn success_rate(&self) -> f64 {
        ratio(self.correct_attempts as f64, self.attempts as f64)
    }
}

/// A single answered question, as emitted by the quiz subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub question_id: String,
    pub chapter_id: String,
    pub correct: bool,
    /// Milliseconds taken to answer.
    pub response_time: u64,
    pub bloom_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: String,
    pub date: DateTime<Utc>,
    /// Session length in minutes.
    pub duration: u32,
    pub questions_attempted: u32,
    pub correct_answers: u32,
    pub chapters_studied: BTreeSet<String>,
    pub focus_score: u8,
}

/// Session data supplied by the host; id and date are assigned on record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudySession {
    pub duration: u32,
    pub questions_attempted: u32,
    pub correct_answers: u32,
    pub chapters_studied: BTreeSet<String>,
    pub focus_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
}

impl Chapter {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Review,
    NewContent,
    Weakness,
    Strength,
}

/// Declaration order is sort order: high sorts before medium before low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub chapter_id: Option<String>,
    pub chapter_title: Option<String>,
    pub question_ids: Option<Vec<String>>,
    pub reason: String,
    /// Estimated minutes.
    pub estimated_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStudyPlan {
    pub date: NaiveDate,
    pub total_estimated_time: u32,
    pub recommendations: Vec<StudyRecommendation>,
    pub review_cards: Vec<ReviewCard>,
    pub weak_areas: Vec<String>,
    pub strong_areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub chapter_id: String,
    pub chapter_title: String,
    pub mastery_level: u8,
    pub weak_topics: Vec<String>,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyStats {
    pub total_sessions: usize,
    pub total_study_minutes: u64,
    pub total_questions: u64,
    pub total_correct: u64,
    pub accuracy: u8,
    pub average_focus_score: u8,
    pub study_streak_days: u32,
    pub total_cards: usize,
    pub due_cards: usize,
    pub mature_cards: usize,
}

/// Everything the engine holds, as plain records for the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub review_cards: Vec<ReviewCard>,
    pub learning_patterns: Vec<LearningPattern>,
    pub study_sessions: Vec<StudySession>,
    #[serde(default)]
    pub current_plan: Option<DailyStudyPlan>,
    #[serde(default)]
    pub knowledge_gaps: Vec<KnowledgeGap>,
}

/// Zero-denominator safe division.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
