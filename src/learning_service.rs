use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::adaptive;
use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::config::EngineConfig;
use crate::errors::StoreError;
use crate::gap_analyzer;
use crate::models::*;
use crate::pattern_tracker::PatternTracker;
use crate::sm2_scheduler::{Quality, Sm2Scheduler};
use crate::store::LearningStore;
use crate::study_planner;
use crate::{log_engine_op, log_performance};

/// Cards with at least this interval count as mature.
const MATURE_INTERVAL_DAYS: u32 = 21;

/// Stateful facade over the scheduling, tracking and planning components.
///
/// Mutations are read-modify-write on in-memory collections; callers sharing one
/// service across users or tabs must serialize access (e.g. behind a mutex).
pub struct LearningService {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    scheduler: Sm2Scheduler,
    review_cards: Vec<ReviewCard>,
    tracker: PatternTracker,
    study_sessions: Vec<StudySession>,
    current_plan: Option<DailyStudyPlan>,
    knowledge_gaps: Vec<KnowledgeGap>,
}

impl LearningService {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            config,
            clock,
            ids,
            scheduler: Sm2Scheduler::new(),
            review_cards: Vec::new(),
            tracker: PatternTracker::new(),
            study_sessions: Vec::new(),
            current_plan: None,
            knowledge_gaps: Vec::new(),
        }
    }

    pub fn with_system_clock(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn from_state(
        state: LearningState,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let mut service = Self::new(config, clock, ids);
        service.restore(state);
        service
    }

    fn restore(&mut self, state: LearningState) {
        // Later duplicates of a question replace earlier ones, keeping the first slot.
        let mut cards: Vec<ReviewCard> = Vec::with_capacity(state.review_cards.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for card in state.review_cards {
            match index.get(&card.question_id) {
                Some(&i) => {
                    log_engine_op!(
                        "restore",
                        question_id = card.question_id,
                        "duplicate review card collapsed"
                    );
                    cards[i] = card;
                }
                None => {
                    index.insert(card.question_id.clone(), cards.len());
                    cards.push(card);
                }
            }
        }

        self.review_cards = cards;
        self.tracker = PatternTracker::from_patterns(state.learning_patterns);
        self.study_sessions = state.study_sessions;
        self.trim_sessions();
        self.current_plan = state.current_plan;
        self.knowledge_gaps = state.knowledge_gaps;
    }

    pub fn snapshot(&self) -> LearningState {
        LearningState {
            review_cards: self.review_cards.clone(),
            learning_patterns: self.tracker.patterns().to_vec(),
            study_sessions: self.study_sessions.clone(),
            current_plan: self.current_plan.clone(),
            knowledge_gaps: self.knowledge_gaps.clone(),
        }
    }

    /// Replace in-memory state with whatever the store holds. Returns false if it was empty.
    pub async fn load_from(&mut self, store: &dyn LearningStore) -> Result<bool, StoreError> {
        match store.load().await? {
            Some(state) => {
                self.restore(state);
                log_engine_op!(
                    "load_state",
                    count = self.review_cards.len(),
                    format!("restored state from {} store", store.backend_name())
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn save_to(&self, store: &dyn LearningStore) -> Result<(), StoreError> {
        store.save(&self.snapshot()).await
    }

    // Review scheduling

    pub fn add_review_card(&mut self, question_id: &str, chapter_id: &str) -> &ReviewCard {
        let card = self
            .scheduler
            .new_card(self.ids.next_id(), question_id, chapter_id, self.clock.now());
        self.review_cards.retain(|c| c.question_id != question_id);
        self.review_cards.push(card);
        log_engine_op!("add_review_card", question_id = question_id, "review card created");
        &self.review_cards[self.review_cards.len() - 1]
    }

    /// Apply a 0-5 rating. Unknown cards and out-of-range ratings are ignored.
    pub fn update_review_card(&mut self, card_id: &str, quality: u8) -> Option<&ReviewCard> {
        let Some(quality) = Quality::new(quality) else {
            log_engine_op!(warn, "update_review_card", format!("quality {} out of range", quality));
            return None;
        };
        let Some(index) = self.review_cards.iter().position(|c| c.id == card_id) else {
            log_engine_op!(warn, "update_review_card", format!("unknown card '{}'", card_id));
            return None;
        };

        let (updated, log) =
            self.scheduler
                .schedule_card(&self.review_cards[index], quality, self.clock.now());
        self.review_cards[index] = updated;
        log_engine_op!(
            "update_review_card",
            card_id = card_id,
            format!("rescheduled in {} days", log.scheduled_days)
        );
        Some(&self.review_cards[index])
    }

    pub fn get_due_review_cards(&self) -> Vec<ReviewCard> {
        self.scheduler.due_cards(&self.review_cards, self.clock.now())
    }

    pub fn review_cards(&self) -> &[ReviewCard] {
        &self.review_cards
    }

    pub fn review_card_for_question(&self, question_id: &str) -> Option<&ReviewCard> {
        self.review_cards.iter().find(|c| c.question_id == question_id)
    }

    // Attempt tracking

    pub fn record_question_attempt(&mut self, attempt: &QuestionAttempt) -> &LearningPattern {
        let now = self.clock.now();
        let pattern = self.tracker.record_attempt(attempt, now);
        log_engine_op!(
            "record_question_attempt",
            question_id = attempt.question_id,
            format!("difficulty now {}", pattern.difficulty.as_str())
        );
        pattern
    }

    pub fn learning_patterns(&self) -> &[LearningPattern] {
        self.tracker.patterns()
    }

    pub fn pattern_for_question(&self, question_id: &str) -> Option<&LearningPattern> {
        self.tracker.get(question_id)
    }

    // Analysis and planning

    pub fn analyze_knowledge_gaps(&mut self, chapters: &[Chapter]) -> &[KnowledgeGap] {
        let started = Instant::now();
        self.knowledge_gaps =
            gap_analyzer::analyze_knowledge_gaps(chapters, self.tracker.patterns());
        log_performance!(
            "analyze_knowledge_gaps",
            duration_ms = started.elapsed().as_millis() as u64,
            items = chapters.len()
        );
        &self.knowledge_gaps
    }

    pub fn knowledge_gaps(&self) -> &[KnowledgeGap] {
        &self.knowledge_gaps
    }

    pub fn generate_daily_plan(&mut self, chapters: &[Chapter]) -> &DailyStudyPlan {
        let now = self.clock.now();
        let due = self.scheduler.due_cards(&self.review_cards, now);
        let plan = study_planner::generate_daily_plan(
            now.date_naive(),
            chapters,
            self.tracker.patterns(),
            &due,
        );
        log_engine_op!(
            "generate_daily_plan",
            count = plan.recommendations.len(),
            format!("{} minutes planned", plan.total_estimated_time)
        );
        self.current_plan.insert(plan)
    }

    pub fn current_plan(&self) -> Option<&DailyStudyPlan> {
        self.current_plan.as_ref()
    }

    pub fn get_adaptive_difficulty(&self, chapter_id: &str) -> Difficulty {
        adaptive::adaptive_difficulty(chapter_id, self.tracker.patterns())
    }

    pub fn get_optimal_question_order(&self, question_ids: &[String]) -> Vec<String> {
        adaptive::optimal_question_order(
            question_ids,
            self.tracker.patterns(),
            &self.review_cards,
            self.clock.now(),
        )
    }

    // Study sessions

    pub fn record_study_session(&mut self, session: NewStudySession) -> &StudySession {
        self.study_sessions.push(StudySession {
            id: self.ids.next_id(),
            date: self.clock.now(),
            duration: session.duration,
            questions_attempted: session.questions_attempted,
            correct_answers: session.correct_answers.min(session.questions_attempted),
            chapters_studied: session.chapters_studied,
            focus_score: session.focus_score.min(100),
        });
        self.trim_sessions();
        &self.study_sessions[self.study_sessions.len() - 1]
    }

    fn trim_sessions(&mut self) {
        let limit = self.config.session_history_limit.max(1);
        if self.study_sessions.len() > limit {
            let excess = self.study_sessions.len() - limit;
            self.study_sessions.drain(..excess);
        }
    }

    pub fn study_sessions(&self) -> &[StudySession] {
        &self.study_sessions
    }

    pub fn study_stats(&self) -> StudyStats {
        let now = self.clock.now();
        let total_sessions = self.study_sessions.len();
        let total_study_minutes: u64 = self.study_sessions.iter().map(|s| s.duration as u64).sum();
        let total_questions: u64 = self
            .study_sessions
            .iter()
            .map(|s| s.questions_attempted as u64)
            .sum();
        let total_correct: u64 = self
            .study_sessions
            .iter()
            .map(|s| s.correct_answers as u64)
            .sum();
        let focus_total: u64 = self.study_sessions.iter().map(|s| s.focus_score as u64).sum();

        StudyStats {
            total_sessions,
            total_study_minutes,
            total_questions,
            total_correct,
            accuracy: percent(total_correct as f64, total_questions as f64),
            average_focus_score: ratio(focus_total as f64, total_sessions as f64).round() as u8,
            study_streak_days: study_streak(&self.study_sessions, now),
            total_cards: self.review_cards.len(),
            due_cards: self.review_cards.iter().filter(|c| c.is_due(now)).count(),
            mature_cards: self
                .review_cards
                .iter()
                .filter(|c| c.interval >= MATURE_INTERVAL_DAYS)
                .count(),
        }
    }
}

fn percent(numerator: f64, denominator: f64) -> u8 {
    (ratio(numerator, denominator) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Consecutive study days ending today, or yesterday if nothing yet today.
fn study_streak(sessions: &[StudySession], now: DateTime<Utc>) -> u32 {
    let days: BTreeSet<NaiveDate> = sessions.iter().map(|s| s.date.date_naive()).collect();
    let today = now.date_naive();

    let mut day = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}
