use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{Difficulty, LearningPattern, QuestionAttempt};

const EASY_SUCCESS_RATE: f64 = 0.8;
const EASY_MAX_RESPONSE_MS: u64 = 30_000;
const HARD_SUCCESS_RATE: f64 = 0.5;
const HARD_MIN_RESPONSE_MS: u64 = 120_000;

/// Keeps one `LearningPattern` per question, in first-attempt order.
#[derive(Debug, Clone, Default)]
pub struct PatternTracker {
    patterns: Vec<LearningPattern>,
}

impl PatternTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later pattern for the same question replaces the earlier one in its slot.
    pub fn from_patterns(patterns: Vec<LearningPattern>) -> Self {
        let mut unique: Vec<LearningPattern> = Vec::with_capacity(patterns.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for pattern in patterns {
            match index.get(&pattern.question_id) {
                Some(&i) => unique[i] = pattern,
                None => {
                    index.insert(pattern.question_id.clone(), unique.len());
                    unique.push(pattern);
                }
            }
        }
        Self { patterns: unique }
    }

    pub fn patterns(&self) -> &[LearningPattern] {
        &self.patterns
    }

    pub fn get(&self, question_id: &str) -> Option<&LearningPattern> {
        self.patterns.iter().find(|p| p.question_id == question_id)
    }

    pub fn for_chapter<'a>(
        &'a self,
        chapter_id: &'a str,
    ) -> impl Iterator<Item = &'a LearningPattern> + 'a {
        self.patterns.iter().filter(move |p| p.chapter_id == chapter_id)
    }

    pub fn record_attempt(
        &mut self,
        attempt: &QuestionAttempt,
        now: DateTime<Utc>,
    ) -> &LearningPattern {
        let position = self
            .patterns
            .iter()
            .position(|p| p.question_id == attempt.question_id);

        match position {
            Some(index) => {
                let pattern = &mut self.patterns[index];
                let previous_attempts = pattern.attempts as f64;
                pattern.attempts += 1;
                if attempt.correct {
                    pattern.correct_attempts += 1;
                }
                pattern.avg_response_time = (pattern.avg_response_time * previous_attempts
                    + attempt.response_time as f64)
                    / pattern.attempts as f64;
                pattern.last_attempted = now;
                pattern.difficulty =
                    derive_difficulty(pattern.success_rate(), attempt.response_time);
                &self.patterns[index]
            }
            None => {
                self.patterns.push(LearningPattern {
                    question_id: attempt.question_id.clone(),
                    chapter_id: attempt.chapter_id.clone(),
                    attempts: 1,
                    correct_attempts: u32::from(attempt.correct),
                    avg_response_time: attempt.response_time as f64,
                    last_attempted: now,
                    difficulty: if attempt.correct {
                        Difficulty::Medium
                    } else {
                        Difficulty::Hard
                    },
                    bloom_level: attempt.bloom_level,
                });
                &self.patterns[self.patterns.len() - 1]
            }
        }
    }
}

/// Difficulty from the running success rate and the latest attempt's response time.
pub fn derive_difficulty(success_rate: f64, response_time_ms: u64) -> Difficulty {
    if success_rate > EASY_SUCCESS_RATE && response_time_ms < EASY_MAX_RESPONSE_MS {
        Difficulty::Easy
    } else if success_rate < HARD_SUCCESS_RATE || response_time_ms > HARD_MIN_RESPONSE_MS {
        Difficulty::Hard
    } else {
        Difficulty::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
    }

    fn attempt(correct: bool, response_time: u64) -> QuestionAttempt {
        QuestionAttempt {
            question_id: "q1".to_string(),
            chapter_id: "c1".to_string(),
            correct,
            response_time,
            bloom_level: 2,
        }
    }

    #[test]
    fn test_first_attempt_creates_pattern() {
        let mut tracker = PatternTracker::new();
        let pattern = tracker.record_attempt(&attempt(true, 10_000), now());
        assert_eq!(pattern.attempts, 1);
        assert_eq!(pattern.correct_attempts, 1);
        assert_eq!(pattern.avg_response_time, 10_000.0);
        assert_eq!(pattern.difficulty, Difficulty::Medium);
        assert_eq!(pattern.bloom_level, 2);

        let mut tracker = PatternTracker::new();
        let pattern = tracker.record_attempt(&attempt(false, 10_000), now());
        assert_eq!(pattern.correct_attempts, 0);
        assert_eq!(pattern.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_running_average_and_last_attempted() {
        let mut tracker = PatternTracker::new();
        tracker.record_attempt(&attempt(true, 10_000), now());
        let later = now() + Duration::minutes(5);
        let pattern = tracker.record_attempt(&attempt(false, 40_000), later);
        assert_eq!(pattern.attempts, 2);
        assert_eq!(pattern.correct_attempts, 1);
        assert_eq!(pattern.avg_response_time, 25_000.0);
        assert_eq!(pattern.last_attempted, later);
        assert_eq!(tracker.patterns().len(), 1);
    }

    #[test]
    fn test_difficulty_uses_latest_response_time() {
        let mut tracker = PatternTracker::new();
        for _ in 0..5 {
            tracker.record_attempt(&attempt(true, 200_000), now());
        }
        // Slow history, fast latest answer: average is irrelevant.
        let pattern = tracker.record_attempt(&attempt(true, 5_000), now());
        assert_eq!(pattern.difficulty, Difficulty::Easy);

        let pattern = tracker.record_attempt(&attempt(true, 130_000), now());
        assert_eq!(pattern.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_derive_difficulty_thresholds() {
        assert_eq!(derive_difficulty(0.9, 29_999), Difficulty::Easy);
        assert_eq!(derive_difficulty(0.8, 10_000), Difficulty::Medium);
        assert_eq!(derive_difficulty(0.9, 30_000), Difficulty::Medium);
        assert_eq!(derive_difficulty(0.49, 10_000), Difficulty::Hard);
        assert_eq!(derive_difficulty(0.7, 120_001), Difficulty::Hard);
        assert_eq!(derive_difficulty(0.5, 120_000), Difficulty::Medium);
    }

    #[test]
    fn test_from_patterns_collapses_duplicates() {
        let mut tracker = PatternTracker::new();
        tracker.record_attempt(&attempt(true, 1_000), now());
        let mut other = attempt(false, 1_000);
        other.question_id = "q2".to_string();
        tracker.record_attempt(&other, now());
        let first = tracker.get("q1").unwrap().clone();

        let mut newer = first.clone();
        newer.attempts = 7;
        let tracker = PatternTracker::from_patterns(vec![
            first,
            tracker.get("q2").unwrap().clone(),
            newer,
        ]);

        let ids: Vec<&str> = tracker.patterns().iter().map(|p| p.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert_eq!(tracker.get("q1").unwrap().attempts, 7);
    }

    #[test]
    fn test_for_chapter_filters() {
        let mut tracker = PatternTracker::new();
        tracker.record_attempt(&attempt(true, 1_000), now());
        let mut other = attempt(true, 1_000);
        other.question_id = "q2".to_string();
        other.chapter_id = "c2".to_string();
        tracker.record_attempt(&other, now());

        assert_eq!(tracker.for_chapter("c1").count(), 1);
        assert_eq!(tracker.for_chapter("c3").count(), 0);
        assert!(tracker.get("q2").is_some());
    }
}
