use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::models::{Difficulty, LearningPattern, ReviewCard};

const MIN_PATTERNS: usize = 3;
const RECENT_WINDOW: usize = 5;
const RAISE_ABOVE: f64 = 0.85;
const LOWER_BELOW: f64 = 0.5;

/// Difficulty to serve next for a chapter, based on the most recent attempts.
pub fn adaptive_difficulty(chapter_id: &str, patterns: &[LearningPattern]) -> Difficulty {
    let mut chapter_patterns: Vec<&LearningPattern> = patterns
        .iter()
        .filter(|p| p.chapter_id == chapter_id)
        .collect();

    if chapter_patterns.len() < MIN_PATTERNS {
        return Difficulty::Medium;
    }

    chapter_patterns.sort_by(|a, b| b.last_attempted.cmp(&a.last_attempted));
    let recent = &chapter_patterns[..RECENT_WINDOW.min(chapter_patterns.len())];
    let mean = recent.iter().map(|p| p.success_rate()).sum::<f64>() / recent.len() as f64;

    if mean > RAISE_ABOVE {
        Difficulty::Hard
    } else if mean < LOWER_BELOW {
        Difficulty::Easy
    } else {
        Difficulty::Medium
    }
}

/// Stable reorder: due questions, then hardest first, then unseen before seen.
pub fn optimal_question_order(
    question_ids: &[String],
    patterns: &[LearningPattern],
    cards: &[ReviewCard],
    now: DateTime<Utc>,
) -> Vec<String> {
    let by_question: HashMap<&str, &LearningPattern> = patterns
        .iter()
        .map(|p| (p.question_id.as_str(), p))
        .collect();
    let due: HashSet<&str> = cards
        .iter()
        .filter(|c| c.is_due(now))
        .map(|c| c.question_id.as_str())
        .collect();

    let mut ordered: Vec<String> = question_ids.to_vec();
    ordered.sort_by_key(|id| {
        let pattern = by_question.get(id.as_str());
        let difficulty = pattern.map_or(Difficulty::Medium, |p| p.difficulty);
        (
            !due.contains(id.as_str()),
            difficulty.hardness_rank(),
            pattern.is_some(),
        )
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
    }

    fn pattern(id: &str, attempts: u32, correct: u32, minutes_ago: i64) -> LearningPattern {
        LearningPattern {
            question_id: id.to_string(),
            chapter_id: "c1".to_string(),
            attempts,
            correct_attempts: correct,
            avg_response_time: 10_000.0,
            last_attempted: now() - Duration::minutes(minutes_ago),
            difficulty: Difficulty::Medium,
            bloom_level: 1,
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_too_few_patterns_is_medium() {
        let patterns = vec![pattern("q1", 1, 1, 0), pattern("q2", 1, 1, 0)];
        assert_eq!(adaptive_difficulty("c1", &patterns), Difficulty::Medium);
    }

    #[test]
    fn test_strong_recent_performance_raises_difficulty() {
        let patterns: Vec<_> = (0..4).map(|i| pattern(&format!("q{i}"), 2, 2, i)).collect();
        assert_eq!(adaptive_difficulty("c1", &patterns), Difficulty::Hard);
    }

    #[test]
    fn test_only_five_most_recent_count() {
        let mut patterns: Vec<_> = (0..5).map(|i| pattern(&format!("r{i}"), 4, 1, i)).collect();
        // Older perfect attempts fall outside the window.
        patterns.extend((0..5).map(|i| pattern(&format!("o{i}"), 4, 4, 100 + i)));
        assert_eq!(adaptive_difficulty("c1", &patterns), Difficulty::Easy);
    }

    #[test]
    fn test_middling_performance_is_medium() {
        let patterns: Vec<_> = (0..3).map(|i| pattern(&format!("q{i}"), 4, 3, i)).collect();
        assert_eq!(adaptive_difficulty("c1", &patterns), Difficulty::Medium);
    }

    #[test]
    fn test_order_due_first() {
        let card = ReviewCard {
            id: "card-1".to_string(),
            question_id: "q3".to_string(),
            chapter_id: "c1".to_string(),
            ease_factor: 2.5,
            interval: 0,
            repetitions: 0,
            next_review_date: now(),
            last_review_date: None,
            last_quality: None,
        };
        let order = optimal_question_order(&ids(&["q1", "q2", "q3"]), &[], &[card], now());
        assert_eq!(order, ids(&["q3", "q1", "q2"]));
    }

    #[test]
    fn test_order_hardest_then_unseen() {
        let mut hard = pattern("hard", 2, 0, 0);
        hard.difficulty = Difficulty::Hard;
        let mut easy = pattern("easy", 2, 2, 0);
        easy.difficulty = Difficulty::Easy;
        let seen_medium = pattern("seen", 2, 1, 0);

        let order = optimal_question_order(
            &ids(&["easy", "seen", "new", "hard"]),
            &[hard, easy, seen_medium],
            &[],
            now(),
        );
        assert_eq!(order, ids(&["hard", "new", "seen", "easy"]));
    }

    #[test]
    fn test_order_preserves_ties() {
        let order = optimal_question_order(&ids(&["b", "a", "c"]), &[], &[], now());
        assert_eq!(order, ids(&["b", "a", "c"]));
    }
}
