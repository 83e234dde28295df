use chrono::{DateTime, Duration, Utc};

use crate::models::{DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR, ReviewCard};

/// Upper bound on a scheduled interval (100 years). Keeps review dates storable as RFC 3339.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Recall quality on the SM-2 scale, 0 (blackout) to 5 (perfect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// 0-2 is a failed recall.
    pub fn is_pass(self) -> bool {
        self.0 >= 3
    }
}

#[derive(Debug, Clone)]
pub struct ReviewLog {
    pub quality: u8,
    pub scheduled_days: u32,
    pub previous_ease: f64,
    pub new_ease: f64,
}

#[derive(Clone, Default)]
pub struct Sm2Scheduler;

impl Sm2Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Fresh card, due immediately.
    pub fn new_card(
        &self,
        id: String,
        question_id: &str,
        chapter_id: &str,
        now: DateTime<Utc>,
    ) -> ReviewCard {
        ReviewCard {
            id,
            question_id: question_id.to_string(),
            chapter_id: chapter_id.to_string(),
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
            next_review_date: now,
            last_review_date: None,
            last_quality: None,
        }
    }

    pub fn schedule_card(
        &self,
        card: &ReviewCard,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> (ReviewCard, ReviewLog) {
        let new_ease = Self::next_ease_factor(card.ease_factor, quality);

        // Interval thresholds are checked against the repetition count before this review.
        let (new_interval, new_repetitions) = if !quality.is_pass() {
            (1, 0)
        } else {
            let interval = match card.repetitions {
                0 => 1,
                1 => 6,
                _ => ((card.interval as f64 * new_ease).round() as u32).min(MAX_INTERVAL_DAYS),
            };
            (interval, card.repetitions.saturating_add(1))
        };

        let updated_card = ReviewCard {
            ease_factor: new_ease,
            interval: new_interval,
            repetitions: new_repetitions,
            next_review_date: Self::review_date_after(now, new_interval),
            last_review_date: Some(now),
            last_quality: Some(quality.value()),
            ..card.clone()
        };

        let review_log = ReviewLog {
            quality: quality.value(),
            scheduled_days: new_interval,
            previous_ease: card.ease_factor,
            new_ease,
        };

        (updated_card, review_log)
    }

    /// Saturates at the latest representable date.
    fn review_date_after(now: DateTime<Utc>, interval: u32) -> DateTime<Utc> {
        now.checked_add_signed(Duration::days(i64::from(interval)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn next_ease_factor(ease: f64, quality: Quality) -> f64 {
        let q = (Quality::MAX - quality.value()) as f64;
        (ease + (0.1 - q * (0.08 + q * 0.02))).max(MIN_EASE_FACTOR)
    }

    /// Cards with `next_review_date <= now`, earliest first.
    pub fn due_cards(&self, cards: &[ReviewCard], now: DateTime<Utc>) -> Vec<ReviewCard> {
        let mut due: Vec<ReviewCard> = cards.iter().filter(|c| c.is_due(now)).cloned().collect();
        due.sort_by_key(|c| c.next_review_date);
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
    }

    fn create_test_card() -> ReviewCard {
        Sm2Scheduler::new().new_card("card-1".to_string(), "q1", "c1", now())
    }

    fn q(value: u8) -> Quality {
        Quality::new(value).unwrap()
    }

    #[test]
    fn test_quality_range() {
        assert!(Quality::new(0).is_some());
        assert!(Quality::new(5).is_some());
        assert_eq!(Quality::new(6), None);
        assert!(!q(2).is_pass());
        assert!(q(3).is_pass());
    }

    #[test]
    fn test_new_card_defaults() {
        let card = create_test_card();
        assert_eq!(card.ease_factor, 2.5);
        assert_eq!(card.interval, 0);
        assert_eq!(card.repetitions, 0);
        assert!(card.is_due(now()));
        assert!(card.last_review_date.is_none());
        assert!(card.last_quality.is_none());
    }

    #[test]
    fn test_first_and_second_review() {
        let scheduler = Sm2Scheduler::new();
        let (card1, log) = scheduler.schedule_card(&create_test_card(), q(5), now());
        assert_eq!(card1.repetitions, 1);
        assert_eq!(card1.interval, 1);
        assert_eq!(card1.next_review_date, now() + Duration::days(1));
        assert_eq!(card1.last_review_date, Some(now()));
        assert_eq!(card1.last_quality, Some(5));
        assert!((card1.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(log.scheduled_days, 1);

        let (card2, _) = scheduler.schedule_card(&card1, q(4), now());
        assert_eq!(card2.repetitions, 2);
        assert_eq!(card2.interval, 6);
        assert!((card2.ease_factor - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_third_review_uses_ease() {
        let scheduler = Sm2Scheduler::new();
        let mut card = create_test_card();
        card.repetitions = 2;
        card.interval = 6;
        let (updated, _) = scheduler.schedule_card(&card, q(4), now());
        assert_eq!(updated.repetitions, 3);
        assert_eq!(updated.interval, 15);
    }

    #[test]
    fn test_failed_review_resets() {
        let scheduler = Sm2Scheduler::new();
        let mut card = create_test_card();
        card.repetitions = 3;
        card.interval = 20;
        let (updated, _) = scheduler.schedule_card(&card, q(1), now());
        assert_eq!(updated.repetitions, 0);
        assert_eq!(updated.interval, 1);
        assert!(updated.ease_factor < card.ease_factor);
        assert!(updated.ease_factor >= MIN_EASE_FACTOR);
    }

    #[test]
    fn test_ease_floor() {
        let scheduler = Sm2Scheduler::new();
        let mut card = create_test_card();
        card.ease_factor = 1.35;
        let (updated, _) = scheduler.schedule_card(&card, q(0), now());
        assert_eq!(updated.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn test_long_perfect_streak_caps_interval() {
        let scheduler = Sm2Scheduler::new();
        let mut card = create_test_card();
        for _ in 0..40 {
            card = scheduler.schedule_card(&card, q(5), now()).0;
            assert!(card.next_review_date > now());
        }
        assert_eq!(card.repetitions, 40);
        assert_eq!(card.interval, MAX_INTERVAL_DAYS);
        assert_eq!(
            card.next_review_date,
            now() + Duration::days(i64::from(MAX_INTERVAL_DAYS))
        );

        card.interval = u32::MAX;
        let (updated, _) = scheduler.schedule_card(&card, q(4), now());
        assert_eq!(updated.interval, MAX_INTERVAL_DAYS);
        assert_eq!(
            Sm2Scheduler::review_date_after(DateTime::<Utc>::MAX_UTC, 1),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_due_cards_sorted() {
        let scheduler = Sm2Scheduler::new();
        let mut a = create_test_card();
        a.id = "a".to_string();
        a.next_review_date = now() - Duration::hours(1);
        let mut b = create_test_card();
        b.id = "b".to_string();
        b.next_review_date = now() - Duration::days(3);
        let mut c = create_test_card();
        c.id = "c".to_string();
        c.next_review_date = now() + Duration::days(1);

        let due = scheduler.due_cards(&[a, b, c], now());
        let ids: Vec<&str> = due.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
