use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use study_engine::{
    Clock, EngineConfig, FixedClock, LearningService, MAX_INTERVAL_DAYS, MIN_EASE_FACTOR,
    SequentialIdGenerator,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 7, 30, 0).unwrap()
}

fn create_service() -> (LearningService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(start()));
    let service = LearningService::new(
        EngineConfig::default(),
        clock.clone(),
        Arc::new(SequentialIdGenerator::new("card")),
    );
    (service, clock)
}

#[test]
fn test_fresh_card_first_and_second_review() {
    let (mut service, clock) = create_service();
    let card_id = service.add_review_card("q1", "c1").id.clone();

    let card = service.update_review_card(&card_id, 5).unwrap().clone();
    assert_eq!(card.repetitions, 1);
    assert_eq!(card.interval, 1);
    assert_eq!(card.next_review_date, start() + Duration::days(1));
    assert_eq!(card.last_review_date, Some(start()));

    clock.advance(Duration::days(1));
    let card = service.update_review_card(&card_id, 4).unwrap().clone();
    assert_eq!(card.repetitions, 2);
    assert_eq!(card.interval, 6);
    assert_eq!(card.last_quality, Some(4));
}

#[test]
fn test_failed_review_resets_progress() {
    let (mut service, _) = create_service();
    let card_id = service.add_review_card("q1", "c1").id.clone();
    for _ in 0..3 {
        service.update_review_card(&card_id, 5);
    }
    let before = service.review_card_for_question("q1").unwrap().clone();
    assert_eq!(before.repetitions, 3);
    assert!(before.interval > 6);

    let after = service.update_review_card(&card_id, 1).unwrap().clone();
    assert_eq!(after.repetitions, 0);
    assert_eq!(after.interval, 1);
    assert!(after.ease_factor < before.ease_factor);
    assert!(after.ease_factor >= MIN_EASE_FACTOR);
}

#[test]
fn test_failure_reset_from_any_state() {
    for quality in 0..3 {
        for prior_passes in 0..6 {
            let (mut service, _) = create_service();
            let card_id = service.add_review_card("q1", "c1").id.clone();
            for _ in 0..prior_passes {
                service.update_review_card(&card_id, 4);
            }
            let card = service.update_review_card(&card_id, quality).unwrap();
            assert_eq!(card.repetitions, 0);
            assert_eq!(card.interval, 1);
        }
    }
}

#[test]
fn test_intervals_non_decreasing_under_constant_passing_quality() {
    for quality in 3..=5 {
        let (mut service, _) = create_service();
        let card_id = service.add_review_card("q1", "c1").id.clone();
        let mut previous_interval = 0;
        for _ in 0..12 {
            let card = service.update_review_card(&card_id, quality).unwrap();
            assert!(card.interval >= previous_interval, "quality {}", quality);
            assert!(card.ease_factor >= MIN_EASE_FACTOR);
            previous_interval = card.interval;
        }
    }
}

#[test]
fn test_long_perfect_streak_stays_schedulable() {
    let (mut service, clock) = create_service();
    let card_id = service.add_review_card("q1", "c1").id.clone();
    for _ in 0..40 {
        clock.advance(Duration::days(1));
        let card = service.update_review_card(&card_id, 5).unwrap();
        assert!(card.interval <= MAX_INTERVAL_DAYS);
        assert!(card.next_review_date > clock.now());
    }

    let card = service.review_card_for_question("q1").unwrap();
    assert_eq!(card.repetitions, 40);
    assert_eq!(card.interval, MAX_INTERVAL_DAYS);
    assert!(service.get_due_review_cards().is_empty());
}

#[test]
fn test_ease_never_drops_below_floor() {
    let (mut service, _) = create_service();
    let card_id = service.add_review_card("q1", "c1").id.clone();
    for _ in 0..20 {
        let card = service.update_review_card(&card_id, 0).unwrap();
        assert!(card.ease_factor >= MIN_EASE_FACTOR);
    }
    let card = service.review_card_for_question("q1").unwrap();
    assert_eq!(card.ease_factor, MIN_EASE_FACTOR);
}

#[test]
fn test_one_card_per_question() {
    let (mut service, _) = create_service();
    for round in 0..3 {
        for q in ["q1", "q2", "q3", "q1"] {
            service.add_review_card(q, &format!("c{}", round));
        }
    }
    let questions: HashSet<&str> = service
        .review_cards()
        .iter()
        .map(|c| c.question_id.as_str())
        .collect();
    assert_eq!(questions.len(), service.review_cards().len());
    assert_eq!(service.review_cards().len(), 3);
}

#[test]
fn test_re_adding_resets_schedule() {
    let (mut service, _) = create_service();
    let card_id = service.add_review_card("q1", "c1").id.clone();
    service.update_review_card(&card_id, 5);
    let fresh = service.add_review_card("q1", "c1").clone();
    assert_ne!(fresh.id, card_id);
    assert_eq!(fresh.repetitions, 0);
    assert!(fresh.last_review_date.is_none());
    // The replaced card id no longer resolves.
    assert!(service.update_review_card(&card_id, 5).is_none());
}

#[test]
fn test_due_cards_subset_and_order() {
    let (mut service, clock) = create_service();
    let ids: Vec<String> = (0..6)
        .map(|i| service.add_review_card(&format!("q{}", i), "c1").id.clone())
        .collect();

    // Staggered schedules: q0 fails (1 day), q1 passes twice (6 days), q2 untouched (due now).
    service.update_review_card(&ids[0], 1);
    service.update_review_card(&ids[1], 5);
    clock.advance(Duration::hours(1));
    service.update_review_card(&ids[1], 5);
    service.update_review_card(&ids[3], 3);

    let now = start() + Duration::hours(1);
    let due = service.get_due_review_cards();
    let expected: HashSet<&str> = service
        .review_cards()
        .iter()
        .filter(|c| c.next_review_date <= now)
        .map(|c| c.id.as_str())
        .collect();
    let actual: HashSet<&str> = due.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(actual, expected);
    assert!(due.windows(2).all(|w| w[0].next_review_date <= w[1].next_review_date));

    clock.advance(Duration::days(2));
    let due = service.get_due_review_cards();
    assert_eq!(due.len(), 5);
    assert!(due.iter().all(|c| c.id != ids[1]));
}

#[test]
fn test_due_query_has_no_side_effects() {
    let (mut service, _) = create_service();
    service.add_review_card("q1", "c1");
    let before = service.snapshot();
    let _ = service.get_due_review_cards();
    let _ = service.get_due_review_cards();
    assert_eq!(service.snapshot(), before);
}
