use chrono::NaiveDate;

use crate::models::{
    Chapter, DailyStudyPlan, LearningPattern, Priority, RecommendationType, ReviewCard,
    StudyRecommendation, ratio,
};

const REVIEW_BATCH_SIZE: usize = 10;
const REVIEW_MINUTES_PER_CARD: f64 = 1.5;
const WEAK_RATE: f64 = 0.6;
const WEAK_MIN_ATTEMPTS: u32 = 3;
const STRONG_RATE: f64 = 0.8;
const STRONG_MIN_ATTEMPTS: u32 = 5;
const WEAKNESS_MINUTES: u32 = 15;
const NEW_CONTENT_MINUTES: u32 = 20;
const STRENGTH_MINUTES: u32 = 10;
const MAX_RECOMMENDATIONS_BEFORE_STRENGTH: usize = 4;

/// Builds the day's recommendation list.
///
/// `due_cards` must already be ordered by due date. Recommendations are built
/// review, weakness, new content, strength, then stably sorted by priority.
pub fn generate_daily_plan(
    date: NaiveDate,
    chapters: &[Chapter],
    patterns: &[LearningPattern],
    due_cards: &[ReviewCard],
) -> DailyStudyPlan {
    let mut recommendations = Vec::new();
    let mut weak_areas = Vec::new();
    let mut strong_areas = Vec::new();

    if !due_cards.is_empty() {
        let batch: Vec<&ReviewCard> = due_cards.iter().take(REVIEW_BATCH_SIZE).collect();
        recommendations.push(StudyRecommendation {
            kind: RecommendationType::Review,
            priority: Priority::High,
            chapter_id: None,
            chapter_title: None,
            question_ids: Some(batch.iter().map(|c| c.question_id.clone()).collect()),
            reason: format!("{} cards are due for review", due_cards.len()),
            estimated_time: (REVIEW_MINUTES_PER_CARD * batch.len() as f64).ceil() as u32,
        });
    }

    for chapter in chapters {
        let chapter_patterns: Vec<&LearningPattern> = patterns
            .iter()
            .filter(|p| p.chapter_id == chapter.id)
            .collect();
        let attempts: u32 = chapter_patterns.iter().map(|p| p.attempts).sum();
        let correct: u32 = chapter_patterns.iter().map(|p| p.correct_attempts).sum();
        let rate = ratio(correct as f64, attempts as f64);

        if rate < WEAK_RATE && attempts >= WEAK_MIN_ATTEMPTS {
            let weak_questions: Vec<String> = chapter_patterns
                .iter()
                .filter(|p| p.success_rate() < WEAK_RATE)
                .map(|p| p.question_id.clone())
                .collect();
            recommendations.push(StudyRecommendation {
                kind: RecommendationType::Weakness,
                priority: Priority::High,
                chapter_id: Some(chapter.id.clone()),
                chapter_title: Some(chapter.title.clone()),
                question_ids: (!weak_questions.is_empty()).then_some(weak_questions),
                reason: format!(
                    "Success rate in {} is {}%, below the {}% target",
                    chapter.title,
                    (rate * 100.0).round() as u32,
                    (WEAK_RATE * 100.0) as u32
                ),
                estimated_time: WEAKNESS_MINUTES,
            });
            weak_areas.push(chapter.id.clone());
        }

        if rate >= STRONG_RATE && attempts >= STRONG_MIN_ATTEMPTS {
            strong_areas.push(chapter.id.clone());
        }
    }

    if let Some(chapter) = chapters
        .iter()
        .find(|c| !patterns.iter().any(|p| p.chapter_id == c.id))
    {
        recommendations.push(StudyRecommendation {
            kind: RecommendationType::NewContent,
            priority: Priority::Medium,
            chapter_id: Some(chapter.id.clone()),
            chapter_title: Some(chapter.title.clone()),
            question_ids: None,
            reason: format!("Start a new chapter: {}", chapter.title),
            estimated_time: NEW_CONTENT_MINUTES,
        });
    }

    if recommendations.len() < MAX_RECOMMENDATIONS_BEFORE_STRENGTH {
        if let Some(chapter) = strong_areas
            .first()
            .and_then(|id| chapters.iter().find(|c| &c.id == id))
        {
            recommendations.push(StudyRecommendation {
                kind: RecommendationType::Strength,
                priority: Priority::Low,
                chapter_id: Some(chapter.id.clone()),
                chapter_title: Some(chapter.title.clone()),
                question_ids: None,
                reason: format!("Keep {} fresh with a short challenge", chapter.title),
                estimated_time: STRENGTH_MINUTES,
            });
        }
    }

    recommendations.sort_by_key(|r| r.priority);
    let total_estimated_time = recommendations.iter().map(|r| r.estimated_time).sum();

    DailyStudyPlan {
        date,
        total_estimated_time,
        recommendations,
        review_cards: due_cards.to_vec(),
        weak_areas,
        strong_areas,
    }
}
