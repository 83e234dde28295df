//! Chapter mastery and weak-topic detection over recorded learning patterns.

use std::collections::BTreeMap;

use crate::models::{Chapter, KnowledgeGap, LearningPattern, ratio};

const MASTERY_THRESHOLD: u8 = 80;
const WEAK_LEVEL_RATE: f64 = 0.6;
const SLOW_RESPONSE_MS: f64 = 90_000.0;
const SLOW_PATTERN_SHARE: f64 = 0.3;

const BLOOM_LABELS: [&str; 6] = [
    "Remember",
    "Understand",
    "Apply",
    "Analyze",
    "Evaluate",
    "Create",
];

/// Display name for a Bloom level (1-6). Out-of-range levels get a generic label.
pub fn bloom_level_label(level: u8) -> String {
    match level {
        1..=6 => BLOOM_LABELS[(level - 1) as usize].to_string(),
        _ => format!("Level {}", level),
    }
}

/// One gap per chapter below full mastery, weakest first.
pub fn analyze_knowledge_gaps(
    chapters: &[Chapter],
    patterns: &[LearningPattern],
) -> Vec<KnowledgeGap> {
    let mut gaps: Vec<KnowledgeGap> = chapters
        .iter()
        .filter_map(|chapter| {
            let chapter_patterns: Vec<&LearningPattern> = patterns
                .iter()
                .filter(|p| p.chapter_id == chapter.id)
                .collect();
            analyze_chapter(chapter, &chapter_patterns)
        })
        .collect();

    gaps.sort_by_key(|gap| gap.mastery_level);
    gaps
}

fn analyze_chapter(chapter: &Chapter, patterns: &[&LearningPattern]) -> Option<KnowledgeGap> {
    if patterns.is_empty() {
        return Some(KnowledgeGap {
            chapter_id: chapter.id.clone(),
            chapter_title: chapter.title.clone(),
            mastery_level: 0,
            weak_topics: vec!["Not started".to_string()],
            recommended_actions: vec![format!("Start working through {}", chapter.title)],
        });
    }

    let total_attempts: u32 = patterns.iter().map(|p| p.attempts).sum();
    let total_correct: u32 = patterns.iter().map(|p| p.correct_attempts).sum();
    let mastery_level = mastery_percent(total_correct, total_attempts);

    let mut weak_topics = Vec::new();
    let mut recommended_actions = Vec::new();

    let mut by_level: BTreeMap<u8, (u32, u32)> = BTreeMap::new();
    for pattern in patterns {
        let entry = by_level.entry(pattern.bloom_level).or_default();
        entry.0 += pattern.correct_attempts;
        entry.1 += pattern.attempts;
    }

    for (level, (correct, total)) in &by_level {
        if ratio(*correct as f64, *total as f64) < WEAK_LEVEL_RATE {
            let label = bloom_level_label(*level);
            weak_topics.push(format!("{} ({}%)", label, mastery_percent(*correct, *total)));
            recommended_actions.push(format!("Practice more {}-level questions", label));
        }
    }

    let slow_patterns = patterns
        .iter()
        .filter(|p| p.avg_response_time > SLOW_RESPONSE_MS)
        .count();
    if ratio(slow_patterns as f64, patterns.len() as f64) > SLOW_PATTERN_SHARE {
        recommended_actions.push("Practice answering faster to build fluency".to_string());
    }

    if mastery_level >= MASTERY_THRESHOLD {
        return None;
    }

    if weak_topics.is_empty() {
        weak_topics.push("General understanding".to_string());
        recommended_actions.push("Review the chapter material and retake its quiz".to_string());
    }

    Some(KnowledgeGap {
        chapter_id: chapter.id.clone(),
        chapter_title: chapter.title.clone(),
        mastery_level,
        weak_topics,
        recommended_actions,
    })
}

/// Rounded percentage, clamped to 0-100.
fn mastery_percent(correct: u32, total: u32) -> u8 {
    (ratio(correct as f64, total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}
