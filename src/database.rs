use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::time::Instant;

use crate::errors::{ErrorContext, StoreError};
use crate::log_store_operation;
use crate::models::*;
use crate::store::LearningStore;

const PLAN_KEY: &str = "current_plan";
const GAPS_KEY: &str = "knowledge_gaps";

/// SQLite-backed store. Each save replaces the full state inside one transaction.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        // An in-memory database lives on a single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_cards (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                question_id TEXT NOT NULL UNIQUE,
                chapter_id TEXT NOT NULL,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval INTEGER NOT NULL DEFAULT 0,
                repetitions INTEGER NOT NULL DEFAULT 0,
                next_review_date TEXT NOT NULL,
                last_review_date TEXT,
                last_quality INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learning_patterns (
                question_id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                chapter_id TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                correct_attempts INTEGER NOT NULL,
                avg_response_time REAL NOT NULL,
                last_attempted TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                bloom_level INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS study_sessions (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                date TEXT NOT NULL,
                duration INTEGER NOT NULL,
                questions_attempted INTEGER NOT NULL,
                correct_answers INTEGER NOT NULL,
                chapters_studied TEXT NOT NULL,
                focus_score INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS derived_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_store_operation!(info, "sqlite", "migrate", "schema ready");
        Ok(())
    }

    pub async fn get_review_cards(&self) -> Result<Vec<ReviewCard>, StoreError> {
        let rows = sqlx::query("SELECT * FROM review_cards ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_card).collect()
    }

    pub async fn get_learning_patterns(&self) -> Result<Vec<LearningPattern>, StoreError> {
        let rows = sqlx::query("SELECT * FROM learning_patterns ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_pattern).collect()
    }

    pub async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
        let rows = sqlx::query("SELECT * FROM study_sessions ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn get_derived(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM derived_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    async fn has_saved_state(&self) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM review_cards)
                 + (SELECT COUNT(*) FROM learning_patterns)
                 + (SELECT COUNT(*) FROM study_sessions)
                 + (SELECT COUNT(*) FROM derived_state) AS total
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("total")? > 0)
    }
}

#[async_trait]
impl LearningStore for Database {
    async fn load(&self) -> Result<Option<LearningState>, StoreError> {
        let started = Instant::now();
        if !self.has_saved_state().await? {
            log_store_operation!(info, "sqlite", "load", "no saved state, starting fresh");
            return Ok(None);
        }

        let current_plan = match self.get_derived(PLAN_KEY).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => None,
        };
        let knowledge_gaps = match self.get_derived(GAPS_KEY).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        let state = LearningState {
            review_cards: self.get_review_cards().await?,
            learning_patterns: self.get_learning_patterns().await?,
            study_sessions: self.get_study_sessions().await?,
            current_plan,
            knowledge_gaps,
        };

        log_store_operation!(
            debug,
            "sqlite",
            "load",
            count = state.review_cards.len() + state.learning_patterns.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &LearningState) -> Result<(), StoreError> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        for table in ["review_cards", "learning_patterns", "study_sessions", "derived_state"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        for (position, card) in state.review_cards.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO review_cards (id, position, question_id, chapter_id, ease_factor,
                                          interval, repetitions, next_review_date,
                                          last_review_date, last_quality)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&card.id)
            .bind(position as i64)
            .bind(&card.question_id)
            .bind(&card.chapter_id)
            .bind(card.ease_factor)
            .bind(card.interval as i64)
            .bind(card.repetitions as i64)
            .bind(card.next_review_date.to_rfc3339())
            .bind(card.last_review_date.map(|d| d.to_rfc3339()))
            .bind(card.last_quality.map(i64::from))
            .execute(&mut *tx)
            .await?;
        }

        for (position, pattern) in state.learning_patterns.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO learning_patterns (question_id, position, chapter_id, attempts,
                                               correct_attempts, avg_response_time,
                                               last_attempted, difficulty, bloom_level)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&pattern.question_id)
            .bind(position as i64)
            .bind(&pattern.chapter_id)
            .bind(pattern.attempts as i64)
            .bind(pattern.correct_attempts as i64)
            .bind(pattern.avg_response_time)
            .bind(pattern.last_attempted.to_rfc3339())
            .bind(pattern.difficulty.as_str())
            .bind(pattern.bloom_level as i64)
            .execute(&mut *tx)
            .await?;
        }

        for (position, session) in state.study_sessions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO study_sessions (id, position, date, duration, questions_attempted,
                                            correct_answers, chapters_studied, focus_score)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&session.id)
            .bind(position as i64)
            .bind(session.date.to_rfc3339())
            .bind(session.duration as i64)
            .bind(session.questions_attempted as i64)
            .bind(session.correct_answers as i64)
            .bind(serde_json::to_string(&session.chapters_studied)?)
            .bind(session.focus_score as i64)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(plan) = &state.current_plan {
            sqlx::query("INSERT INTO derived_state (key, value) VALUES (?1, ?2)")
                .bind(PLAN_KEY)
                .bind(serde_json::to_string(plan)?)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("INSERT INTO derived_state (key, value) VALUES (?1, ?2)")
            .bind(GAPS_KEY)
            .bind(serde_json::to_string(&state.knowledge_gaps)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log_store_operation!(
            debug,
            "sqlite",
            "save",
            count = state.review_cards.len() + state.learning_patterns.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

fn parse_timestamp(
    value: &str,
    resource_type: &str,
    id: &str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::corrupt(resource_type, id, e)
                .log_with_context(ErrorContext::new("load", resource_type).with_id(id))
        })
}

fn to_u32(value: i64, resource_type: &str, id: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|e| StoreError::corrupt(resource_type, id, e))
}

fn to_u8(value: i64, resource_type: &str, id: &str) -> Result<u8, StoreError> {
    u8::try_from(value).map_err(|e| StoreError::corrupt(resource_type, id, e))
}

fn row_to_card(row: &SqliteRow) -> Result<ReviewCard, StoreError> {
    let id: String = row.try_get("id")?;
    let last_review_date = match row.try_get::<Option<String>, _>("last_review_date")? {
        Some(value) => Some(parse_timestamp(&value, "review_card", &id)?),
        None => None,
    };
    let last_quality = match row.try_get::<Option<i64>, _>("last_quality")? {
        Some(value) => Some(to_u8(value, "review_card", &id)?),
        None => None,
    };

    let next_review_date: String = row.try_get("next_review_date")?;

    Ok(ReviewCard {
        question_id: row.try_get("question_id")?,
        chapter_id: row.try_get("chapter_id")?,
        ease_factor: row.try_get("ease_factor")?,
        interval: to_u32(row.try_get("interval")?, "review_card", &id)?,
        repetitions: to_u32(row.try_get("repetitions")?, "review_card", &id)?,
        next_review_date: parse_timestamp(&next_review_date, "review_card", &id)?,
        last_review_date,
        last_quality,
        id,
    })
}

fn row_to_pattern(row: &SqliteRow) -> Result<LearningPattern, StoreError> {
    let question_id: String = row.try_get("question_id")?;
    let difficulty_str: String = row.try_get("difficulty")?;
    let difficulty = Difficulty::parse(&difficulty_str).ok_or_else(|| {
        StoreError::corrupt(
            "learning_pattern",
            &question_id,
            format!("unknown difficulty '{}'", difficulty_str),
        )
    })?;
    let last_attempted: String = row.try_get("last_attempted")?;

    Ok(LearningPattern {
        chapter_id: row.try_get("chapter_id")?,
        attempts: to_u32(row.try_get("attempts")?, "learning_pattern", &question_id)?,
        correct_attempts: to_u32(
            row.try_get("correct_attempts")?,
            "learning_pattern",
            &question_id,
        )?,
        avg_response_time: row.try_get("avg_response_time")?,
        last_attempted: parse_timestamp(&last_attempted, "learning_pattern", &question_id)?,
        difficulty,
        bloom_level: to_u8(row.try_get("bloom_level")?, "learning_pattern", &question_id)?,
        question_id,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<StudySession, StoreError> {
    let id: String = row.try_get("id")?;
    let chapters_studied: BTreeSet<String> =
        serde_json::from_str(&row.try_get::<String, _>("chapters_studied")?)?;

    Ok(StudySession {
        date: parse_timestamp(&row.try_get::<String, _>("date")?, "study_session", &id)?,
        duration: to_u32(row.try_get("duration")?, "study_session", &id)?,
        questions_attempted: to_u32(row.try_get("questions_attempted")?, "study_session", &id)?,
        correct_answers: to_u32(row.try_get("correct_answers")?, "study_session", &id)?,
        chapters_studied,
        focus_score: to_u8(row.try_get("focus_score")?, "study_session", &id)?,
        id,
    })
}
