use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use study_engine::config::Config;
use study_engine::logging::setup_logging;
use study_engine::{
    Chapter, DailyStudyPlan, Database, JsonFileStore, KnowledgeGap, LearningService,
    LearningStore, StoreBackend, StudyStats, log_system_event,
};

#[derive(Serialize)]
struct Report<'a> {
    plan: &'a DailyStudyPlan,
    knowledge_gaps: &'a [KnowledgeGap],
    stats: StudyStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "study_engine", "building today's study report");

    let store: Box<dyn LearningStore> = match config.store.backend {
        StoreBackend::Json => Box::new(JsonFileStore::new(&config.store.path)),
        StoreBackend::Sqlite => Box::new(Database::new(&config.store.database_url).await?),
    };

    let mut service = LearningService::with_system_clock(config.engine.clone());
    if !service.load_from(store.as_ref()).await? {
        info!("No saved state found, starting with an empty engine");
    }

    let chapters = match &config.chapters_file {
        Some(path) => load_chapters(path).await?,
        None => Vec::new(),
    };

    service.analyze_knowledge_gaps(&chapters);
    service.generate_daily_plan(&chapters);

    if let Some(plan) = service.current_plan() {
        let report = Report {
            plan,
            knowledge_gaps: service.knowledge_gaps(),
            stats: service.study_stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    service.save_to(store.as_ref()).await?;
    log_system_event!(shutdown, component = "study_engine", "state saved");

    Ok(())
}

async fn load_chapters(path: &str) -> Result<Vec<Chapter>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading chapter catalog {}", path))?;
    let chapters: Vec<Chapter> = serde_json::from_str(&content)
        .with_context(|| format!("parsing chapter catalog {}", path))?;
    info!(chapter_count = chapters.len(), "Chapter catalog loaded");
    Ok(chapters)
}
