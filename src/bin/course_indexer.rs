//! `course-indexer [courses.json]`
//!
//! Optionally imports a catalog export, then embeds every active course into the
//! configured chunk store.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};

use course_recommender::catalog::SqliteCatalogStore;
use course_recommender::core;
use course_recommender::core::config::{
    AppPaths, ConfigService, ProviderSettings, RecommenderSettings,
};
use course_recommender::llm::LlmService;
use course_recommender::rag::{import_courses_json, CourseIndexer};
use course_recommender::state::open_backends;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    core::logging::init(&paths);

    let config = ConfigService::new(paths.clone())
        .load_config()
        .context("Failed to load configuration")?;
    let settings = RecommenderSettings::from_config(&config);

    let catalog = SqliteCatalogStore::new(&paths)
        .await
        .context("Failed to open course catalog")?;

    if let Some(export) = env::args().nth(1).map(PathBuf::from) {
        let imported = import_courses_json(&catalog, &export)
            .await
            .with_context(|| format!("Failed to import {}", export.display()))?;
        println!("Imported {} courses from {}", imported, export.display());
    }

    let backends = open_backends(&paths, &config).await?;
    let chunks = backends.get(&settings.retriever_backend).ok_or_else(|| {
        anyhow!(
            "Unknown retriever backend '{}' (available: {:?})",
            settings.retriever_backend,
            backends.ids()
        )
    })?;

    let llm = LlmService::from_settings(&ProviderSettings::all_from_config(&config))
        .context("Failed to initialize LLM providers")?;
    if !llm.has_provider_for(&settings.embedding_model) {
        return Err(anyhow!(
            "No provider configured for embedding model '{}'",
            settings.embedding_model
        ));
    }

    let indexer = CourseIndexer::new(Arc::new(catalog), chunks.clone(), Arc::new(llm));
    let report = indexer
        .index_catalog(&settings.embedding_model)
        .await
        .context("Indexing failed")?;
    let stored = chunks.count(&settings.embedding_model).await?;

    println!(
        "Indexed {} courses ({} failed) into '{}'; {} chunks stored for {}",
        report.indexed,
        report.failed,
        settings.retriever_backend,
        stored,
        settings.embedding_model
    );

    if report.failed > 0 {
        return Err(anyhow!("{} courses could not be indexed", report.failed));
    }
    Ok(())
}
