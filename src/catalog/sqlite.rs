//! SQLite-backed course catalog.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{CatalogStore, CourseId, CourseModule, CourseRecord};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

const COURSE_COLUMNS: &str = "id, title, app, level, version, duration, short_description, \
     objectives, audience, prerequisites, syllabus, active";

pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                app TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL DEFAULT '',
                version TEXT NOT NULL DEFAULT '',
                duration TEXT NOT NULL DEFAULT '',
                short_description TEXT NOT NULL DEFAULT '',
                objectives TEXT NOT NULL DEFAULT '',
                audience TEXT NOT NULL DEFAULT '',
                prerequisites TEXT NOT NULL DEFAULT '',
                syllabus TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                position INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modalities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS course_modalities (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                modality_id INTEGER NOT NULL REFERENCES modalities(id) ON DELETE CASCADE,
                PRIMARY KEY (course_id, modality_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Inserts or replaces a course together with its modules and modalities.
    pub async fn upsert_course(&self, course: &CourseRecord) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO courses (id, title, app, level, version, duration, short_description,
                                  objectives, audience, prerequisites, syllabus, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                app = excluded.app,
                level = excluded.level,
                version = excluded.version,
                duration = excluded.duration,
                short_description = excluded.short_description,
                objectives = excluded.objectives,
                audience = excluded.audience,
                prerequisites = excluded.prerequisites,
                syllabus = excluded.syllabus,
                active = excluded.active",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.app)
        .bind(&course.level)
        .bind(&course.version)
        .bind(&course.duration)
        .bind(&course.short_description)
        .bind(&course.objectives)
        .bind(&course.audience)
        .bind(&course.prerequisites)
        .bind(&course.syllabus)
        .bind(course.active)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM modules WHERE course_id = ?1")
            .bind(course.id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for module in &course.modules {
            sqlx::query(
                "INSERT INTO modules (course_id, title, description, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(course.id)
            .bind(&module.title)
            .bind(&module.description)
            .bind(module.order)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        sqlx::query("DELETE FROM course_modalities WHERE course_id = ?1")
            .bind(course.id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for modality in &course.modalities {
            sqlx::query("INSERT OR IGNORE INTO modalities (name) VALUES (?1)")
                .bind(modality)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT OR IGNORE INTO course_modalities (course_id, modality_id)
                 SELECT ?1, id FROM modalities WHERE name = ?2",
            )
            .bind(course.id)
            .bind(modality)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<CourseRecord>, ApiError> {
        let mut courses: Vec<CourseRecord> = rows.iter().map(row_to_course).collect();
        if courses.is_empty() {
            return Ok(courses);
        }
        let ids: Vec<CourseId> = courses.iter().map(|course| course.id).collect();

        let mut modules_by_course: HashMap<CourseId, Vec<CourseModule>> = HashMap::new();
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT course_id, title, description, position FROM modules WHERE course_id IN (",
        );
        push_id_list(&mut builder, &ids);
        builder.push(" ORDER BY course_id, position, id");
        let module_rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        for row in &module_rows {
            modules_by_course
                .entry(row.get("course_id"))
                .or_default()
                .push(CourseModule {
                    title: row.get("title"),
                    description: row.get("description"),
                    order: row.get("position"),
                });
        }

        let mut modalities_by_course: HashMap<CourseId, Vec<String>> = HashMap::new();
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT cm.course_id AS course_id, m.name AS name
             FROM course_modalities cm
             JOIN modalities m ON m.id = cm.modality_id
             WHERE cm.course_id IN (",
        );
        push_id_list(&mut builder, &ids);
        builder.push(" ORDER BY m.name");
        let modality_rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        for row in &modality_rows {
            modalities_by_course
                .entry(row.get("course_id"))
                .or_default()
                .push(row.get("name"));
        }

        for course in &mut courses {
            course.modules = modules_by_course.remove(&course.id).unwrap_or_default();
            course.modalities = modalities_by_course.remove(&course.id).unwrap_or_default();
        }
        Ok(courses)
    }
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[CourseId]) {
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn row_to_course(row: &SqliteRow) -> CourseRecord {
    CourseRecord {
        id: row.get("id"),
        title: row.get("title"),
        app: row.get("app"),
        level: row.get("level"),
        version: row.get("version"),
        duration: row.get("duration"),
        short_description: row.get("short_description"),
        objectives: row.get("objectives"),
        audience: row.get("audience"),
        prerequisites: row.get("prerequisites"),
        syllabus: row.get("syllabus"),
        active: row.get("active"),
        modalities: Vec::new(),
        modules: Vec::new(),
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn get_course(&self, id: CourseId) -> Result<Option<CourseRecord>, ApiError> {
        Ok(self.get_courses(&[id]).await?.into_iter().next())
    }

    async fn get_courses(&self, ids: &[CourseId]) -> Result<Vec<CourseRecord>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM courses WHERE id IN (",
            COURSE_COLUMNS
        ));
        push_id_list(&mut builder, ids);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut by_id: HashMap<CourseId, CourseRecord> = self
            .hydrate(rows)
            .await?
            .into_iter()
            .map(|course| (course.id, course))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_active_courses(&self) -> Result<Vec<CourseRecord>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM courses WHERE active = 1 ORDER BY app, title",
            COURSE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.hydrate(rows).await
    }
}
