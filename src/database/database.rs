use tokio_rusqlite::Connection;
use std::path::Path;
use log::info;
use serde::Serialize;
use thiserror::Error;
use std::sync::Arc;

use crate::llm::eval::{EvalReport, EvalResult, Grade};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One stored evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub created_at: String,
    pub document: String,
    pub settings: serde_json::Value,
    pub total: i64,
    pub correct: i64,
}

/// SQLite store for evaluation history.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::with_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS eval_runs (
                    id INTEGER PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    document TEXT NOT NULL,
                    settings TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS eval_results (
                    id INTEGER PRIMARY KEY,
                    run_id INTEGER NOT NULL REFERENCES eval_runs(id),
                    question TEXT NOT NULL,
                    expected TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    grade TEXT NOT NULL
                );"
            )?;
            Ok(())
        })
        .await?;

        info!("Database initialized successfully");
        Ok(())
    }

    pub async fn save_report(&self, report: &EvalReport) -> Result<i64, DatabaseError> {
        let created_at = report.created_at.to_rfc3339();
        let document = report.document.clone();
        let settings = serde_json::to_string(&report.settings)?;
        let results: Vec<[String; 4]> = report.results
            .iter()
            .map(|r| [
                r.question.clone(),
                r.expected.clone(),
                r.answer.clone(),
                r.grade.to_string(),
            ])
            .collect();

        let run_id = self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO eval_runs (created_at, document, settings) VALUES (?1, ?2, ?3)",
                    [&created_at, &document, &settings],
                )?;
                let run_id = tx.last_insert_rowid();

                for [question, expected, answer, grade] in &results {
                    tx.execute(
                        "INSERT INTO eval_results (run_id, question, expected, answer, grade)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        [&run_id.to_string(), question, expected, answer, grade],
                    )?;
                }
                tx.commit()?;
                Ok(run_id)
            })
            .await?;

        info!("Saved evaluation run {} ({} questions)", run_id, report.results.len());
        Ok(run_id)
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunSummary>, DatabaseError> {
        let rows = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT r.id, r.created_at, r.document, r.settings,
                            COUNT(e.id),
                            COALESCE(SUM(CASE WHEN e.grade = 'CORRECT' THEN 1 ELSE 0 END), 0)
                     FROM eval_runs r
                     LEFT JOIN eval_results e ON e.run_id = r.id
                     GROUP BY r.id
                     ORDER BY r.id DESC
                     LIMIT ?"
                )?;

                let rows = stmt.query_map([limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?;

                let mut runs = Vec::new();
                for row in rows {
                    runs.push(row?);
                }
                Ok(runs)
            })
            .await?;

        rows.into_iter()
            .map(|(id, created_at, document, settings, total, correct)| {
                Ok(RunSummary {
                    id,
                    created_at,
                    document,
                    settings: serde_json::from_str(&settings)?,
                    total,
                    correct,
                })
            })
            .collect()
    }

    pub async fn run_results(&self, run_id: i64) -> Result<Vec<EvalResult>, DatabaseError> {
        let rows = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT question, expected, answer, grade
                     FROM eval_results
                     WHERE run_id = ?
                     ORDER BY id"
                )?;

                let rows = stmt.query_map([run_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(question, expected, answer, grade)| EvalResult {
                question,
                expected,
                answer,
                grade: Grade::from_reply(&grade),
            })
            .collect())
    }
}
