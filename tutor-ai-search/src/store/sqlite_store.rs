//! SQLite-backed concept store
//!
//! Stores concept records with their f16 embedding vectors as BLOBs, keyed by
//! the model variant that produced them. This adapter has no native
//! approximate-nearest-neighbor structure, so it reports the native index as
//! unavailable and serves the full-scan path only.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE concepts (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name TEXT,                  -- concept title
//!     definition TEXT,            -- main body text
//!     example TEXT,               -- optional illustrative example
//!     source_type TEXT,           -- official | teacher | student
//!     credibility_score REAL,     -- optional per-concept override
//!     embedding BLOB,             -- little-endian f16 vector (optional)
//!     model TEXT,                 -- variant id the vector was produced with
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```

use crate::concept::{Concept, SourceType};
use crate::error::{Result, SearchError};
use crate::store::ConceptStore;
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tutor_ai_embed::ModelVariant;

/// SQLite adapter for [`ConceptStore`].
#[derive(Clone, Debug)]
pub struct SqliteConceptStore {
    pool: SqlitePool,
}

impl SqliteConceptStore {
    /// Open (creating if missing) a persistent concept database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path.as_ref())
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                example TEXT,
                source_type TEXT NOT NULL,
                credibility_score REAL,
                embedding BLOB,
                model TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT unique_concept UNIQUE(name, model)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_concepts_model ON concepts(model)")
            .execute(pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_concepts_source ON concepts(model, source_type)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<Concept> {
        let source_type: String = row.get("source_type");
        let source_type = source_type
            .parse::<SourceType>()
            .map_err(SearchError::store)?;

        let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
        let embedding =
            embedding_bytes.map(|bytes| bytemuck::pod_collect_to_vec::<u8, f16>(&bytes));

        Ok(Concept {
            id: Some(row.get::<i64, _>("id")),
            name: row.get("name"),
            definition: row.get("definition"),
            example: row.get("example"),
            source_type,
            credibility_score: row.get::<Option<f64>, _>("credibility_score").map(|c| c as f32),
            embedding,
        })
    }
}

#[async_trait]
impl ConceptStore for SqliteConceptStore {
    async fn fetch_candidates(
        &self,
        source_types: Option<&[SourceType]>,
        variant: ModelVariant,
    ) -> Result<Vec<Concept>> {
        let filter = source_types.filter(|types| !types.is_empty());

        let mut sql = String::from(
            "SELECT id, name, definition, example, source_type, credibility_score, embedding
             FROM concepts WHERE model = ?",
        );
        if let Some(types) = filter {
            let placeholders = vec!["?"; types.len()].join(", ");
            sql.push_str(&format!(" AND source_type IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql).bind(variant.id());
        if let Some(types) = filter {
            for source_type in types {
                query = query.bind(source_type.as_str());
            }
        }

        let rows = query.fetch_all(&self.pool).await?;
        tracing::debug!("fetched {} candidate rows for variant {variant}", rows.len());

        rows.iter().map(Self::decode_row).collect()
    }

    async fn native_index_available(&self, _variant: ModelVariant) -> Result<bool> {
        // SQLite has no ANN structure to delegate to.
        Ok(false)
    }

    async fn native_topk(
        &self,
        _query: &[f16],
        _k: usize,
        _source_types: Option<&[SourceType]>,
        _variant: ModelVariant,
    ) -> Result<Vec<(Concept, f32)>> {
        Err(SearchError::store(
            "sqlite concept store has no native similarity index",
        ))
    }

    async fn upsert_concepts(
        &self,
        concepts: Vec<Concept>,
        variant: ModelVariant,
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(concepts.len());

        for concept in &concepts {
            let embedding_bytes = concept
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<f16, u8>(e).to_vec());

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO concepts
                    (name, definition, example, source_type, credibility_score, embedding, model)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(name, model) DO UPDATE SET
                    definition = excluded.definition,
                    example = excluded.example,
                    source_type = excluded.source_type,
                    credibility_score = excluded.credibility_score,
                    embedding = excluded.embedding
                RETURNING id
                "#,
            )
            .bind(&concept.name)
            .bind(&concept.definition)
            .bind(concept.example.as_deref())
            .bind(concept.source_type.as_str())
            .bind(concept.credibility_score.map(|c| c as f64))
            .bind(embedding_bytes)
            .bind(variant.id())
            .fetch_one(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn concept_count(&self, variant: ModelVariant) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concepts WHERE model = ?1")
            .bind(variant.id())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
