//! SQLite persistence. All writes go through here; transactions are
//! short-lived and never span an external call.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};

use channelpulse_common::{Insight, PulseError, Source, SourceKind, StoredMessage, TopicSummary};

type Result<T> = std::result::Result<T, PulseError>;

fn db(e: sqlx::Error) -> PulseError {
    PulseError::Database(e.to_string())
}

/// Outcome of recording a fetched message.
#[derive(Debug, Clone, Copy)]
pub struct RecordedMessage {
    pub id: i64,
    /// True iff this call created the row.
    pub inserted: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    source_url: String,
    source_type: String,
    channel_id: String,
    message_id: i64,
    date: DateTime<Utc>,
    text: String,
    resolved_links: Option<String>,
    processed: bool,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        StoredMessage {
            id: row.id,
            source_url: row.source_url,
            source_type: row.source_type,
            channel_id: row.channel_id,
            message_id: row.message_id,
            date: row.date,
            text: row.text,
            resolved_links: row.resolved_links,
            processed: row.processed,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file and run migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(db)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps every
    /// query on the same ephemeral database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(db)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PulseError::Database(e.to_string()))?;
        Ok(())
    }

    // ----- sources -----

    /// Insert or refresh a source, keyed by canonical URL.
    pub async fn upsert_source(
        &self,
        url: &str,
        name: &str,
        kind: SourceKind,
        category: &str,
    ) -> Result<Source> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO sources (url, name, source_type, category, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (url) DO UPDATE SET
                name = excluded.name,
                source_type = excluded.source_type,
                category = excluded.category
            RETURNING id, created_at
            "#,
        )
        .bind(url)
        .bind(name)
        .bind(kind.as_str())
        .bind(category)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;

        Ok(Source {
            id: row.try_get(0).map_err(db)?,
            url: url.to_string(),
            name: name.to_string(),
            source_type: kind,
            category: category.to_string(),
            created_at: row.try_get(1).map_err(db)?,
        })
    }

    pub async fn list_sources_by_category(&self) -> Result<BTreeMap<String, Vec<Source>>> {
        let rows = sqlx::query(
            "SELECT id, url, name, source_type, category, created_at
             FROM sources ORDER BY category, name, url",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut grouped: BTreeMap<String, Vec<Source>> = BTreeMap::new();
        for row in rows {
            let source_type: String = row.try_get("source_type").map_err(db)?;
            let source = Source {
                id: row.try_get("id").map_err(db)?,
                url: row.try_get("url").map_err(db)?,
                name: row.try_get("name").map_err(db)?,
                source_type: SourceKind::from_db(&source_type),
                category: row.try_get("category").map_err(db)?,
                created_at: row.try_get("created_at").map_err(db)?,
            };
            grouped.entry(source.category.clone()).or_default().push(source);
        }
        Ok(grouped)
    }

    // ----- messages -----

    /// Record a fetched message. Idempotent on (kind, channel, message id).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_message(
        &self,
        kind: &str,
        channel_id: &str,
        message_id: i64,
        source_url: &str,
        date: DateTime<Utc>,
        text: &str,
    ) -> Result<RecordedMessage> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO messages
                (source_type, channel_id, message_id, source_url, date, text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(kind)
        .bind(channel_id)
        .bind(message_id)
        .bind(source_url)
        .bind(date)
        .bind(text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let inserted = result.rows_affected() > 0;
        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM messages
             WHERE source_type = ?1 AND channel_id = ?2 AND message_id = ?3",
        )
        .bind(kind)
        .bind(channel_id)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;

        Ok(RecordedMessage { id, inserted })
    }

    pub async fn attach_resolved_links(&self, message_pk: i64, json_text: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET resolved_links = ?1 WHERE id = ?2")
            .bind(json_text)
            .bind(message_pk)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Messages in [since, until], timestamp ascending. An empty source
    /// list means all sources.
    pub async fn get_messages_in_window(
        &self,
        source_urls: &[String],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, source_url, source_type, channel_id, message_id, date, text,
                    resolved_links, processed
             FROM messages WHERE date >= ",
        );
        query.push_bind(since);
        query.push(" AND date <= ");
        query.push_bind(until);
        if !source_urls.is_empty() {
            query.push(" AND source_url IN (");
            let mut values = query.separated(", ");
            for url in source_urls {
                values.push_bind(url);
            }
            query.push(")");
        }
        query.push(" ORDER BY date ASC, id ASC");

        let rows: Vec<MessageRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    pub async fn get_message(&self, id: i64) -> Result<Option<StoredMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, source_url, source_type, channel_id, message_id, date, text,
                    resolved_links, processed
             FROM messages WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(StoredMessage::from))
    }

    /// Advisory flag flip once summarization has consumed a batch.
    pub async fn mark_messages_processed(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE messages SET processed = 1 WHERE id IN (");
        let mut values = query.separated(", ");
        for id in ids {
            values.push_bind(id);
        }
        query.push(")");
        query.build().execute(&self.pool).await.map_err(db)?;
        Ok(())
    }

    // ----- link summaries -----

    pub async fn get_link_summary(&self, url: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT summary_content FROM link_summaries WHERE url = ?1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)
    }

    pub async fn put_link_summary(&self, url: &str, text: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO link_summaries (url, summary_content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (url) DO UPDATE SET
                summary_content = excluded.summary_content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(url)
        .bind(text)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    // ----- analysis results -----

    pub async fn save_topic_summary(&self, summary: &TopicSummary) -> Result<i64> {
        let message_ids = serde_json::to_string(&summary.message_ids)
            .map_err(|e| PulseError::Database(e.to_string()))?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO topic_summaries (topic, metatopic, importance, summary, message_ids, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id
            "#,
        )
        .bind(&summary.topic)
        .bind(&summary.metatopic)
        .bind(summary.importance as i64)
        .bind(&summary.summary)
        .bind(message_ids)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Ok(id)
    }

    /// Upsert the insight for a topic; repeated requests overwrite.
    pub async fn save_insight(&self, topic: &str, record: &Insight) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| PulseError::Database(e.to_string()))?;
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO insights (topic, record, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (topic) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(topic)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    // ----- community -----

    pub async fn add_feedback(&self, email: &str, message: &str, kind: &str) -> Result<()> {
        sqlx::query("INSERT INTO feedback (email, message, kind, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(email)
            .bind(message)
            .bind(kind)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Returns true iff the email was newly added; duplicates are not an error.
    pub async fn add_subscriber(&self, email: &str, source: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscribers (email, source, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(email)
        .bind(source)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn subscriber_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }
}
