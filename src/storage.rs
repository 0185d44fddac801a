use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous}, Row};
use tracing::debug;
use uuid::Uuid;

use crate::config::resolve_default_db_url;
use crate::conversation::{ChatTurn, Conversation};
use crate::settings::ConversationSettings;

#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: Pool<Sqlite>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, settings: ConversationSettings) -> anyhow::Result<Uuid>;
    async fn delete_conversation(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn list_conversations(&self) -> anyhow::Result<Vec<Uuid>>;
    async fn get_conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>>;
    async fn update_settings(&self, id: Uuid, settings: ConversationSettings) -> anyhow::Result<()>;
    /// Turns in insertion order; `None` spans every conversation.
    async fn list_turns(&self, conversation: Option<Uuid>) -> anyhow::Result<Vec<ChatTurn>>;
    /// Writes the user turn and the agent answer atomically, in that order.
    async fn record_exchange(&self, conversation: Uuid, user_message: &str, answer: &str) -> anyhow::Result<(ChatTurn, ChatTurn)>;
    /// Deletes turns; `None` purges every conversation. Returns the number removed.
    async fn purge_turns(&self, conversation: Option<Uuid>) -> anyhow::Result<u64>;
}

impl SqliteConversationStore {
    pub async fn initialize(database_url: Option<String>) -> anyhow::Result<Self> {
        let url = match database_url {
            Some(u) => u,
            None => resolve_default_db_url()?,
        };
        let options = url.parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> { &self.pool }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn turn_from_row(r: &SqliteRow) -> anyhow::Result<ChatTurn> {
    let conversation: String = r.get("conversation_id");
    let created_at: String = r.get("created_at");
    Ok(ChatTurn {
        id: r.get("id"),
        conversation_id: Uuid::parse_str(&conversation)?,
        message: r.try_get("message").ok(),
        is_bot: r.get("is_bot"),
        created_at: parse_timestamp(&created_at),
    })
}

async fn insert_turn(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    conversation: Uuid,
    message: &str,
    is_bot: bool,
) -> anyhow::Result<ChatTurn> {
    let now = Utc::now();
    let res = sqlx::query("INSERT INTO chat_turns (conversation_id, message, is_bot, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(conversation.to_string())
        .bind(message)
        .bind(is_bot)
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    Ok(ChatTurn {
        id: res.last_insert_rowid(),
        conversation_id: conversation,
        message: Some(message.to_string()),
        is_bot,
        created_at: now,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(&self, settings: ConversationSettings) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now: DateTime<Utc> = Utc::now();
        let settings_json = serde_json::to_string(&settings)?;
        sqlx::query("INSERT INTO conversations (id, created_at, settings_json) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(now.to_rfc3339())
            .bind(settings_json)
            .execute(&self.pool).await?;
        Ok(id)
    }

    async fn delete_conversation(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_conversations(&self) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM conversations ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        let ids = rows.into_iter().filter_map(|r| {
            let id_str: String = r.get::<String, _>("id");
            Uuid::parse_str(&id_str).ok()
        }).collect();
        Ok(ids)
    }

    async fn get_conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>> {
        let row = sqlx::query("SELECT id, created_at, settings_json FROM conversations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(r) = row else { return Ok(None) };
        let settings_json: String = r.get("settings_json");
        let settings: ConversationSettings = serde_json::from_str(&settings_json)?;
        let created_at: String = r.get("created_at");
        let turns = self.list_turns(Some(id)).await?;
        Ok(Some(Conversation { id, created_at: parse_timestamp(&created_at), turns, settings }))
    }

    async fn update_settings(&self, id: Uuid, settings: ConversationSettings) -> anyhow::Result<()> {
        let settings_json = serde_json::to_string(&settings)?;
        sqlx::query("UPDATE conversations SET settings_json = ?1 WHERE id = ?2")
            .bind(settings_json)
            .bind(id.to_string())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn list_turns(&self, conversation: Option<Uuid>) -> anyhow::Result<Vec<ChatTurn>> {
        let rows = match conversation {
            Some(id) => {
                sqlx::query("SELECT id, conversation_id, message, is_bot, created_at FROM chat_turns WHERE conversation_id = ?1 ORDER BY id ASC")
                    .bind(id.to_string())
                    .fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query("SELECT id, conversation_id, message, is_bot, created_at FROM chat_turns ORDER BY id ASC")
                    .fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(turn_from_row).collect()
    }

    async fn record_exchange(&self, conversation: Uuid, user_message: &str, answer: &str) -> anyhow::Result<(ChatTurn, ChatTurn)> {
        let mut tx = self.pool.begin().await?;
        let user = insert_turn(&mut tx, conversation, user_message, false).await?;
        let bot = insert_turn(&mut tx, conversation, answer, true).await?;
        tx.commit().await?;
        debug!(%conversation, user_turn = user.id, bot_turn = bot.id, "exchange recorded");
        Ok((user, bot))
    }

    async fn purge_turns(&self, conversation: Option<Uuid>) -> anyhow::Result<u64> {
        let res = match conversation {
            Some(id) => {
                sqlx::query("DELETE FROM chat_turns WHERE conversation_id = ?1")
                    .bind(id.to_string())
                    .execute(&self.pool).await?
            }
            None => sqlx::query("DELETE FROM chat_turns").execute(&self.pool).await?,
        };
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
pub(crate) async fn temp_store() -> (SqliteConversationStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let url = format!("sqlite://{}", path.to_string_lossy());
    let store = SqliteConversationStore::initialize(Some(url)).await.unwrap();
    (store, dir)
}
