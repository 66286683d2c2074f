// Repository layer for database operations
//
// Every write runs in one transaction that reads the server clock, applies
// the write and queues a notification on CHANGE_CHANNEL. The notification is
// only delivered to listeners once the transaction commits.

use agentdesk_core::document::resolve_write;
use agentdesk_core::{CollectionQuery, DocumentWrite, SortDirection};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::document_store::CHANGE_CHANNEL;
use crate::models::DocumentRow;

/// Pool size used by `from_url`; all live queries share one extra listening connection
pub const MAX_CONNECTIONS: u32 = 5;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Documents
    // ============================================

    /// Read a whole collection in query order
    ///
    /// Only string values of the ordering field are ordered, byte-wise.
    /// Documents where it is missing or not a string sort after the others
    /// when descending and before them when ascending. Ties keep insertion order.
    pub async fn list_documents(&self, query: &CollectionQuery) -> Result<Vec<DocumentRow>> {
        let sql = format!(
            r#"
            SELECT id, fields
            FROM documents
            WHERE collection = $1
            ORDER BY {}
            "#,
            order_clause(query.direction)
        );

        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&query.collection)
            .bind(&query.order_by)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, fields
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a document under a fresh id and return the id
    pub async fn insert_document(&self, collection: &str, write: &DocumentWrite) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        let now = server_now(&mut tx).await?;
        let id = Uuid::now_v7().simple().to_string();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, fields)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(resolve_write(write, now)))
        .execute(&mut *tx)
        .await?;

        notify_change(&mut tx, collection).await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Merge fields into an existing document
    ///
    /// Returns false, and changes nothing, when the document does not exist.
    pub async fn update_document(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let now = server_now(&mut tx).await?;

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET fields = fields || $3
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(resolve_write(write, now)))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        notify_change(&mut tx, collection).await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Delete a document, returning whether it existed
    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            notify_change(&mut tx, collection).await?;
        }
        tx.commit().await?;

        Ok(deleted)
    }
}

async fn server_now(conn: &mut PgConnection) -> Result<DateTime<Utc>> {
    let now = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT now()")
        .fetch_one(conn)
        .await?;
    Ok(now)
}

async fn notify_change(conn: &mut PgConnection, collection: &str) -> Result<()> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(CHANGE_CHANNEL)
        .bind(collection)
        .execute(conn)
        .await?;
    Ok(())
}

/// ORDER BY clause for a direction; the ordering field is bound as $2
fn order_clause(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Ascending => {
            "CASE WHEN jsonb_typeof(fields -> $2::text) = 'string' \
             THEN fields ->> $2::text END COLLATE \"C\" ASC NULLS FIRST, seq ASC"
        }
        SortDirection::Descending => {
            "CASE WHEN jsonb_typeof(fields -> $2::text) = 'string' \
             THEN fields ->> $2::text END COLLATE \"C\" DESC NULLS LAST, seq DESC"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_clause_descending_puts_missing_last() {
        let clause = order_clause(SortDirection::Descending);
        assert!(clause.contains("DESC NULLS LAST"));
        assert!(clause.ends_with("seq DESC"));
    }

    #[test]
    fn test_order_clause_ascending_puts_missing_first() {
        let clause = order_clause(SortDirection::Ascending);
        assert!(clause.contains("ASC NULLS FIRST"));
        assert!(clause.ends_with("seq ASC"));
    }

    #[test]
    fn test_order_clause_orders_strings_only() {
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let clause = order_clause(direction);
            assert!(clause.contains("jsonb_typeof(fields -> $2::text) = 'string'"));
            assert!(clause.contains("COLLATE \"C\""));
        }
    }
}
