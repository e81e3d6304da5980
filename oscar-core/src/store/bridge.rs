//! Web-to-OSCAR bridge table: maps an external web-session id to the
//! OSCAR auth cookie and BOS host/port it should reconnect through.

use crate::error::StoreError;

use super::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRecord {
    pub web_session_id: String,
    pub cookie: Vec<u8>,
    pub bos_host: String,
    pub bos_port: u16,
}

impl Store {
    /// Upsert keyed on `web_session_id`.
    pub async fn put_bridge_record(&self, record: &BridgeRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO oscar_bridge (web_session_id, cookie, bos_host, bos_port) VALUES (?, ?, ?, ?)
             ON CONFLICT(web_session_id) DO UPDATE SET
                 cookie = excluded.cookie, bos_host = excluded.bos_host, bos_port = excluded.bos_port",
        )
        .bind(&record.web_session_id)
        .bind(&record.cookie)
        .bind(&record.bos_host)
        .bind(record.bos_port as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_bridge_record(&self, web_session_id: &str) -> Result<BridgeRecord, StoreError> {
        let row: Option<(Vec<u8>, String, i64)> =
            sqlx::query_as("SELECT cookie, bos_host, bos_port FROM oscar_bridge WHERE web_session_id = ?")
                .bind(web_session_id)
                .fetch_optional(&self.pool)
                .await?;
        let (cookie, bos_host, bos_port) = row.ok_or(StoreError::NoSuchKey)?;
        Ok(BridgeRecord {
            web_session_id: web_session_id.to_string(),
            cookie,
            bos_host,
            bos_port: bos_port as u16,
        })
    }

    pub async fn delete_bridge_record(&self, web_session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM oscar_bridge WHERE web_session_id = ?")
            .bind(web_session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(web_session_id: &str) -> BridgeRecord {
        BridgeRecord {
            web_session_id: web_session_id.to_string(),
            cookie: vec![1, 2, 3],
            bos_host: "bos.example.com".to_string(),
            bos_port: 5190,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        store.put_bridge_record(&sample("sess-1")).await.unwrap();
        let fetched = store.get_bridge_record("sess-1").await.unwrap();
        assert_eq!(fetched, sample("sess-1"));
    }

    #[tokio::test]
    async fn put_twice_upserts_rather_than_conflicts() {
        let store = Store::open_in_memory().await.unwrap();
        store.put_bridge_record(&sample("sess-1")).await.unwrap();
        let mut updated = sample("sess-1");
        updated.bos_port = 443;
        store.put_bridge_record(&updated).await.unwrap();
        let fetched = store.get_bridge_record("sess-1").await.unwrap();
        assert_eq!(fetched.bos_port, 443);
    }

    #[tokio::test]
    async fn missing_record_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(matches!(
            store.get_bridge_record("ghost").await,
            Err(StoreError::NoSuchKey)
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = Store::open_in_memory().await.unwrap();
        store.put_bridge_record(&sample("sess-1")).await.unwrap();
        store.delete_bridge_record("sess-1").await.unwrap();
        assert!(matches!(
            store.get_bridge_record("sess-1").await,
            Err(StoreError::NoSuchKey)
        ));
    }
}
