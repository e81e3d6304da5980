//! Offline-message inbox.

use chrono::Utc;

use crate::error::StoreError;
use crate::identity::IdentityKey;

use super::Store;

pub const INBOX_CAPACITY: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineMessage {
    pub sender: IdentityKey,
    pub body: Vec<u8>,
}

impl Store {
    async fn user_exists(&self, identity: &IdentityKey) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE identity_key = ?")
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Requires both sender and recipient to exist; returns the new
    /// stored count; fails atomically with `InboxFull` once the
    /// recipient already holds `INBOX_CAPACITY` messages, with no count
    /// change.
    pub async fn save_offline_message(
        &self,
        recipient: &IdentityKey,
        sender: &IdentityKey,
        body: &[u8],
    ) -> Result<i64, StoreError> {
        if !self.user_exists(recipient).await? || !self.user_exists(sender).await? {
            return Err(StoreError::NoSuchUser);
        }
        let mut tx = self.pool().begin().await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_messages WHERE recipient_identity = ?")
            .bind(recipient.as_str())
            .fetch_one(&mut *tx)
            .await?;
        if count >= INBOX_CAPACITY {
            return Err(StoreError::InboxFull);
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO offline_messages (recipient_identity, sender_identity, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(recipient.as_str())
        .bind(sender.as_str())
        .bind(body)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(count + 1)
    }

    /// Chronological order per recipient.
    pub async fn retrieve_offline_messages(&self, recipient: &IdentityKey) -> Result<Vec<OfflineMessage>, StoreError> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT sender_identity, body FROM offline_messages WHERE recipient_identity = ? ORDER BY id ASC",
        )
        .bind(recipient.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(sender, body)| OfflineMessage {
                sender: IdentityKey::from_display(&sender),
                body,
            })
            .collect())
    }

    pub async fn delete_offline_messages(&self, recipient: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offline_messages WHERE recipient_identity = ?")
            .bind(recipient.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewUser;

    async fn seeded_store() -> (Store, IdentityKey, IdentityKey) {
        let store = Store::open_in_memory().await.unwrap();
        let recipient = store
            .insert_user(NewUser {
                display_name: "recipient".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .identity;
        let sender = store
            .insert_user(NewUser {
                display_name: "sender".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .identity;
        (store, recipient, sender)
    }

    #[tokio::test]
    async fn saving_to_an_unknown_recipient_fails() {
        let store = Store::open_in_memory().await.unwrap();
        let result = store
            .save_offline_message(
                &IdentityKey::from_display("ghost"),
                &IdentityKey::from_display("also-ghost"),
                b"hi",
            )
            .await;
        assert!(matches!(result, Err(StoreError::NoSuchUser)));
    }

    #[tokio::test]
    async fn overflow_at_101_leaves_count_at_100_and_order_intact() {
        let (store, recipient, sender) = seeded_store().await;
        for i in 0..100 {
            let count = store
                .save_offline_message(&recipient, &sender, format!("msg{i}").as_bytes())
                .await
                .unwrap();
            assert_eq!(count, i + 1);
        }
        assert!(matches!(
            store.save_offline_message(&recipient, &sender, b"overflow").await,
            Err(StoreError::InboxFull)
        ));
        let messages = store.retrieve_offline_messages(&recipient).await.unwrap();
        assert_eq!(messages.len(), 100);
        assert_eq!(messages[0].body, b"msg0");
        assert_eq!(messages[99].body, b"msg99");
    }

    #[tokio::test]
    async fn delete_removes_all_for_recipient() {
        let (store, recipient, sender) = seeded_store().await;
        store.save_offline_message(&recipient, &sender, b"hi").await.unwrap();
        store.delete_offline_messages(&recipient).await.unwrap();
        assert!(store.retrieve_offline_messages(&recipient).await.unwrap().is_empty());
    }
}
