//! Profile store.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::identity::IdentityKey;

use super::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub mime_type: String,
    pub body: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Profile {
    fn default() -> Profile {
        Profile {
            mime_type: String::new(),
            body: String::new(),
            updated_at: None,
        }
    }
}

impl Store {
    /// Returns an empty profile (zero update time, empty MIME) when
    /// absent, rather than an error.
    pub async fn get_profile(&self, identity: &IdentityKey) -> Result<Profile, StoreError> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT mime_type, body, updated_at FROM profiles WHERE identity_key = ?")
                .bind(identity.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            None => Profile::default(),
            Some((mime_type, body, updated_at)) => Profile {
                mime_type,
                body,
                updated_at: DateTime::parse_from_rfc3339(&updated_at).ok().map(|dt| dt.with_timezone(&Utc)),
            },
        })
    }

    /// Upsert, preserving nothing from the old row but `identity_key`
    /// itself -- `MIMEType` and `UpdateTime` are both part of what's set.
    pub async fn set_profile(&self, identity: &IdentityKey, mime_type: &str, body: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO profiles (identity_key, mime_type, body, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(identity_key) DO UPDATE SET mime_type = excluded.mime_type, body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(identity.as_str())
        .bind(mime_type)
        .bind(body)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_profile_is_empty_not_an_error() {
        let store = Store::open_in_memory().await.unwrap();
        let profile = store.get_profile(&IdentityKey::from_display("nobody")).await.unwrap();
        assert_eq!(profile, Profile::default());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let identity = IdentityKey::from_display("user");
        store.set_profile(&identity, "text/plain", "hello").await.unwrap();
        let profile = store.get_profile(&identity).await.unwrap();
        assert_eq!(profile.mime_type, "text/plain");
        assert_eq!(profile.body, "hello");
        assert!(profile.updated_at.is_some());
    }
}
