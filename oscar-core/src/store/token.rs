//! Web-API bearer token store.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::IdentityKey;

use super::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub token: String,
    pub identity: IdentityKey,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub async fn issue_token(&self, identity: &IdentityKey, ttl: Duration) -> Result<ApiToken, StoreError> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + ttl;
        sqlx::query("INSERT INTO api_tokens (token, identity_key, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(identity.as_str())
            .bind(expires_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(ApiToken {
            token,
            identity: identity.clone(),
            expires_at,
        })
    }

    /// Fails with `NoSuchToken` if absent, or `TokenExpired` (deleting
    /// the stale row as it goes) once past `expires_at`.
    pub async fn validate_token(&self, token: &str) -> Result<IdentityKey, StoreError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT identity_key, expires_at FROM api_tokens WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        let (identity_key, expires_at) = row.ok_or(StoreError::NoSuchToken)?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(Utc::now());
        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM api_tokens WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(StoreError::TokenExpired);
        }
        Ok(IdentityKey::from_display(&identity_key))
    }

    pub async fn revoke_token(&self, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchToken);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_validates_to_the_same_identity() {
        let store = Store::open_in_memory().await.unwrap();
        let identity = IdentityKey::from_display("user");
        let issued = store.issue_token(&identity, Duration::hours(1)).await.unwrap();
        let validated = store.validate_token(&issued.token).await.unwrap();
        assert_eq!(validated, identity);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_removed() {
        let store = Store::open_in_memory().await.unwrap();
        let identity = IdentityKey::from_display("user");
        let issued = store.issue_token(&identity, Duration::seconds(-1)).await.unwrap();
        assert!(matches!(
            store.validate_token(&issued.token).await,
            Err(StoreError::TokenExpired)
        ));
        assert!(matches!(
            store.validate_token(&issued.token).await,
            Err(StoreError::NoSuchToken)
        ));
    }

    #[tokio::test]
    async fn unknown_token_fails() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(matches!(
            store.validate_token("nonexistent").await,
            Err(StoreError::NoSuchToken)
        ));
    }

    #[tokio::test]
    async fn revoking_removes_it() {
        let store = Store::open_in_memory().await.unwrap();
        let identity = IdentityKey::from_display("user");
        let issued = store.issue_token(&identity, Duration::hours(1)).await.unwrap();
        store.revoke_token(&issued.token).await.unwrap();
        assert!(matches!(
            store.validate_token(&issued.token).await,
            Err(StoreError::NoSuchToken)
        ));
    }
}
