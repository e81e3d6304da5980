//! User account CRUD.

use chrono::Utc;

use crate::error::StoreError;
use crate::identity::{self, IdentityKey};

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    identity_key: String,
    display_name: String,
    email: Option<String>,
    uin: Option<i64>,
    icq_flag: bool,
    icq_nickname: Option<String>,
    icq_first_name: Option<String>,
    icq_last_name: Option<String>,
    suspended: bool,
    is_bot: bool,
    warn_level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub identity: IdentityKey,
    pub display_name: String,
    pub email: Option<String>,
    pub uin: Option<i64>,
    pub icq_flag: bool,
    pub icq_nickname: Option<String>,
    pub icq_first_name: Option<String>,
    pub icq_last_name: Option<String>,
    pub suspended: bool,
    pub is_bot: bool,
    pub warn_level: u16,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> User {
        User {
            identity: IdentityKey::from_display(&row.identity_key),
            display_name: row.display_name,
            email: row.email,
            uin: row.uin,
            icq_flag: row.icq_flag,
            icq_nickname: row.icq_nickname,
            icq_first_name: row.icq_first_name,
            icq_last_name: row.icq_last_name,
            suspended: row.suspended,
            is_bot: row.is_bot,
            warn_level: row.warn_level as u16,
        }
    }
}

#[derive(Default)]
pub struct NewUser {
    pub display_name: String,
    pub email: Option<String>,
    pub uin: Option<i64>,
    pub icq_flag: bool,
    pub password_hash: Option<String>,
    pub icq_nickname: Option<String>,
    pub icq_first_name: Option<String>,
    pub icq_last_name: Option<String>,
}

/// The subset of ICQ "white pages" fields the legacy search-by-details
/// food group queries on. Any combination of fields may be left `None`;
/// a present field is matched exactly against the stored value,
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct IcqSearchCriteria {
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl Store {
    /// Fails with `UinWithoutIcqFlag` if the display name is
    /// numeric but the ICQ flag isn't set.
    pub async fn insert_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        if identity::as_uin(&new_user.display_name).is_some() && !new_user.icq_flag {
            return Err(StoreError::UinWithoutIcqFlag);
        }
        let identity = IdentityKey::from_display(&new_user.display_name);
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (identity_key, display_name, email, uin, icq_flag, icq_nickname, icq_first_name, icq_last_name, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(identity.as_str())
        .bind(&new_user.display_name)
        .bind(&new_user.email)
        .bind(new_user.uin)
        .bind(new_user.icq_flag)
        .bind(&new_user.icq_nickname)
        .bind(&new_user.icq_first_name)
        .bind(&new_user.icq_last_name)
        .bind(&new_user.password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.lookup_user_by_identity(&identity)
            .await?
            .ok_or(StoreError::NoSuchUser)
    }

    pub async fn delete_user(&self, identity: &IdentityKey) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE identity_key = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    pub async fn lookup_user_by_identity(&self, identity: &IdentityKey) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT identity_key, display_name, email, uin, icq_flag, icq_nickname, icq_first_name, icq_last_name, suspended, is_bot, warn_level
             FROM users WHERE identity_key = ?",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn lookup_user_by_uin(&self, uin: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT identity_key, display_name, email, uin, icq_flag, icq_nickname, icq_first_name, icq_last_name, suspended, is_bot, warn_level
             FROM users WHERE uin = ?",
        )
        .bind(uin)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn lookup_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT identity_key, display_name, email, uin, icq_flag, icq_nickname, icq_first_name, icq_last_name, suspended, is_bot, warn_level
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn set_user_password(&self, identity: &IdentityKey, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE identity_key = ?")
            .bind(password_hash)
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    pub async fn update_display_screen_name(&self, identity: &IdentityKey, display_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET display_name = ? WHERE identity_key = ?")
            .bind(display_name)
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    pub async fn update_suspended_status(&self, identity: &IdentityKey, suspended: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET suspended = ? WHERE identity_key = ?")
            .bind(suspended)
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    pub async fn set_bot_status(&self, identity: &IdentityKey, is_bot: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_bot = ? WHERE identity_key = ?")
            .bind(is_bot)
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    pub async fn set_warn_level(&self, identity: &IdentityKey, warn_level: u16) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET warn_level = ? WHERE identity_key = ?")
            .bind(warn_level as i64)
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchUser);
        }
        Ok(())
    }

    /// The legacy ICQ white-pages search. Every
    /// populated field in `criteria` narrows the result with a
    /// case-insensitive exact match; an empty `criteria` matches nobody
    /// rather than the whole table.
    pub async fn lookup_users_by_icq_fields(&self, criteria: &IcqSearchCriteria) -> Result<Vec<User>, StoreError> {
        if criteria.nickname.is_none()
            && criteria.first_name.is_none()
            && criteria.last_name.is_none()
            && criteria.email.is_none()
        {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT identity_key, display_name, email, uin, icq_flag, icq_nickname, icq_first_name, icq_last_name, suspended, is_bot, warn_level
             FROM users
             WHERE (?1 IS NULL OR icq_nickname = ?1 COLLATE NOCASE)
               AND (?2 IS NULL OR icq_first_name = ?2 COLLATE NOCASE)
               AND (?3 IS NULL OR icq_last_name = ?3 COLLATE NOCASE)
               AND (?4 IS NULL OR email = ?4 COLLATE NOCASE)",
        )
        .bind(&criteria.nickname)
        .bind(&criteria.first_name)
        .bind(&criteria.last_name)
        .bind(&criteria.email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserting_a_numeric_display_name_without_icq_flag_fails() {
        let store = Store::open_in_memory().await.unwrap();
        let result = store
            .insert_user(NewUser {
                display_name: "12345".to_string(),
                uin: Some(12345),
                icq_flag: false,
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::UinWithoutIcqFlag)));
    }

    #[tokio::test]
    async fn insert_lookup_and_delete_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let user = store
            .insert_user(NewUser {
                display_name: "SuperUser".to_string(),
                email: Some("su@example.com".to_string()),
                password_hash: Some("hash".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(user.identity, IdentityKey::from_display("SuperUser"));

        let found = store.lookup_user_by_email("su@example.com").await.unwrap();
        assert!(found.is_some());

        store.delete_user(&user.identity).await.unwrap();
        assert!(store.lookup_user_by_identity(&user.identity).await.unwrap().is_none());
        assert!(matches!(
            store.delete_user(&user.identity).await,
            Err(StoreError::NoSuchUser)
        ));
    }

    #[tokio::test]
    async fn icq_field_search_matches_case_insensitively_and_narrows_on_every_field() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_user(NewUser {
                display_name: "67890".to_string(),
                uin: Some(67890),
                icq_flag: true,
                icq_nickname: Some("Snowman".to_string()),
                icq_first_name: Some("Jon".to_string()),
                icq_last_name: Some("Snow".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let by_nickname = store
            .lookup_users_by_icq_fields(&IcqSearchCriteria {
                nickname: Some("snowman".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_nickname.len(), 1);

        let narrowed_out = store
            .lookup_users_by_icq_fields(&IcqSearchCriteria {
                nickname: Some("snowman".to_string()),
                last_name: Some("Stark".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(narrowed_out.is_empty());

        let empty_criteria = store.lookup_users_by_icq_fields(&IcqSearchCriteria::default()).await.unwrap();
        assert!(empty_criteria.is_empty());
    }

    #[tokio::test]
    async fn set_warn_level_on_missing_user_fails() {
        let store = Store::open_in_memory().await.unwrap();
        let result = store.set_warn_level(&IdentityKey::from_display("ghost"), 50).await;
        assert!(matches!(result, Err(StoreError::NoSuchUser)));
    }
}
