//! Privacy-list operations and the temp-buddy registry.
//!
//! The store only ever hands back the *server-side* half of a
//! [`crate::relationship::UserRelationshipData`] -- the client-side
//! override, if any, lives on the live [`crate::session::Session`] and
//! is layered on top by whoever calls [`crate::relationship::resolve`].

use std::collections::HashSet;

use crate::error::StoreError;
use crate::identity::IdentityKey;
use crate::relationship::{PrivacyMode, RelationshipSource};

use super::Store;

fn mode_to_str(mode: PrivacyMode) -> &'static str {
    match mode {
        PrivacyMode::PermitAll => "permit_all",
        PrivacyMode::PermitOnList => "permit_on_list",
        PrivacyMode::PermitSome => "permit_some",
        PrivacyMode::DenyAll => "deny_all",
        PrivacyMode::DenySome => "deny_some",
    }
}

fn mode_from_str(s: &str) -> PrivacyMode {
    match s {
        "permit_on_list" => PrivacyMode::PermitOnList,
        "permit_some" => PrivacyMode::PermitSome,
        "deny_all" => PrivacyMode::DenyAll,
        "deny_some" => PrivacyMode::DenySome,
        _ => PrivacyMode::PermitAll,
    }
}

impl Store {
    /// Switching to a new mode atomically drops the
    /// permit/deny entries that were meaningful only under the old mode,
    /// so a later switch back can't resurrect a stale entry. Setting the
    /// same mode twice is a no-op.
    pub async fn set_pd_mode(&self, owner: &IdentityKey, mode: PrivacyMode) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let current: Option<(String,)> =
            sqlx::query_as("SELECT pd_mode FROM privacy_settings WHERE owner_identity = ?")
                .bind(owner.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let current_mode = current.map(|(m,)| mode_from_str(&m)).unwrap_or(PrivacyMode::PermitAll);
        if current_mode != mode {
            sqlx::query("DELETE FROM privacy_list_members WHERE owner_identity = ? AND kind IN ('permit', 'deny')")
                .bind(owner.as_str())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT INTO privacy_settings (owner_identity, pd_mode) VALUES (?, ?)
             ON CONFLICT(owner_identity) DO UPDATE SET pd_mode = excluded.pd_mode",
        )
        .bind(owner.as_str())
        .bind(mode_to_str(mode))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_members(&self, owner: &IdentityKey, kind: &str) -> Result<HashSet<IdentityKey>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT member_identity FROM privacy_list_members WHERE owner_identity = ? AND kind = ?")
                .bind(owner.as_str())
                .bind(kind)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(m,)| IdentityKey::from_display(&m)).collect())
    }

    async fn add_member(&self, owner: &IdentityKey, kind: &str, member: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO privacy_list_members (owner_identity, kind, member_identity) VALUES (?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(owner.as_str())
        .bind(kind)
        .bind(member.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_member(&self, owner: &IdentityKey, kind: &str, member: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM privacy_list_members WHERE owner_identity = ? AND kind = ? AND member_identity = ?")
            .bind(owner.as_str())
            .bind(kind)
            .bind(member.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_buddy(&self, owner: &IdentityKey, buddy: &IdentityKey) -> Result<(), StoreError> {
        self.add_member(owner, "buddy", buddy).await
    }

    pub async fn remove_buddy(&self, owner: &IdentityKey, buddy: &IdentityKey) -> Result<(), StoreError> {
        self.remove_member(owner, "buddy", buddy).await
    }

    pub async fn permit_buddy(&self, owner: &IdentityKey, target: &IdentityKey) -> Result<(), StoreError> {
        self.add_member(owner, "permit", target).await
    }

    pub async fn remove_permit_buddy(&self, owner: &IdentityKey, target: &IdentityKey) -> Result<(), StoreError> {
        self.remove_member(owner, "permit", target).await
    }

    pub async fn deny_buddy(&self, owner: &IdentityKey, target: &IdentityKey) -> Result<(), StoreError> {
        self.add_member(owner, "deny", target).await
    }

    pub async fn remove_deny_buddy(&self, owner: &IdentityKey, target: &IdentityKey) -> Result<(), StoreError> {
        self.remove_member(owner, "deny", target).await
    }

    pub async fn register_temp_buddy(&self, owner: &IdentityKey, buddy: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO temp_buddies (owner_identity, member_identity) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(owner.as_str())
        .bind(buddy.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unregister_temp_buddy(&self, owner: &IdentityKey, buddy: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM temp_buddies WHERE owner_identity = ? AND member_identity = ?")
            .bind(owner.as_str())
            .bind(buddy.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_temp_buddies(&self, owner: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM temp_buddies WHERE owner_identity = ?")
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The server-side half of a user's relationship data, for layering
    /// under a live session's client-side overrides by callers of
    /// [`crate::relationship::resolve`].
    pub async fn server_relationship_source(&self, owner: &IdentityKey) -> Result<RelationshipSource, StoreError> {
        let mode_row: Option<(String,)> =
            sqlx::query_as("SELECT pd_mode FROM privacy_settings WHERE owner_identity = ?")
                .bind(owner.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let mode = mode_row.map(|(m,)| mode_from_str(&m)).unwrap_or(PrivacyMode::PermitAll);
        Ok(RelationshipSource {
            mode,
            buddy: self.list_members(owner, "buddy").await?,
            permit: self.list_members(owner, "permit").await?,
            deny: self.list_members(owner, "deny").await?,
        })
    }

    pub async fn temp_buddies(&self, owner: &IdentityKey) -> Result<HashSet<IdentityKey>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT member_identity FROM temp_buddies WHERE owner_identity = ?")
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(m,)| IdentityKey::from_display(&m)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitioning_from_permit_some_to_deny_some_drops_the_old_permit_entry() {
        let store = Store::open_in_memory().await.unwrap();
        let me = IdentityKey::from_display("me");
        let them = IdentityKey::from_display("them");
        store.set_pd_mode(&me, PrivacyMode::PermitSome).await.unwrap();
        store.permit_buddy(&me, &them).await.unwrap();
        let source = store.server_relationship_source(&me).await.unwrap();
        assert!(source.permit.contains(&them));

        store.set_pd_mode(&me, PrivacyMode::DenySome).await.unwrap();
        let source = store.server_relationship_source(&me).await.unwrap();
        assert!(!source.permit.contains(&them));
        assert_eq!(source.mode, PrivacyMode::DenySome);
    }

    #[tokio::test]
    async fn setting_the_same_pd_mode_twice_leaves_relationships_unchanged() {
        let store = Store::open_in_memory().await.unwrap();
        let me = IdentityKey::from_display("me");
        let them = IdentityKey::from_display("them");
        store.set_pd_mode(&me, PrivacyMode::DenySome).await.unwrap();
        store.deny_buddy(&me, &them).await.unwrap();
        store.set_pd_mode(&me, PrivacyMode::DenySome).await.unwrap();
        let source = store.server_relationship_source(&me).await.unwrap();
        assert!(source.deny.contains(&them));
    }
}
