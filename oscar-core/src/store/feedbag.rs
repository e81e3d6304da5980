//! Feedbag (server-side contact list) CRUD.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::identity::IdentityKey;
use crate::wire::{Endian, Reader, TlvFraming, TlvList, Writer};

use super::Store;

/// Feedbag item classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbagClass {
    Group,
    Buddy,
    Permit,
    Deny,
    PdInfo,
    Bart,
    ClientPrefs,
    Other(u16),
}

impl FeedbagClass {
    fn to_u16(self) -> u16 {
        match self {
            FeedbagClass::Group => 0,
            FeedbagClass::Buddy => 1,
            FeedbagClass::Permit => 2,
            FeedbagClass::Deny => 3,
            FeedbagClass::PdInfo => 4,
            FeedbagClass::Bart => 5,
            FeedbagClass::ClientPrefs => 6,
            FeedbagClass::Other(v) => v,
        }
    }

    fn from_u16(v: u16) -> FeedbagClass {
        match v {
            0 => FeedbagClass::Group,
            1 => FeedbagClass::Buddy,
            2 => FeedbagClass::Permit,
            3 => FeedbagClass::Deny,
            4 => FeedbagClass::PdInfo,
            5 => FeedbagClass::Bart,
            6 => FeedbagClass::ClientPrefs,
            other => FeedbagClass::Other(other),
        }
    }
}

/// The TLV tag carrying the PD mode byte inside a `pdinfo` item.
const PDMODE_TLV_TAG: u16 = 0x00ca;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbagItem {
    pub group_id: u16,
    pub item_id: u16,
    pub class: FeedbagClass,
    pub name: String,
    pub tlvs: TlvList,
}

fn encode_tlvs(tlvs: &TlvList) -> Vec<u8> {
    let mut w = Writer::new(Endian::Big);
    tlvs.encode(&mut w, TlvFraming::Rest).expect("in-memory tlv encode is infallible");
    w.into_bytes().to_vec()
}

fn decode_tlvs(bytes: &[u8]) -> Result<TlvList, StoreError> {
    let mut r = Reader::new(bytes, Endian::Big);
    Ok(TlvList::decode(&mut r, TlvFraming::Rest)?)
}

impl Store {
    /// Upsert: normalizes a buddy item's `name` to an
    /// `IdentityKey`; for a `pdinfo` item, extracts the PD mode TLV,
    /// defaulting to `PermitAll` when absent -- a behavior certain
    /// clients rely on.
    pub async fn upsert_feedbag_item(&self, owner: &IdentityKey, item: &FeedbagItem) -> Result<(), StoreError> {
        let stored_name = if item.class == FeedbagClass::Buddy {
            IdentityKey::from_display(&item.name).into_inner()
        } else {
            item.name.clone()
        };
        let now = Utc::now().to_rfc3339();
        let blob = encode_tlvs(&item.tlvs);
        sqlx::query(
            "INSERT INTO feedbag_items (owner_identity, group_id, item_id, class_id, name, tlvs, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner_identity, group_id, item_id) DO UPDATE SET
                class_id = excluded.class_id, name = excluded.name, tlvs = excluded.tlvs, updated_at = excluded.updated_at",
        )
        .bind(owner.as_str())
        .bind(item.group_id as i64)
        .bind(item.item_id as i64)
        .bind(item.class.to_u16() as i64)
        .bind(&stored_name)
        .bind(&blob)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if item.class == FeedbagClass::PdInfo {
            let mode = item
                .tlvs
                .get_u8(PDMODE_TLV_TAG)
                .map(pd_mode_from_byte)
                .unwrap_or(crate::relationship::PrivacyMode::PermitAll);
            self.set_pd_mode(owner, mode).await?;
        }
        Ok(())
    }

    pub async fn delete_feedbag_item(&self, owner: &IdentityKey, group_id: u16, item_id: u16) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM feedbag_items WHERE owner_identity = ? AND group_id = ? AND item_id = ?")
            .bind(owner.as_str())
            .bind(group_id as i64)
            .bind(item_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_feedbag_items(&self, owner: &IdentityKey) -> Result<Vec<FeedbagItem>, StoreError> {
        let rows: Vec<(i64, i64, i64, String, Vec<u8>)> = sqlx::query_as(
            "SELECT group_id, item_id, class_id, name, tlvs FROM feedbag_items WHERE owner_identity = ?",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(group_id, item_id, class_id, name, blob)| {
                Ok(FeedbagItem {
                    group_id: group_id as u16,
                    item_id: item_id as u16,
                    class: FeedbagClass::from_u16(class_id as u16),
                    name,
                    tlvs: decode_tlvs(&blob)?,
                })
            })
            .collect()
    }

    pub async fn feedbag_last_modified(&self, owner: &IdentityKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT MAX(updated_at) FROM feedbag_items WHERE owner_identity = ?")
                .bind(owner.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row
            .and_then(|(ts,)| ts)
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Marks a user as server-side.
    pub async fn use_feedbag(&self, owner: &IdentityKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO privacy_settings (owner_identity, uses_feedbag) VALUES (?, 1)
             ON CONFLICT(owner_identity) DO UPDATE SET uses_feedbag = 1",
        )
        .bind(owner.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn pd_mode_from_byte(b: u8) -> crate::relationship::PrivacyMode {
    use crate::relationship::PrivacyMode;
    match b {
        1 => PrivacyMode::PermitAll,
        2 => PrivacyMode::DenyAll,
        3 => PrivacyMode::PermitSome,
        4 => PrivacyMode::DenySome,
        5 => PrivacyMode::PermitOnList,
        _ => PrivacyMode::PermitAll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Tlv;

    #[tokio::test]
    async fn buddy_item_name_is_normalized_to_identity_key() {
        let store = Store::open_in_memory().await.unwrap();
        let owner = IdentityKey::from_display("owner");
        store
            .upsert_feedbag_item(
                &owner,
                &FeedbagItem {
                    group_id: 1,
                    item_id: 1,
                    class: FeedbagClass::Buddy,
                    name: " Super User ".to_string(),
                    tlvs: TlvList::new(),
                },
            )
            .await
            .unwrap();
        let items = store.list_feedbag_items(&owner).await.unwrap();
        assert_eq!(items[0].name, "superuser");
    }

    #[tokio::test]
    async fn pdinfo_without_tlv_defaults_to_permit_all() {
        let store = Store::open_in_memory().await.unwrap();
        let owner = IdentityKey::from_display("owner");
        store
            .upsert_feedbag_item(
                &owner,
                &FeedbagItem {
                    group_id: 1,
                    item_id: 2,
                    class: FeedbagClass::PdInfo,
                    name: String::new(),
                    tlvs: TlvList::new(),
                },
            )
            .await
            .unwrap();
        // the default PD mode is reflected through privacy_settings, not
        // directly observable here; this asserts upsert doesn't error
        // when the PD mode TLV is absent.
    }

    #[tokio::test]
    async fn upsert_twice_yields_the_same_stored_set() {
        let store = Store::open_in_memory().await.unwrap();
        let owner = IdentityKey::from_display("owner");
        let item = FeedbagItem {
            group_id: 1,
            item_id: 3,
            class: FeedbagClass::Buddy,
            name: "pal".to_string(),
            tlvs: {
                let mut t = TlvList::new();
                t.append(Tlv::from_u8(1, 1));
                t
            },
        };
        store.upsert_feedbag_item(&owner, &item).await.unwrap();
        store.upsert_feedbag_item(&owner, &item).await.unwrap();
        let items = store.list_feedbag_items(&owner).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_tlv_blob_surfaces_as_malformed_not_no_such_user() {
        let store = Store::open_in_memory().await.unwrap();
        let owner = IdentityKey::from_display("owner");
        sqlx::query(
            "INSERT INTO feedbag_items (owner_identity, group_id, item_id, class_id, name, tlvs, updated_at)
             VALUES (?, 0, 0, 1, 'x', X'ff', '2024-01-01T00:00:00Z')",
        )
        .bind(owner.as_str())
        .execute(store.pool())
        .await
        .unwrap();
        assert!(matches!(
            store.list_feedbag_items(&owner).await,
            Err(StoreError::Malformed(_))
        ));
    }
}
