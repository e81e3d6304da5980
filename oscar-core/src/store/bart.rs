//! BART (buddy-art) icon/sound blob store.

use crate::error::StoreError;

use super::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BartItem {
    pub hash: Vec<u8>,
    pub item_type: u16,
    pub data: Vec<u8>,
}

impl Store {
    /// Fails with `BartItemExists` on a duplicate `(hash, type)`.
    pub async fn insert_bart_item(&self, item: &BartItem) -> Result<(), StoreError> {
        let hash_hex = hex::encode(&item.hash);
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM bart_items WHERE hash = ? AND item_type = ?",
        )
        .bind(&hash_hex)
        .bind(item.item_type as i64)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(StoreError::BartItemExists);
        }
        sqlx::query("INSERT INTO bart_items (hash, item_type, data) VALUES (?, ?, ?)")
            .bind(&hash_hex)
            .bind(item.item_type as i64)
            .bind(&item.data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sorted by hex-of-hash ascending.
    pub async fn list_bart_items_by_type(&self, item_type: u16) -> Result<Vec<BartItem>, StoreError> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT hash, data FROM bart_items WHERE item_type = ? ORDER BY hash ASC",
        )
        .bind(item_type as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(hash_hex, data)| {
                Ok(BartItem {
                    hash: hex::decode(&hash_hex).map_err(|_| StoreError::BartItemNotFound)?,
                    item_type,
                    data,
                })
            })
            .collect()
    }

    pub async fn delete_bart_item(&self, hash: &[u8], item_type: u16) -> Result<(), StoreError> {
        let hash_hex = hex::encode(hash);
        let result = sqlx::query("DELETE FROM bart_items WHERE hash = ? AND item_type = ?")
            .bind(&hash_hex)
            .bind(item_type as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::BartItemNotFound);
        }
        Ok(())
    }
}
