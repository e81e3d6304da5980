//! Keyword/category interest directory.

use crate::error::StoreError;
use crate::identity::IdentityKey;

use super::Store;

pub const CATEGORY_CAPACITY: i64 = 255;
/// A generous but finite ceiling, consistent with the rest of the
/// registry's fixed-capacity checks (see DESIGN.md).
pub const KEYWORD_CAPACITY: i64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestEntry {
    Category { id: i64, name: String },
    Keyword { id: i64, name: String, category_id: Option<i64> },
}

pub type InterestRow = InterestEntry;

impl Store {
    pub async fn create_category(&self, name: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM keyword_categories")
            .fetch_one(&self.pool)
            .await?;
        if count >= CATEGORY_CAPACITY {
            return Err(StoreError::TooManyCategories);
        }
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM keyword_categories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(StoreError::CategoryExists);
        }
        let result = sqlx::query("INSERT INTO keyword_categories (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fails with `CategoryInUse` if any of its keywords is referenced
    /// by a user; fails with `CategoryNotFound` if absent; otherwise
    /// cascades to delete its (unreferenced) keywords too.
    pub async fn delete_category(&self, category_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM keyword_categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::CategoryNotFound);
        }
        let in_use: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM user_keywords uk
             JOIN keywords k ON k.id = uk.keyword_id
             WHERE k.category_id = ? LIMIT 1",
        )
        .bind(category_id)
        .fetch_optional(&mut *tx)
        .await?;
        if in_use.is_some() {
            return Err(StoreError::CategoryInUse);
        }
        sqlx::query("DELETE FROM keywords WHERE category_id = ?")
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM keyword_categories WHERE id = ?")
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `category_id == Some(0)` or `None` both mean uncategorized.
    pub async fn create_keyword(&self, name: &str, category_id: Option<i64>) -> Result<i64, StoreError> {
        let category_id = category_id.filter(|id| *id != 0);
        if let Some(category_id) = category_id {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM keyword_categories WHERE id = ?")
                .bind(category_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(StoreError::CategoryNotFound);
            }
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM keywords").fetch_one(&self.pool).await?;
        if count >= KEYWORD_CAPACITY {
            return Err(StoreError::TooManyKeywords);
        }
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM keywords WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(StoreError::KeywordExists);
        }
        let result = sqlx::query("INSERT INTO keywords (name, category_id) VALUES (?, ?)")
            .bind(name)
            .bind(category_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn delete_keyword(&self, keyword_id: i64) -> Result<(), StoreError> {
        let in_use: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM user_keywords WHERE keyword_id = ? LIMIT 1")
            .bind(keyword_id)
            .fetch_optional(&self.pool)
            .await?;
        if in_use.is_some() {
            return Err(StoreError::KeywordInUse);
        }
        let result = sqlx::query("DELETE FROM keywords WHERE id = ?")
            .bind(keyword_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::KeywordNotFound);
        }
        Ok(())
    }

    pub async fn add_user_keyword(&self, user: &IdentityKey, keyword_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_keywords (user_identity, keyword_id) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(user.as_str())
            .bind(keyword_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Categories in alphabetical order, each followed by its keywords
    /// alphabetically, then uncategorized keywords alphabetically.
    pub async fn interest_list(&self) -> Result<Vec<InterestEntry>, StoreError> {
        let categories: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM keyword_categories ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        let mut out = Vec::new();
        for (category_id, category_name) in categories {
            out.push(InterestEntry::Category {
                id: category_id,
                name: category_name,
            });
            let keywords: Vec<(i64, String)> =
                sqlx::query_as("SELECT id, name FROM keywords WHERE category_id = ? ORDER BY name ASC")
                    .bind(category_id)
                    .fetch_all(&self.pool)
                    .await?;
            out.extend(keywords.into_iter().map(|(id, name)| InterestEntry::Keyword {
                id,
                name,
                category_id: Some(category_id),
            }));
        }
        let uncategorized: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM keywords WHERE category_id IS NULL ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        out.extend(uncategorized.into_iter().map(|(id, name)| InterestEntry::Keyword {
            id,
            name,
            category_id: None,
        }));
        Ok(out)
    }
}
