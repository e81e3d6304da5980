//! Persistent store: feedbag CRUD, user accounts, profiles, BART
//! icons, the offline-message inbox, the keyword/category directory, web
//! API tokens, and the BOS bridge table.
//!
//! One pool type (`Store`) with per-concern `impl` blocks split across
//! the files in this module, backed by SQLite through `sqlx`.

mod bart;
mod bridge;
mod buddylist;
mod feedbag;
mod keyword;
mod offline;
mod profile;
mod token;
mod user;

pub use bart::BartItem;
pub use bridge::BridgeRecord;
pub use feedbag::{FeedbagItem, FeedbagClass};
pub use keyword::{InterestEntry, InterestRow};
pub use offline::OfflineMessage;
pub use profile::Profile;
pub use token::ApiToken;
pub use user::{IcqSearchCriteria, NewUser, User};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::StoreError;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `path` and runs
    /// embedded migrations, idempotently.
    pub async fn open(path: &str) -> Result<Store, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Store { pool })
    }

    /// An in-memory database for tests: same schema, nothing touches disk.
    pub async fn open_in_memory() -> Result<Store, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Store { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
