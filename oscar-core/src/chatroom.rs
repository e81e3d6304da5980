//! Chat room identity and URL formatting.
//!
//! Plain-struct, no-builder style, matching the rest of this crate's
//! external-surface types.

use crate::identity::IdentityKey;

#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub name: String,
    pub creator: IdentityKey,
    pub exchange: u16,
    pub instance: u16,
    pub create_time: chrono::DateTime<chrono::Utc>,
}

impl ChatRoom {
    pub fn new(
        name: String,
        creator: IdentityKey,
        exchange: u16,
        create_time: chrono::DateTime<chrono::Utc>,
    ) -> ChatRoom {
        ChatRoom {
            name,
            creator,
            exchange,
            instance: 0,
            create_time,
        }
    }

    /// `"{exchange}-{instance}-{name}"`.
    pub fn cookie(&self) -> String {
        format!("{}-{}-{}", self.exchange, self.instance, self.name)
    }

    /// `aim:gochat?roomname={urlEncode(name)}&exchange={exchange}` with
    /// the parameter order fixed -- one observed macOS client breaks on
    /// alphabetical reordering.
    pub fn join_url(&self) -> String {
        let encoded_name: String = url::form_urlencoded::byte_serialize(self.name.as_bytes()).collect();
        format!("aim:gochat?roomname={}&exchange={}", encoded_name, self.exchange)
    }
}
