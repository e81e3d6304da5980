//! Core wire codec, session registry, relationship/privacy engine, and
//! persistent store for an OSCAR (AIM/ICQ) server.

pub mod chatroom;
pub mod config;
pub mod conn;
pub mod cookie;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod relationship;
pub mod server;
pub mod session;
pub mod session_manager;
pub mod store;
pub mod wire;

pub use chatroom::ChatRoom;
pub use config::{BosListener, HostPort, ListenersCfg, RawListenersCfg, parse_listeners_cfg};
pub use conn::{SignoffStyle, SnacDispatcher, handle_incoming_snac, send_signoff};
pub use cookie::{CookieBaker, CookieClaims, CookieError};
pub use error::{AuthError, ConfigError, IdentityError, OscarError, SessionError, StoreError, WireError};
pub use identity::{DisplayName, IdentityKey};
pub use rate_limit::{Admission, RateClassConfig, RateClassId, RateClassTable, RateLimiter, RateStatus};
pub use relationship::{PrivacyMode, Relationship, RelationshipDataSource, RelationshipSource, UserRelationshipData};
pub use server::{serve, NullDispatcher, ServerContext};
pub use session::{EnqueueOutcome, OutboundMessage, Session, SessionInner, UserInfo};
pub use session_manager::SessionManager;
pub use store::Store;
