//! Error taxonomy. Each subsystem gets its own `thiserror` enum;
//! [`OscarError`] composes them for callers that cross subsystem
//! boundaries (principally the connection driver).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated frame: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("bad FLAP start marker: {0:#x}")]
    BadStartMarker(u8),
    #[error("nullterm string missing terminator")]
    NotNullTerminated,
    #[error("cannot marshal a nil payload")]
    NilPayload,
    #[error("len_prefix and count_prefix both specified for the same field")]
    ContradictoryAnnotations,
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("value {0} does not fit in the target prefix width")]
    PrefixOverflow(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("listener entry is missing a {0}")]
    MissingField(&'static str),
    #[error("scheme {0:?} repeated for the same role")]
    DuplicateScheme(String),
    #[error("no BOS listener configured")]
    NoBosListener,
    #[error("malformed listener entry: {0:?}")]
    Malformed(String),
    #[error("blank API listener")]
    BlankApiListener,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a concurrent AddSession beat this one after eviction")]
    SessionConflict,
    #[error("operation cancelled")]
    Cancelled,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("outbound channel is closed")]
    SendClosed,
    #[error("rate average crossed the disconnect threshold")]
    RateDisconnect,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such user")]
    NoSuchUser,
    #[error("no such api key")]
    NoSuchKey,
    #[error("no such token")]
    NoSuchToken,
    #[error("token expired")]
    TokenExpired,
    #[error("BART item already exists")]
    BartItemExists,
    #[error("BART item not found")]
    BartItemNotFound,
    #[error("offline message inbox is full")]
    InboxFull,
    #[error("category already exists")]
    CategoryExists,
    #[error("category not found")]
    CategoryNotFound,
    #[error("keyword already exists")]
    KeywordExists,
    #[error("keyword not found")]
    KeywordNotFound,
    #[error("keyword is referenced by a user")]
    KeywordInUse,
    #[error("category is in use")]
    CategoryInUse,
    #[error("too many categories")]
    TooManyCategories,
    #[error("too many keywords")]
    TooManyKeywords,
    #[error("numeric display name requires the ICQ flag")]
    UinWithoutIcqFlag,
    #[error("stored row failed to decode: {0}")]
    Malformed(#[from] WireError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("UIN {0} is out of range [10000, 2147483646]")]
    UinOutOfRange(i64),
    #[error("AIM handle must be 3-16 non-space characters")]
    AimHandleLength,
    #[error("AIM handle has an invalid format")]
    AimHandleInvalidFormat,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is suspended")]
    AccountSuspended,
}

/// Top-level error composing every subsystem kind, for callers at the
/// connection-driver boundary that need one `?`-friendly type.
#[derive(Debug, Error)]
pub enum OscarError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
