//! Per-connection session state.
//!
//! Field reads/mutations go through a `parking_lot::RwLock`-guarded inner
//! struct. Every access -- including from relay callers on other
//! sessions, not just the owning connection -- goes through the lock.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use hashbrown::HashMap as HbHashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::SessionError;
use crate::identity::{DisplayName, IdentityKey};
use crate::rate_limit::{RateClassConfig, RateClassId, RateLimiter};

pub const OUTBOUND_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub user_info_bitmask: u32,
    pub user_status_bitmask: u32,
    pub typing_events: bool,
    pub kerberos_auth: bool,
}

/// Mutable session fields behind the single read-write lock.
pub struct SessionInner {
    pub display_name: DisplayName,
    pub idle_since: Option<Instant>,
    pub warning_level: u16,
    pub away_message: Option<String>,
    pub buddy_icon_md5: Option<Vec<u8>>,
    pub capabilities: Vec<Uuid>,
    pub food_group_versions: HbHashMap<u16, u16>,
    pub user_info: UserInfo,
    pub offline_message_count: u32,
    pub profile: Option<String>,
    pub signon_complete: bool,
}

/// An outbound message queued for delivery to a session.
#[derive(Debug, Clone)]
pub struct OutboundMessage(pub Bytes);

/// The outcome of enqueueing a relay message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Delivered,
    QueueFull,
    SendClosed,
}

pub struct Session {
    pub identity: IdentityKey,
    pub remote_addr: SocketAddr,
    pub signon_time: Instant,
    pub member_since: Option<chrono::DateTime<chrono::Utc>>,
    inner: RwLock<SessionInner>,
    rate_limiter: RwLock<RateLimiter>,
    warning_tx: watch::Sender<u16>,
    warning_rx: watch::Receiver<u16>,
    outbound_tx: flume::Sender<OutboundMessage>,
    outbound_rx: flume::Receiver<OutboundMessage>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Session {
    pub fn new(
        identity: IdentityKey,
        display_name: DisplayName,
        remote_addr: SocketAddr,
        rate_classes: &[RateClassConfig],
    ) -> Session {
        let now = Instant::now();
        let (warning_tx, warning_rx) = watch::channel(0);
        let (outbound_tx, outbound_rx) = flume::bounded(OUTBOUND_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        Session {
            identity,
            remote_addr,
            signon_time: now,
            member_since: None,
            inner: RwLock::new(SessionInner {
                display_name,
                idle_since: None,
                warning_level: 0,
                away_message: None,
                buddy_icon_md5: None,
                capabilities: Vec::new(),
                food_group_versions: HbHashMap::new(),
                user_info: UserInfo::default(),
                offline_message_count: 0,
                profile: None,
                signon_complete: false,
            }),
            rate_limiter: RwLock::new(RateLimiter::new(rate_classes, now)),
            warning_tx,
            warning_rx,
            outbound_tx,
            outbound_rx,
            stop_tx,
            stop_rx,
        }
    }

    // -- reads --

    pub fn display_name(&self) -> DisplayName {
        self.inner.read().display_name.clone()
    }

    pub fn signon_complete(&self) -> bool {
        self.inner.read().signon_complete
    }

    pub fn warning_level(&self) -> u16 {
        self.inner.read().warning_level
    }

    pub fn capabilities(&self) -> Vec<Uuid> {
        self.inner.read().capabilities.clone()
    }

    pub fn food_group_version(&self, food_group: u16) -> Option<u16> {
        self.inner.read().food_group_versions.get(&food_group).copied()
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.inner.read().idle_since
    }

    /// A coalescing single-slot receiver: subscribing code observes only
    /// the most recently sent warning level.
    pub fn subscribe_warnings(&self) -> watch::Receiver<u16> {
        self.warning_rx.clone()
    }

    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    // -- mutations --

    pub fn mark_signon_complete(&self) {
        self.inner.write().signon_complete = true;
    }

    pub fn set_display_name(&self, name: DisplayName) {
        self.inner.write().display_name = name;
    }

    pub fn set_food_group_version(&self, food_group: u16, version: u16) {
        self.inner.write().food_group_versions.insert(food_group, version);
    }

    pub fn set_capabilities(&self, caps: Vec<Uuid>) {
        self.inner.write().capabilities = caps;
    }

    pub fn set_away_message(&self, message: Option<String>) {
        self.inner.write().away_message = message;
    }

    pub fn touch_idle(&self, now: Instant) {
        self.inner.write().idle_since = Some(now);
    }

    pub fn clear_idle(&self) {
        self.inner.write().idle_since = None;
    }

    /// Raises the warning level, coalescing with any unread prior value
    /// (the receiver only ever observes the latest send).
    pub fn raise_warning(&self, new_level: u16) {
        self.inner.write().warning_level = new_level;
        // watch::Sender::send fails only when every receiver was dropped,
        // which just means nobody is listening -- not a session error.
        let _ = self.warning_tx.send(new_level);
    }

    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    // -- rate limiter --

    pub fn rate_admit(&self, class: RateClassId, now: Instant) -> Option<crate::rate_limit::Admission> {
        self.rate_limiter.write().admit(class, now)
    }

    pub fn rate_set_subscribed(&self, class: RateClassId, subscribed: bool) {
        self.rate_limiter.write().set_subscribed(class, subscribed);
    }

    pub fn rate_reconfigure(&self, configs: &[RateClassConfig], now: Instant) {
        self.rate_limiter.write().set_rate_classes(configs, now);
    }

    // -- outbound queue --

    /// Non-blocking enqueue: producers never block. Returns
    /// `QueueFull` rather than awaiting room, leaving eviction policy to
    /// the session manager.
    pub fn try_enqueue(&self, msg: OutboundMessage) -> EnqueueOutcome {
        match self.outbound_tx.try_send(msg) {
            Ok(()) => EnqueueOutcome::Delivered,
            Err(flume::TrySendError::Full(_)) => EnqueueOutcome::QueueFull,
            Err(flume::TrySendError::Disconnected(_)) => EnqueueOutcome::SendClosed,
        }
    }

    pub async fn next_outbound(&self) -> Result<OutboundMessage, SessionError> {
        self.outbound_rx
            .recv_async()
            .await
            .map_err(|_| SessionError::SendClosed)
    }

    pub fn try_next_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::DEFAULT_CLASSES;
    use std::net::{IpAddr, Ipv4Addr};

    fn make_session() -> Session {
        Session::new(
            IdentityKey::from_display("tester"),
            "tester".to_string(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190),
            &DEFAULT_CLASSES,
        )
    }

    #[test]
    fn signon_complete_starts_false() {
        let session = make_session();
        assert!(!session.signon_complete());
        session.mark_signon_complete();
        assert!(session.signon_complete());
    }

    #[test]
    fn outbound_queue_reports_full_without_blocking() {
        let session = make_session();
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            assert_eq!(
                session.try_enqueue(OutboundMessage(Bytes::new())),
                EnqueueOutcome::Delivered
            );
        }
        assert_eq!(
            session.try_enqueue(OutboundMessage(Bytes::new())),
            EnqueueOutcome::QueueFull
        );
    }

    #[test]
    fn warning_channel_coalesces() {
        let session = make_session();
        let mut rx = session.subscribe_warnings();
        session.raise_warning(10);
        session.raise_warning(20);
        session.raise_warning(30);
        // only the latest value is observed, never a queue of all three
        assert_eq!(*rx.borrow_and_update(), 30);
        assert_eq!(session.warning_level(), 30);
    }
}
