//! Connection driver: the per-frame contract that ties rate admission
//! and the per-food-group dispatcher together. Reads a SNAC, gates it
//! through the rate limiter, hands admitted frames to the injected
//! [`SnacDispatcher`], and writes back whatever reply it returns.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{OscarError, SessionError};
use crate::rate_limit::{RateClassId, RateClassTable};
use crate::session::Session;
use crate::wire::{FlapClient, SnacFrame, TlvFraming, TlvList};

/// The out-of-scope per-food-group dispatcher. The driver owns framing, rate
/// admission, and signoff; everything about what a given SNAC *means* is
/// this trait's business.
#[async_trait]
pub trait SnacDispatcher: Send + Sync {
    async fn dispatch(&self, session: &Session, frame: SnacFrame) -> Result<Option<SnacFrame>, OscarError>;
}

/// Drains one incoming SNAC through the rate limiter and, if admitted,
/// the dispatcher. Returns `Ok(None)` for frames that were rate-rejected
/// but didn't cross the disconnect threshold (a protocol-error SNAC may
/// still be worth sending from the caller's perspective; this function
/// only decides admission).
pub async fn handle_incoming_snac(
    session: &Session,
    rate_table: &RateClassTable,
    dispatcher: &dyn SnacDispatcher,
    frame: SnacFrame,
) -> Result<Option<SnacFrame>, OscarError> {
    let class = rate_table.lookup(frame.header.food_group, frame.header.sub_group);
    if let Some(class) = class {
        let admission = session.rate_admit(class, Instant::now());
        if let Some(admission) = admission {
            if admission.status == crate::rate_limit::RateStatus::Disconnect {
                return Err(SessionError::RateDisconnect.into());
            }
            if !admission.allowed {
                return Ok(Some(SnacFrame::error_reply(
                    frame.header.food_group,
                    frame.header.request_id,
                    0x000a, // "rate limit exceeded"
                    &TlvList::new(),
                )));
            }
        }
    }
    dispatcher.dispatch(session, frame).await
}

/// Whether a disconnecting client should get the legacy 6-byte
/// disconnect variant or a full signoff frame with a TLV reason.
/// Multi-connection-capable clients announce themselves during signon;
/// the driver remembers which kind it's talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignoffStyle {
    Legacy,
    MultiConnection,
}

/// Closes a connection the way a disconnecting client expects: legacy
/// clients get the bare disconnect frame so they show "connection
/// lost"; multi-connection clients get a signoff frame carrying an
/// error-code TLV so they can display a reason.
pub async fn send_signoff<R, W>(
    client: &FlapClient<R, W>,
    style: SignoffStyle,
    error_code: Option<u16>,
) -> Result<(), crate::error::WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match style {
        SignoffStyle::Legacy => client.send_old_signoff().await,
        SignoffStyle::MultiConnection => {
            let mut reason = TlvList::new();
            if let Some(code) = error_code {
                reason.append(crate::wire::Tlv::from_u16(0x0008, code));
            }
            client.send_new_signoff(reason).await
        }
    }
}
