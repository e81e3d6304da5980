//! TCP accept loop and signon handshake: the piece of the connection
//! driver that actually owns a socket. Binds each configured BOS
//! listener, reads the FLAP signon frame, verifies
//! the auth cookie, registers the session, and then hands the
//! connection over to [`handle_incoming_snac`] for the rest of its life.
//!
//! `oscar-server`'s binary only builds the pieces this module asks for
//! (a store, a dispatcher, a cookie baker) and calls [`serve`] -- no
//! protocol logic lives in the bin crate.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::BosListener;
use crate::conn::{handle_incoming_snac, send_signoff, SignoffStyle, SnacDispatcher};
use crate::cookie::CookieBaker;
use crate::error::{AuthError, ConfigError, OscarError, SessionError};
use crate::identity::IdentityKey;
use crate::rate_limit::{RateClassTable, DEFAULT_CLASSES};
use crate::session::Session;
use crate::session_manager::SessionManager;
use crate::store::Store;
use crate::wire::{Endian, FlapClient, FrameType, Reader, SnacFrame, TlvFraming, TlvList};

const TLV_COOKIE: u16 = 0x0006;
const TLV_SCREEN_NAME: u16 = 0x0001;

/// Falls in for the out-of-scope per-food-group handler registry:
/// logs what it was asked to do and declines every SNAC with a generic
/// protocol error. A real deployment supplies its own [`SnacDispatcher`]
/// to [`serve`] instead.
pub struct NullDispatcher;

#[async_trait]
impl SnacDispatcher for NullDispatcher {
    async fn dispatch(&self, _session: &Session, frame: SnacFrame) -> Result<Option<SnacFrame>, OscarError> {
        log::debug!(
            "no handler registered for food group {:#06x} sub {:#06x}",
            frame.header.food_group,
            frame.header.sub_group
        );
        Ok(Some(SnacFrame::error_reply(
            frame.header.food_group,
            frame.header.request_id,
            0x0001, // generic "service unavailable"
            &TlvList::new(),
        )))
    }
}

/// What every accepted connection needs, shared across the listener's
/// accept loop via `Arc`.
pub struct ServerContext {
    pub session_manager: Arc<SessionManager>,
    pub rate_table: Arc<RateClassTable>,
    pub cookie_baker: Arc<CookieBaker>,
    pub dispatcher: Arc<dyn SnacDispatcher>,
    pub store: Arc<Store>,
    pub disable_auth: bool,
}

/// Binds every `bos_listeners` entry and serves connections until
/// `shutdown` is cancelled. A listener that fails to bind aborts the
/// whole call; a connection that errors only ends that connection.
pub async fn serve(
    bos_listeners: &[BosListener],
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
) -> Result<(), OscarError> {
    let mut join_set = tokio::task::JoinSet::new();
    for bos in bos_listeners {
        let bind_addr = tokio::net::lookup_host((bos.bind.host.as_str(), bos.bind.port))
            .await?
            .next()
            .ok_or_else(|| ConfigError::Malformed(format!("{}:{}", bos.bind.host, bos.bind.port)))?;
        let listener = TcpListener::bind(bind_addr).await?;
        log::info!("listening for scheme {:?} on {bind_addr}", bos.scheme);
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        join_set.spawn(async move { accept_loop(listener, ctx, shutdown).await });
    }

    tokio::select! {
        _ = shutdown.cancelled() => {
            join_set.abort_all();
            Ok(())
        }
        Some(result) = join_set.join_next() => {
            result.map_err(|err| OscarError::Io(std::io::Error::other(err)))
        }
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>, shutdown: CancellationToken) {
    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    continue;
                }
            },
            _ = shutdown.cancelled() => return,
        };
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, remote_addr, ctx).await {
                log::debug!("connection from {remote_addr} closed: {err}");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, ctx: Arc<ServerContext>) -> Result<(), OscarError> {
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();
    let client = FlapClient::new(read_half, write_half);

    let signon = client.receive_signon().await?;
    let mut r = Reader::new(&signon.payload, Endian::Big);
    // The signon payload opens with a u16 FLAP protocol version before
    // its TLV block (classic OSCAR signon shape).
    let _flap_version = r.read_u16()?;
    let tlvs = TlvList::decode(&mut r, TlvFraming::Rest)?;

    let identity = if ctx.disable_auth {
        let screen_name = tlvs.get_str(TLV_SCREEN_NAME).ok_or(AuthError::AuthRequired)?;
        IdentityKey::from_display(screen_name)
    } else {
        let cookie = tlvs.get_str(TLV_COOKIE).ok_or(AuthError::AuthRequired)?;
        ctx.cookie_baker.verify(cookie).map_err(|_| AuthError::InvalidCredentials)?.identity
    };

    let cancel = CancellationToken::new();
    let session = ctx
        .session_manager
        .add_session(identity.clone(), identity.as_str().to_string(), remote_addr, &DEFAULT_CLASSES, &cancel)
        .await?;
    session.mark_signon_complete();
    log::info!("{identity} signed on from {remote_addr}");

    client.send_signon(Bytes::new()).await?;

    let result = drive_session(&client, &session, &ctx.rate_table, ctx.dispatcher.as_ref()).await;
    ctx.session_manager.remove_session(&identity, &session);
    log::info!("{identity} signed off from {remote_addr}");
    result
}

async fn drive_session<R, W>(
    client: &FlapClient<R, W>,
    session: &Session,
    rate_table: &RateClassTable,
    dispatcher: &dyn SnacDispatcher,
) -> Result<(), OscarError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut stop_rx = session.subscribe_stop();
    loop {
        let frame = tokio::select! {
            frame = client.receive_any() => frame?,
            _ = stop_rx.changed() => {
                send_signoff(client, SignoffStyle::MultiConnection, None).await.ok();
                return Ok(());
            }
        };
        match frame.frame_type {
            FrameType::Data => {
                let snac = SnacFrame::decode(&frame.payload)?;
                match handle_incoming_snac(session, rate_table, dispatcher, snac).await {
                    Ok(Some(reply)) => {
                        client.send_data(reply.encode()).await?;
                    }
                    Ok(None) => {}
                    Err(OscarError::Session(SessionError::RateDisconnect)) => {
                        send_signoff(client, SignoffStyle::MultiConnection, Some(0x0001)).await.ok();
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
            }
            FrameType::KeepAlive => {}
            FrameType::Signoff => return Ok(()),
            other => log::debug!("unexpected FLAP frame type {other:?} mid-session"),
        }
    }
}
