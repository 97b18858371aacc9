//! The lazily-opened device connection (spec.md §4.4, §5).
//!
//! `DeviceClient::connect` is a no-op once connected; a caller never has to
//! reason about connection state before issuing an operation. Idle periods
//! arm a short disconnect timer (`IdleTimer`), matching the teacher's
//! repeating heartbeat-task idiom adapted to a one-shot, cancellable timer.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tkey_proto::command::NameVersionResponse;
use tkey_proto::frame::{Endpoint, Frame, FrameHeader, FrameLen};

/// Time the device link is allowed to sit unused before `IdleTimer` closes
/// it (spec.md §5).
pub const IDLE_DISCONNECT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("firmware never loaded the app (identity probe never matched)")]
    FirmwareNotLoaded,
    #[error("no serial port configured and none could be located")]
    NoPort,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] tkey_proto::frame::FrameError),
    #[error(transparent)]
    Payload(#[from] tkey_proto::command::PayloadError),
    #[error("device responded with an unexpected frame")]
    UnexpectedResponse,
}

/// Finds the serial device path to open when none is configured. Real
/// enumeration/OS notification UI is out of scope (spec.md §1) — this
/// crate only needs "open the one path we were given or discovered."
pub trait PortLocator: Send + Sync {
    fn locate(&self) -> Option<String>;
}

/// A no-op locator: returns no ports. Callers that always configure an
/// explicit path never invoke this.
pub struct NoPortLocator;
impl PortLocator for NoPortLocator {
    fn locate(&self) -> Option<String> {
        None
    }
}

/// Uploads the device application image to the TKey. Firmware loading
/// itself is out of scope (spec.md §1); this trait is the seam a caller
/// plugs a real loader into, and `connect()` treats it as an external
/// collaborator it waits on before the identity probe.
pub trait FirmwareLoader: Send + Sync {
    fn load(&self, port_path: &str) -> std::io::Result<()>;
}

/// A loader that does nothing, for the common case where firmware is
/// already resident (e.g. a development build talking to `tkey-device`'s
/// simulator binary over a pipe).
pub struct NoopFirmwareLoader;
impl FirmwareLoader for NoopFirmwareLoader {
    fn load(&self, _port_path: &str) -> std::io::Result<()> {
        Ok(())
    }
}

enum Transport {
    Disconnected,
    Connected(Box<dyn AsyncReadWrite>),
}

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

pub struct ClientState {
    transport: Transport,
    idle_timer: Option<JoinHandle<()>>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self { transport: Transport::Disconnected, idle_timer: None }
    }
}

/// Arms a one-shot disconnect after `IDLE_DISCONNECT`. Any subsequent
/// operation calls `cancel()`, aborting the pending timer — the teacher's
/// `spawn_heartbeat_loop` idiom, adapted from "repeat forever" to "fire
/// once unless cancelled".
pub struct IdleTimer;

impl IdleTimer {
    pub fn arm(state: Arc<Mutex<ClientState>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(IDLE_DISCONNECT).await;
            let mut guard = state.lock().await;
            guard.transport = Transport::Disconnected;
            guard.idle_timer = None;
            tracing::debug!("device link idle, disconnected");
        })
    }

    pub fn cancel(state: &mut ClientState) {
        if let Some(handle) = state.idle_timer.take() {
            handle.abort();
        }
    }
}

/// The host-side handle to a TKey device running the U2F app.
pub struct DeviceClient<P: PortLocator, F: FirmwareLoader> {
    port_path: Option<String>,
    locator: P,
    loader: F,
    state: Arc<Mutex<ClientState>>,
    open: Box<dyn Fn(&str) -> std::io::Result<Box<dyn AsyncReadWrite>> + Send + Sync>,
}

impl<P: PortLocator, F: FirmwareLoader> DeviceClient<P, F> {
    pub fn new(
        port_path: Option<String>,
        locator: P,
        loader: F,
        open: impl Fn(&str) -> std::io::Result<Box<dyn AsyncReadWrite>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            port_path,
            locator,
            loader,
            state: Arc::new(Mutex::new(ClientState::default())),
            open: Box::new(open),
        }
    }

    /// Opens the connection if not already open, loads firmware if needed,
    /// and verifies the app's identity. A no-op if already connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut guard = self.state.lock().await;
        if matches!(guard.transport, Transport::Connected(_)) {
            IdleTimer::cancel(&mut guard);
            return Ok(());
        }

        let path = self
            .port_path
            .clone()
            .or_else(|| self.locator.locate())
            .ok_or(ClientError::NoPort)?;

        self.loader.load(&path)?;
        let mut transport = (self.open)(&path)?;

        let probe = probe_identity(&mut transport).await?;
        if !probe.is_identity() {
            return Err(ClientError::FirmwareNotLoaded);
        }

        guard.transport = Transport::Connected(transport);
        Ok(())
    }

    /// Marks the link idle; a background timer closes it after
    /// `IDLE_DISCONNECT` unless another operation cancels it first.
    pub async fn disconnect_after_idle(&self) {
        let mut guard = self.state.lock().await;
        IdleTimer::cancel(&mut guard);
        let handle = IdleTimer::arm(Arc::clone(&self.state));
        guard.idle_timer = Some(handle);
    }

    /// Writes `request` and reads back `expected_frames` response frames.
    /// Connects first if necessary; cancels the idle timer for the
    /// duration of the exchange. Used by `ops` so the wire-level framing
    /// lives in one place.
    pub async fn transact(&self, request: &Frame, expected_frames: usize) -> Result<Vec<Frame>, ClientError> {
        self.connect().await?;
        let mut guard = self.state.lock().await;
        IdleTimer::cancel(&mut guard);
        let transport = match &mut guard.transport {
            Transport::Connected(t) => t,
            Transport::Disconnected => return Err(ClientError::UnexpectedResponse),
        };

        transport.write_all(&request.to_bytes()).await?;

        let mut responses = Vec::with_capacity(expected_frames);
        for _ in 0..expected_frames {
            let mut header_byte = [0u8; 1];
            transport.read_exact(&mut header_byte).await?;
            let header = FrameHeader::decode(header_byte[0])?;
            let mut payload = vec![0u8; header.len.bytes()];
            transport.read_exact(&mut payload).await?;
            responses.push(Frame::new(header, payload)?);
        }
        Ok(responses)
    }
}

async fn probe_identity(transport: &mut Box<dyn AsyncReadWrite>) -> Result<NameVersionResponse, ClientError> {
    let header = FrameHeader::new(0, Endpoint::Firmware, FrameLen::Len1);
    let req = Frame::new(header, vec![tkey_proto::command::CommandCode::GetNameVersion as u8])?;
    transport.write_all(&req.to_bytes()).await?;

    let mut header_byte = [0u8; 1];
    transport.read_exact(&mut header_byte).await?;
    let resp_header = FrameHeader::decode(header_byte[0])?;
    let mut payload = vec![0u8; resp_header.len.bytes()];
    transport.read_exact(&mut payload).await?;
    Ok(NameVersionResponse::from_bytes(&payload)?)
}
