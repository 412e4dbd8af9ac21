//! Request/response client over a ZNP link

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::af::{self, AfRegister, DataRequest};
use crate::dispatch::ZnpDispatcher;
use crate::error::{Result, TransportError};
use crate::frame::{CommandType, FrameDecoder, Subsystem, ZnpFrame};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Default time to wait for an SRSP
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// SYS_PING (SREQ)
pub const SYS_PING: u8 = 0x01;

/// ZDO_STARTUP_FROM_APP (SREQ)
pub const ZDO_STARTUP_FROM_APP: u8 = 0x40;

/// Sends frames to the coordinator and awaits its answers
#[derive(Clone)]
pub struct ZnpClient {
    sender: Arc<dyn TransportSender>,
    dispatcher: Arc<ZnpDispatcher>,
    timeout: Duration,
}

impl ZnpClient {
    pub fn new(sender: Arc<dyn TransportSender>) -> Self {
        Self {
            sender,
            dispatcher: Arc::new(ZnpDispatcher::default()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> Arc<ZnpDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Every frame read from the link
    pub fn subscribe(&self) -> broadcast::Receiver<ZnpFrame> {
        self.dispatcher.subscribe()
    }

    /// Write one frame without waiting for anything
    pub async fn send(&self, frame: &ZnpFrame) -> Result<()> {
        if !self.sender.is_connected() {
            return Err(TransportError::NotConnected);
        }
        debug!("-> {}", frame);
        self.sender.send(frame.encode()?).await
    }

    /// Send an SREQ and return the SRSP payload
    pub async fn request(
        &self,
        subsystem: Subsystem,
        command: u8,
        payload: impl Into<Bytes>,
    ) -> Result<Bytes> {
        let frame = ZnpFrame::new(CommandType::Sreq, subsystem, command, payload);
        // registered first so a fast reply cannot slip past
        let reply = self.dispatcher.register(CommandType::Srsp, subsystem, command);
        self.send(&frame).await?;

        let frame = match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(TransportError::ConnectionClosed),
            Err(_) => {
                warn!("Timed out waiting for SRSP {:?} 0x{:02x}", subsystem, command);
                return Err(TransportError::Timeout);
            }
        };

        if frame.subsystem == Subsystem::RpcError {
            let code = frame.payload.first().copied().unwrap_or_default();
            return Err(TransportError::Protocol(format!(
                "RPC error 0x{:02x} for {:?} 0x{:02x}",
                code, subsystem, command
            )));
        }
        Ok(frame.payload)
    }

    /// Await the next asynchronous frame with the given key
    pub async fn wait_for(
        &self,
        kind: CommandType,
        subsystem: Subsystem,
        command: u8,
    ) -> Result<ZnpFrame> {
        let reply = self.dispatcher.register(kind, subsystem, command);
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Check the link; returns the coordinator's capability bits
    pub async fn ping(&self) -> Result<u16> {
        let reply = self.request(Subsystem::Sys, SYS_PING, Bytes::new()).await?;
        match reply[..] {
            [lo, hi, ..] => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(TransportError::Protocol("SYS_PING reply too short".into())),
        }
    }

    /// Start the network stack
    ///
    /// Returns 0 when an existing network was restored, 1 for a new network
    /// and 2 when the stack did not start.
    pub async fn startup_from_app(&self, start_delay_ms: u16) -> Result<u8> {
        let reply = self
            .request(
                Subsystem::Zdo,
                ZDO_STARTUP_FROM_APP,
                Bytes::copy_from_slice(&start_delay_ms.to_le_bytes()),
            )
            .await?;
        reply
            .first()
            .copied()
            .ok_or_else(|| TransportError::Protocol("ZDO_STARTUP_FROM_APP reply empty".into()))
    }

    /// Register an application endpoint; an existing registration is fine
    pub async fn af_register(&self, register: &AfRegister) -> Result<()> {
        let reply = self
            .request(Subsystem::Af, af::AF_REGISTER, register.encode()?)
            .await?;
        if reply.first() == Some(&af::STATUS_DUPLICATE_ENTRY) {
            debug!("Endpoint {} already registered", register.endpoint);
            return Ok(());
        }
        af::check_status(&reply, "AF_REGISTER")
    }

    /// Send an AF data request and check its status
    pub async fn af_data_request(&self, request: &DataRequest) -> Result<()> {
        let reply = self
            .request(Subsystem::Af, af::AF_DATA_REQUEST, request.encode()?)
            .await?;
        af::check_status(&reply, "AF_DATA_REQUEST")
    }

    /// Resolve a short network address to the device's IEEE address
    pub async fn nwk_addr_lookup(&self, nwk_addr: u16) -> Result<u64> {
        let reply = self
            .request(
                Subsystem::Util,
                af::UTIL_ADDRMGR_NWK_ADDR_LOOKUP,
                Bytes::copy_from_slice(&nwk_addr.to_le_bytes()),
            )
            .await?;
        af::decode_ieee(&reply)
    }

    /// Feed the link into the dispatcher until it closes
    pub async fn run_reader<R: TransportReceiver>(&self, receiver: R) {
        run_reader(&self.dispatcher, receiver).await
    }

    pub async fn close(&self) -> Result<()> {
        self.sender.close().await
    }
}

/// Decode frames from `receiver` and hand them to `dispatcher`
///
/// Corrupt frames are logged and skipped. Returns when the link closes.
pub async fn run_reader<R: TransportReceiver>(dispatcher: &ZnpDispatcher, mut receiver: R) {
    let mut decoder = FrameDecoder::new();
    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Data(data) => {
                decoder.push(&data);
                while let Some(result) = decoder.next_frame() {
                    match result {
                        Ok(frame) => {
                            debug!("<- {}", frame);
                            dispatcher.dispatch(frame);
                        }
                        Err(e) => warn!("Dropping bad frame: {}", e),
                    }
                }
            }
            TransportEvent::Disconnected { reason } => {
                info!("Link closed: {:?}", reason);
                break;
            }
            TransportEvent::Error(e) => warn!("Link error: {}", e),
        }
    }
    dispatcher.cancel_all();
}
