//! OSC endpoint: outbound client, inbound listener and handler dispatch.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

use polymod_common::{ControlMessage, codec};

use crate::bus::{BusHandle, BusTransport, TransportCommand};
use crate::translator::{self, InboundRoute};

/// Largest datagram the listener accepts.
pub const MAX_DATAGRAM_SIZE: usize = 1536;

/// Destination for outbound messages.
///
/// Sending is fire-and-forget: failures are logged by the sink and never
/// reported to the caller.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &ControlMessage);
}

impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    fn send(&self, message: &ControlMessage) {
        (**self).send(message)
    }
}

/// UDP client sending OSC messages to the control panel.
pub struct OscClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscClient {
    /// Bind an ephemeral local socket for sending to `target`.
    pub async fn connect(target: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;

        info!(destination = %target, "Sending OSC messages");

        Ok(Self { socket, target })
    }
}

impl MessageSink for OscClient {
    fn send(&self, message: &ControlMessage) {
        let payload = match codec::encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%message, error = %e, "Failed to encode OSC message");
                return;
            }
        };

        match self.socket.try_send_to(&payload, self.target) {
            Ok(_) => debug!(%message, "Sent"),
            Err(e) => warn!(
                %message,
                destination = %self.target,
                error = %e,
                "Failed to send OSC message"
            ),
        }
    }
}

/// In-memory sink that keeps every message it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<ControlMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    pub fn messages(&self) -> Vec<ControlMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain the messages sent so far.
    pub fn take(&self) -> Vec<ControlMessage> {
        std::mem::take(
            &mut *self
                .messages
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, message: &ControlMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
    }
}

/// Routes inbound messages to their handlers.
pub struct Dispatcher<B, S> {
    bus: BusHandle<B>,
    sink: S,
}

impl<B: BusTransport, S: MessageSink> Dispatcher<B, S> {
    pub fn new(bus: BusHandle<B>, sink: S) -> Self {
        Self { bus, sink }
    }

    /// Handle one inbound message.
    pub fn dispatch(&self, message: &ControlMessage) {
        match translator::from_inbound(message) {
            Ok(InboundRoute::DigitalWrite(command)) => self.digital_output(&command),
            Ok(InboundRoute::Reset) => self.reset(),
            Ok(InboundRoute::Unhandled) => self.catch_all(message),
            Err(e) => warn!(error = %e, "Ignoring malformed message"),
        }
    }

    fn digital_output(&self, command: &TransportCommand) {
        debug!(
            module = command.address,
            payload = ?command.payload,
            "Digital output"
        );
        if let Err(e) = self.bus.execute(command) {
            warn!(error = %e, "Digital write failed");
        }
    }

    /// Forget the panel's matrix and have every module resend its state.
    ///
    /// Runs out of band; the poll loop keeps its current state.
    fn reset(&self) {
        info!("Reset requested");
        self.sink.send(&translator::matrix_reset());
        if let Err(e) = self.bus.execute(&TransportCommand::request_full_state()) {
            warn!(error = %e, "Full state request failed");
        }
    }

    fn catch_all(&self, message: &ControlMessage) {
        trace!(%message, "Unhandled message");
    }
}

/// UDP listener for control panel messages.
pub struct OscServer {
    socket: UdpSocket,
}

impl OscServer {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "OSC listener started");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive and dispatch messages until the task is aborted.
    pub async fn serve<B, S>(self, dispatcher: Dispatcher<B, S>)
    where
        B: BusTransport,
        S: MessageSink,
    {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer)) => match codec::decode(&buf[..len]) {
                    Ok(messages) => {
                        for message in &messages {
                            trace!(%peer, %message, "Received");
                            dispatcher.dispatch(message);
                        }
                    }
                    Err(e) => debug!(%peer, error = %e, "Dropping undecodable datagram"),
                },
                Err(e) => error!(error = %e, "OSC receive error"),
            }
        }
    }
}
