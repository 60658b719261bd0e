//! Feedback channel — duplex OSC/UDP link to the scoring backend.
//!
//! Outbound: captured frames (and a session hello/end envelope). Inbound:
//! per-frame judgments and mid-song difficulty decisions, forwarded from a
//! background listener thread over mpsc and drained by the session
//! controller each step.
//!
//! UDP is connectionless, so "connected" is defined by an application
//! handshake: `/session/hello` is retried while Connecting until the
//! backend answers `/session/ready`. After that first ack, transport
//! errors only degrade the state back to Connecting; the session carries
//! on and sends stay best-effort. Never receiving the ack is the one
//! fatal condition, surfaced to the controller through
//! [`FeedbackChannel::never_connected_for`].

pub mod config;
pub mod listener;

use std::io;
use std::net::UdpSocket;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rosc::{encoder, OscMessage, OscPacket, OscType};

use crate::chart::DifficultyLevel;

pub use config::NetConfig;
pub use listener::FeedbackListener;

/// OSC address of the handshake request.
pub const ADDR_HELLO: &str = "/session/hello";
/// OSC address of the handshake ack.
pub const ADDR_READY: &str = "/session/ready";
/// OSC address of outbound frames.
pub const ADDR_FRAME: &str = "/frame";
/// OSC address of the end-of-session envelope.
pub const ADDR_END: &str = "/session/end";
/// OSC address of inbound judgments.
pub const ADDR_FEEDBACK: &str = "/feedback";
/// OSC address of inbound difficulty decisions.
pub const ADDR_LEVEL: &str = "/level";

/// Movement judgment for one scored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Soso,
    Good,
    Perfect,
}

impl Judgment {
    /// Map a wire-level number (1..=3) to a judgment.
    pub fn from_number(n: i32) -> Option<Self> {
        match n {
            1 => Some(Judgment::Soso),
            2 => Some(Judgment::Good),
            3 => Some(Judgment::Perfect),
            _ => None,
        }
    }

    /// Wire-level number (1..=3).
    pub fn number(&self) -> i32 {
        match self {
            Judgment::Soso => 1,
            Judgment::Good => 2,
            Judgment::Perfect => 3,
        }
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Judgment::Soso => "soso",
            Judgment::Good => "good",
            Judgment::Perfect => "perfect",
        };
        f.write_str(name)
    }
}

/// One judgment delivered by the backend, stamped with the audio time of
/// the frame it scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgmentEvent {
    pub grade: Judgment,
    pub timestamp: f64,
}

/// A difficulty change for the remainder of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDecision {
    pub next_level: DifficultyLevel,
}

/// Messages arriving from the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage {
    /// Handshake ack.
    Ready,
    Feedback(JudgmentEvent),
    Level(LevelDecision),
}

/// Sender half — cloned into the listener thread.
pub type InboundSender = mpsc::Sender<InboundMessage>;

/// Receiver half — drained by the session controller.
pub struct InboundReceiver {
    rx: mpsc::Receiver<InboundMessage>,
}

impl InboundReceiver {
    /// Non-blocking poll for the next message.
    pub fn poll(&self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Create a new inbound channel pair.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel();
    (tx, InboundReceiver { rx })
}

fn arg_i32(args: &[OscType], idx: usize) -> Option<i32> {
    match args.get(idx)? {
        OscType::Int(v) => Some(*v),
        OscType::Long(v) => i32::try_from(*v).ok(),
        _ => None,
    }
}

fn arg_f64(args: &[OscType], idx: usize) -> Option<f64> {
    match args.get(idx)? {
        OscType::Double(v) => Some(*v),
        OscType::Float(v) => Some(*v as f64),
        OscType::Int(v) => Some(*v as f64),
        _ => None,
    }
}

/// Decode one OSC message into an inbound message. Unknown addresses and
/// malformed arguments yield None.
pub fn decode_message(msg: &OscMessage) -> Option<InboundMessage> {
    match msg.addr.as_str() {
        ADDR_READY => Some(InboundMessage::Ready),
        ADDR_FEEDBACK => {
            let grade = Judgment::from_number(arg_i32(&msg.args, 0)?)?;
            let timestamp = arg_f64(&msg.args, 1)?;
            Some(InboundMessage::Feedback(JudgmentEvent { grade, timestamp }))
        }
        ADDR_LEVEL => {
            let next_level = DifficultyLevel::from_number(arg_i32(&msg.args, 0)?)?;
            Some(InboundMessage::Level(LevelDecision { next_level }))
        }
        _ => None,
    }
}

/// Connectivity of the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// The duplex feedback link. Owned by the session controller.
pub struct FeedbackChannel {
    config: NetConfig,
    state: ChannelState,
    socket: Option<UdpSocket>,
    listener: Option<FeedbackListener>,
    inbound: Option<InboundReceiver>,
    session_id: String,
    connect_started: Option<Instant>,
    last_hello: Option<Instant>,
    ever_connected: bool,
    frames_sent: u64,
}

impl FeedbackChannel {
    /// New channel in the Disconnected state.
    pub fn new(config: NetConfig) -> Self {
        Self {
            config,
            state: ChannelState::Disconnected,
            socket: None,
            listener: None,
            inbound: None,
            session_id: String::new(),
            connect_started: None,
            last_hello: None,
            ever_connected: false,
            frames_sent: 0,
        }
    }

    /// Current connectivity.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// Frames successfully handed to the socket so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// How long the channel has been waiting for its first ack, or None
    /// once connected (or before connect). The controller compares this
    /// against its connect timeout to decide abandonment.
    pub fn never_connected_for(&self, now: Instant) -> Option<Duration> {
        if self.ever_connected {
            return None;
        }
        self.connect_started
            .map(|started| now.saturating_duration_since(started))
    }

    /// Open the sockets, start the listener thread, and begin the
    /// handshake. Bind failures are fatal for the session.
    pub fn connect(&mut self, session_id: &str, now: Instant) -> io::Result<()> {
        let (tx, rx) = inbound_channel();
        let listener = FeedbackListener::start(&self.config, tx)?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;

        self.session_id = session_id.to_string();
        self.listener = Some(listener);
        self.inbound = Some(rx);
        self.socket = Some(socket);
        self.state = ChannelState::Connecting;
        self.connect_started = Some(now);
        self.send_hello(now);
        log::info!(
            "feedback channel connecting to {} (listening on {})",
            self.config.backend_addr(),
            self.config.listen_port
        );
        Ok(())
    }

    /// Drain inbound messages, consuming handshake acks and retrying the
    /// hello while still Connecting. Judgments and level decisions pass
    /// through to the caller.
    pub fn poll(&mut self, now: Instant) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        if let Some(inbound) = &self.inbound {
            for msg in inbound.drain() {
                match msg {
                    InboundMessage::Ready => {
                        if self.state != ChannelState::Connected {
                            log::info!("feedback channel connected");
                        }
                        self.state = ChannelState::Connected;
                        self.ever_connected = true;
                    }
                    other => out.push(other),
                }
            }
        }

        if self.state == ChannelState::Connecting {
            let interval = Duration::from_millis(self.config.hello_interval_ms);
            let due = match self.last_hello {
                Some(at) => now.saturating_duration_since(at) >= interval,
                None => true,
            };
            if due {
                self.send_hello(now);
            }
        }
        out
    }

    fn send_hello(&mut self, now: Instant) {
        self.last_hello = Some(now);
        let msg = OscMessage {
            addr: ADDR_HELLO.to_string(),
            args: vec![OscType::String(self.session_id.clone())],
        };
        self.send_packet(msg);
    }

    /// Fire-and-forget frame upload. Loss is acceptable; a failed send is
    /// logged at debug and degrades the state to Connecting.
    pub fn send_frame(&mut self, sequence_index: u64, audio_timestamp: f64, payload: &[u8]) {
        if self.state == ChannelState::Disconnected {
            return;
        }
        let msg = OscMessage {
            addr: ADDR_FRAME.to_string(),
            args: vec![
                OscType::String(self.session_id.clone()),
                OscType::Int(sequence_index as i32),
                OscType::Double(audio_timestamp),
                OscType::Blob(payload.to_vec()),
            ],
        };
        if self.send_packet(msg) {
            self.frames_sent += 1;
        }
    }

    /// Best-effort end-of-session envelope.
    pub fn send_session_end(&mut self) {
        if self.state == ChannelState::Disconnected {
            return;
        }
        let msg = OscMessage {
            addr: ADDR_END.to_string(),
            args: vec![
                OscType::String(self.session_id.clone()),
                OscType::Int(self.frames_sent as i32),
            ],
        };
        self.send_packet(msg);
    }

    fn send_packet(&mut self, msg: OscMessage) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        let addr = msg.addr.clone();
        let encoded = match encoder::encode(&OscPacket::Message(msg)) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("osc encode failed for {addr}: {e:?}");
                return false;
            }
        };
        match socket.send_to(&encoded, self.config.backend_addr()) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("send to backend failed for {addr}: {e}");
                if self.state == ChannelState::Connected {
                    // Transient: rely on the backend coming back, keep sending
                    self.state = ChannelState::Connecting;
                    log::warn!("feedback channel degraded, awaiting backend");
                }
                false
            }
        }
    }

    /// Tear the channel down. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
            log::info!("feedback channel disconnected");
        }
        self.socket = None;
        self.inbound = None;
        self.state = ChannelState::Disconnected;
    }
}

impl Drop for FeedbackChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
