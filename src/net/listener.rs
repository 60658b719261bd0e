//! Feedback listener — UDP socket listener on a dedicated thread.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rosc::decoder;

use super::config::NetConfig;
use super::{decode_message, InboundSender};

/// Active feedback listener running on a background thread.
pub struct FeedbackListener {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    port: u16,
}

impl FeedbackListener {
    /// Start listening for backend messages on a UDP port.
    pub fn start(config: &NetConfig, sender: InboundSender) -> io::Result<Self> {
        let addr = format!("0.0.0.0:{}", config.listen_port);
        let socket = UdpSocket::bind(&addr)?;
        // Set a short timeout so we can check the stop flag periodically
        socket.set_read_timeout(Some(std::time::Duration::from_millis(100)))?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let port = config.listen_port;

        let thread = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            while !stop_clone.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((size, _addr)) => {
                        if let Ok((_, packet)) = decoder::decode_udp(&buf[..size]) {
                            match packet {
                                rosc::OscPacket::Message(msg) => {
                                    if let Some(inbound) = decode_message(&msg) {
                                        let _ = sender.send(inbound);
                                    } else {
                                        log::debug!("ignoring osc message at {}", msg.addr);
                                    }
                                }
                                rosc::OscPacket::Bundle(bundle) => {
                                    for content in &bundle.content {
                                        if let rosc::OscPacket::Message(msg) = content {
                                            if let Some(inbound) = decode_message(msg) {
                                                let _ = sender.send(inbound);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        // Timeout — loop and check stop flag
                        continue;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                        continue;
                    }
                    Err(e) => {
                        log::warn!("feedback listener socket error: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            stop_flag,
            thread: Some(thread),
            port,
        })
    }

    /// Get the listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signal the listener to stop and join its thread.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FeedbackListener {
    fn drop(&mut self) {
        self.stop();
    }
}
