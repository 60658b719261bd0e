//! Camera capability — live frame source consumed by the frame streamer.
//!
//! The engine never talks to real camera hardware; it consumes anything
//! implementing [`CameraFeed`]. A session may run without a camera at all,
//! in which case capture windows open and close but produce no frames.
//! [`SyntheticCamera`] renders deterministic frames for demos and tests.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Default frame width in pixels.
pub const DEFAULT_WIDTH: u32 = 180;
/// Default frame height in pixels.
pub const DEFAULT_HEIGHT: u32 = 240;

/// One captured frame: raw 8-bit grayscale, row-major.
///
/// The payload is opaque to the engine; only the scoring backend interprets
/// it. `captured_at` is the audio-relative capture time in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub captured_at: f64,
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A live frame source.
///
/// `capture` may return None when the device has no frame ready; the
/// streamer treats that as a skipped sample, not an error.
pub trait CameraFeed {
    /// Begin producing frames.
    fn start(&mut self);
    /// Stop producing frames. Idempotent.
    fn stop(&mut self);
    /// Grab the current frame, stamped with the given audio time.
    fn capture(&mut self, audio_now: f64) -> Option<CameraFrame>;
}

/// Deterministic synthetic camera: a moving gradient with seeded noise.
///
/// Frame content depends only on the seed and the capture timestamp, so
/// tests can assert on reproducible payloads.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    rng: ChaCha8Rng,
    running: bool,
}

impl SyntheticCamera {
    /// New camera at the default resolution.
    pub fn new(seed: u64) -> Self {
        Self::with_size(seed, DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    /// New camera with an explicit resolution.
    pub fn with_size(seed: u64, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rng: ChaCha8Rng::seed_from_u64(seed),
            running: false,
        }
    }
}

impl CameraFeed for SyntheticCamera {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn capture(&mut self, audio_now: f64) -> Option<CameraFrame> {
        if !self.running {
            return None;
        }

        let mut data = Vec::with_capacity((self.width * self.height) as usize);
        // Gradient phase drifts with audio time so consecutive frames differ
        let phase = (audio_now * 40.0) as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                let base = ((x + y + phase) % 256) as u8;
                let noise: u8 = self.rng.gen_range(0..8);
                data.push(base.wrapping_add(noise));
            }
        }

        Some(CameraFrame {
            width: self.width,
            height: self.height,
            captured_at: audio_now,
            data,
        })
    }
}
