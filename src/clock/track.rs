//! Track player — WAV playback through cpal, publishing a lock-free playhead.
//!
//! The player owns the cpal output stream. Control commands travel to the
//! audio callback through a lock-free ring buffer; the callback copies
//! decoded samples into the device buffer and publishes its position into a
//! [`SharedPlayhead`] the run loop reads without locking.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use super::{MasterClock, SharedPlayhead};

/// Ring buffer capacity (number of pending commands).
const COMMAND_CAPACITY: usize = 64;

/// Track playback errors.
#[derive(Debug)]
pub enum AudioError {
    /// No audio output device found.
    NoOutputDevice,
    /// Could not read or decode the track file.
    Decode(hound::Error),
    /// The track's sample format is not supported.
    UnsupportedFormat(String),
    /// Failed to build the audio stream.
    StreamBuild(String),
    /// Failed to start the audio stream.
    StreamPlay(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoOutputDevice => write!(f, "no audio output device found"),
            AudioError::Decode(e) => write!(f, "track decode error: {e}"),
            AudioError::UnsupportedFormat(e) => write!(f, "unsupported track format: {e}"),
            AudioError::StreamBuild(e) => write!(f, "stream build error: {e}"),
            AudioError::StreamPlay(e) => write!(f, "stream play error: {e}"),
        }
    }
}

impl std::error::Error for AudioError {}

impl From<hound::Error> for AudioError {
    fn from(e: hound::Error) -> Self {
        AudioError::Decode(e)
    }
}

/// Commands sent from the control side to the audio callback.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerCommand {
    Play,
    Pause,
    Seek(f64),
}

/// Decode a WAV file into interleaved f32 samples.
///
/// Integer formats are normalized to [-1, 1]; 32-bit float passes through.
fn decode_wav(path: &std::path::Path) -> Result<(Vec<f32>, u32, u16), AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, hound::Error>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{} bits per sample",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, hound::Error>>()?
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

/// State that lives on the audio thread. Accessed only from the cpal callback.
struct TrackCallback {
    commands: HeapCons<PlayerCommand>,
    samples: Vec<f32>,
    cursor: usize,
    playing: bool,
    channels: usize,
    sample_rate: u32,
    shared: Arc<SharedPlayhead>,
}

impl TrackCallback {
    fn new(
        commands: HeapCons<PlayerCommand>,
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        shared: Arc<SharedPlayhead>,
    ) -> Self {
        Self {
            commands,
            samples,
            cursor: 0,
            playing: false,
            channels: channels.max(1) as usize,
            sample_rate,
            shared,
        }
    }

    fn position_secs(&self) -> f64 {
        self.cursor as f64 / self.channels as f64 / self.sample_rate as f64
    }

    /// Called by cpal for each device buffer. Fills `output` with samples.
    fn process(&mut self, output: &mut [f32]) {
        while let Some(cmd) = self.commands.try_pop() {
            match cmd {
                PlayerCommand::Play => {
                    if self.cursor < self.samples.len() {
                        self.playing = true;
                        self.shared.set_playing(true);
                    }
                }
                PlayerCommand::Pause => {
                    self.playing = false;
                    self.shared.set_playing(false);
                }
                PlayerCommand::Seek(secs) => {
                    let frame = (secs.max(0.0) * self.sample_rate as f64) as usize;
                    self.cursor = (frame * self.channels).min(self.samples.len());
                    self.shared.set_position_secs(self.position_secs());
                }
            }
        }

        if !self.playing {
            output.fill(0.0);
            return;
        }

        let remaining = self.samples.len() - self.cursor;
        let n = output.len().min(remaining);
        output[..n].copy_from_slice(&self.samples[self.cursor..self.cursor + n]);
        output[n..].fill(0.0);
        self.cursor += n;
        self.shared.set_position_secs(self.position_secs());

        if self.cursor >= self.samples.len() {
            self.playing = false;
            self.shared.set_playing(false);
            self.shared.set_ended();
        }
    }
}

/// Plays one WAV track through the default output device.
///
/// Owns the cpal stream and the command producer; the playhead is published
/// by the callback and read here lock-free.
pub struct TrackPlayer {
    _stream: cpal::Stream,
    producer: HeapProd<PlayerCommand>,
    shared: Arc<SharedPlayhead>,
    duration: f64,
    sample_rate: u32,
    channels: u16,
}

impl TrackPlayer {
    /// Decode a WAV file and open an output stream for it. The stream starts
    /// silent; call [`play`](MasterClock::play) to begin playback.
    pub fn from_wav(path: &std::path::Path) -> Result<Self, AudioError> {
        let (samples, sample_rate, channels) = decode_wav(path)?;
        let duration = samples.len() as f64 / channels.max(1) as f64 / sample_rate as f64;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let rb = HeapRb::<PlayerCommand>::new(COMMAND_CAPACITY);
        let (producer, consumer) = rb.split();

        let shared = Arc::new(SharedPlayhead::default());
        let mut callback =
            TrackCallback::new(consumer, samples, channels, sample_rate, shared.clone());

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err: cpal::StreamError| {
            log::error!("audio stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback.process(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            producer,
            shared,
            duration,
            sample_rate,
            channels,
        })
    }

    /// Device sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the track.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn send(&mut self, cmd: PlayerCommand) {
        if self.producer.try_push(cmd).is_err() {
            log::warn!("player command ring full, dropping {cmd:?}");
        }
    }
}

impl MasterClock for TrackPlayer {
    fn position_secs(&self) -> f64 {
        self.shared.position_secs()
    }

    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    fn ended(&self) -> bool {
        self.shared.ended()
    }

    fn play(&mut self) {
        self.send(PlayerCommand::Play);
    }

    fn pause(&mut self) {
        self.send(PlayerCommand::Pause);
    }

    fn seek(&mut self, secs: f64) {
        self.send(PlayerCommand::Seek(secs));
    }
}
