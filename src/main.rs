//! Choreo — run one guided choreography session from the command line.
//!
//! Live mode drives playback from a WAV file on the default audio device;
//! headless mode runs the same engine against a simulated clock. Either
//! way the engine streams camera frames to a judge backend over OSC/UDP.
//! Pass `--local-judge` to spawn a loopback judge inside this process for
//! offline runs.

use std::net::UdpSocket;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};

use choreo::camera::SyntheticCamera;
use choreo::chart::{DifficultyLevel, SongChart};
use choreo::clip::ClipLibrary;
use choreo::clock::sim::SimClock;
use choreo::clock::track::TrackPlayer;
use choreo::engine::{
    control_channel, ControlEvent, EngineConfig, SessionController, SessionError, SessionExit,
};
use choreo::net::{NetConfig, ADDR_FEEDBACK, ADDR_FRAME, ADDR_HELLO, ADDR_LEVEL, ADDR_READY};

/// Headless step period.
const STEP: Duration = Duration::from_millis(5);

#[derive(Parser, Debug)]
#[command(name = "choreo", about = "Playback-synchronized choreography session runner")]
struct Args {
    /// Chart file (YAML); the builtin demo chart when omitted
    chart: Option<PathBuf>,

    /// Audio track (WAV) driving the master clock in live mode
    #[arg(short, long)]
    track: Option<PathBuf>,

    /// Clip library file (YAML); the builtin clips when omitted
    #[arg(long)]
    clips: Option<PathBuf>,

    /// Run on a simulated clock instead of an audio device
    #[arg(long)]
    headless: bool,

    /// Simulated clock speed multiplier (headless only)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Starting difficulty (1-3)
    #[arg(short, long, default_value_t = 1)]
    level: u8,

    /// Seed for the synthetic camera
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Session id sent to the judge (generated when omitted)
    #[arg(long)]
    session: Option<String>,

    /// UDP port for judge replies (overrides net.yaml)
    #[arg(long)]
    listen_port: Option<u16>,

    /// Judge UDP port (overrides net.yaml)
    #[arg(long)]
    backend_port: Option<u16>,

    /// Spawn a loopback judge in this process
    #[arg(long)]
    local_judge: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let engine_config = EngineConfig::load().unwrap_or_default();
    let mut net_config = NetConfig::load().unwrap_or_default();
    if let Some(port) = args.listen_port {
        net_config.listen_port = port;
    }
    if let Some(port) = args.backend_port {
        net_config.backend_port = port;
    }

    let chart = match &args.chart {
        Some(path) => match SongChart::load(path) {
            Ok(chart) => chart,
            Err(e) => {
                log::error!("failed to load chart: {e}");
                process::exit(1);
            }
        },
        None => SongChart::demo(),
    };

    let library = match &args.clips {
        Some(path) => match ClipLibrary::load(path) {
            Ok(library) => library,
            Err(e) => {
                log::error!("failed to load clip library: {e}");
                process::exit(1);
            }
        },
        None => ClipLibrary::builtin(),
    };

    let level = match DifficultyLevel::from_number(args.level as i32) {
        Some(level) => level,
        None => {
            log::warn!("level {} out of range, using level1", args.level);
            DifficultyLevel::Level1
        }
    };

    if args.local_judge {
        if let Err(e) = spawn_local_judge(net_config.backend_port, net_config.listen_port) {
            log::error!("could not start the local judge: {e}");
            process::exit(1);
        }
    }

    let (control_tx, control_rx) = control_channel();
    let stop_tx = control_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(ControlEvent::Stop);
    }) {
        log::warn!("could not install the interrupt handler: {e}");
    }

    let camera = Box::new(SyntheticCamera::new(args.seed));

    log::info!(
        "choreo v{} - {:.0} bpm, {:.1}s, starting at {level}",
        env!("CARGO_PKG_VERSION"),
        chart.bpm,
        chart.duration
    );

    let result = if args.headless {
        let clock = SimClock::new(chart.duration);
        let mut session = SessionController::new(
            chart,
            library,
            level,
            engine_config,
            net_config,
            clock,
            camera,
            control_rx,
        );
        if let Some(id) = args.session.clone() {
            session.set_session_id(id);
        }
        run_headless(&mut session, args.speed)
    } else {
        let Some(track) = &args.track else {
            log::error!("live mode needs --track <wav>; use --headless to run without audio");
            process::exit(1);
        };
        let clock = match TrackPlayer::from_wav(track) {
            Ok(clock) => clock,
            Err(e) => {
                log::error!("failed to open audio track: {e}");
                process::exit(1);
            }
        };
        let mut session = SessionController::new(
            chart,
            library,
            level,
            engine_config,
            net_config,
            clock,
            camera,
            control_rx,
        );
        if let Some(id) = args.session.clone() {
            session.set_session_id(id);
        }
        session.run()
    };

    match result {
        Ok(exit) => report(exit),
        Err(e) => {
            log::error!("session failed to start: {e}");
            process::exit(1);
        }
    }
}

/// Step loop for the simulated clock: every step advances the clock by
/// the step period times the speed multiplier.
fn run_headless(
    session: &mut SessionController<SimClock>,
    speed: f64,
) -> Result<SessionExit, SessionError> {
    session.begin(Instant::now())?;
    loop {
        if let Some(exit) = session.step(Instant::now()) {
            return Ok(exit);
        }
        session.clock_mut().advance(STEP.as_secs_f64() * speed);
        thread::sleep(STEP);
    }
}

fn report(exit: SessionExit) {
    match exit {
        SessionExit::Completed(summary) => {
            log::info!(
                "session {} complete: {:.1}s played, {} frames sent",
                summary.session_id,
                summary.played_secs,
                summary.frames_sent
            );
            log::info!(
                "judgments: {} perfect / {} good / {} soso",
                summary.judgments.perfect,
                summary.judgments.good,
                summary.judgments.soso
            );
        }
        SessionExit::Abandoned => {
            log::warn!("session abandoned: the judge never answered");
            process::exit(2);
        }
        SessionExit::ForcedStop => log::info!("session stopped"),
    }
}

/// A loopback judge for offline runs: acks the session hello, grades
/// every tenth frame with a cycling judgment, and bumps the difficulty
/// once early in the stream.
fn spawn_local_judge(judge_port: u16, client_port: u16) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("127.0.0.1", judge_port))?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;
    log::info!("local judge on 127.0.0.1:{judge_port}, replying to {client_port}");

    thread::spawn(move || {
        let client = ("127.0.0.1", client_port);
        let mut buf = [0u8; 65_507];
        loop {
            let n = match socket.recv_from(&mut buf) {
                Ok((n, _)) => n,
                Err(_) => continue,
            };
            let Ok((_, OscPacket::Message(msg))) = decoder::decode_udp(&buf[..n]) else {
                continue;
            };
            match msg.addr.as_str() {
                ADDR_HELLO => {
                    send_osc(&socket, client, ADDR_READY, vec![]);
                }
                ADDR_FRAME => {
                    let seq = match msg.args.get(1) {
                        Some(OscType::Int(v)) => *v,
                        _ => continue,
                    };
                    let ts = match msg.args.get(2) {
                        Some(OscType::Double(v)) => *v,
                        _ => 0.0,
                    };
                    if seq % 10 == 0 {
                        let grade = (seq / 10) % 3 + 1;
                        send_osc(
                            &socket,
                            client,
                            ADDR_FEEDBACK,
                            vec![OscType::Int(grade), OscType::Double(ts)],
                        );
                    }
                    if seq == 30 {
                        send_osc(&socket, client, ADDR_LEVEL, vec![OscType::Int(2)]);
                    }
                }
                _ => {}
            }
        }
    });
    Ok(())
}

fn send_osc(socket: &UdpSocket, to: (&str, u16), addr: &str, args: Vec<OscType>) {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    match encoder::encode(&packet) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, to) {
                log::debug!("judge reply failed: {e}");
            }
        }
        Err(e) => log::warn!("judge encode failed: {e:?}"),
    }
}
