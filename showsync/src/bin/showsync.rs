//! Show controller console.
//!
//! Spawns the controller and takes operator commands on stdin, one per line.
//!
//! # Usage
//!
//! ```sh
//! showsync --music show.mp3
//! showsync --broadcast 192.168.4.255 --timing relaxed
//! ```
//!
//! # Commands
//!
//! - `start [seconds]`: run the show, resuming from the last stop by default
//! - `stop`: stop the show and print the resume offset
//! - `status`: counts, last broadcast and one line per device
//! - `json`: device snapshot as JSON
//! - `quit` or end of input: shut down

use std::io::{self, BufRead, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use showsync::config::{DEFAULT_CONTROL_PORT, DEFAULT_PREFIX_LEN, DEFAULT_RESPONSE_PORT};
use showsync::{
    AudioConfig, BroadcastTarget, Controller, ControllerConfig, Liveness, StartOutcome,
    StopOutcome, TimingConfig, init_tracing,
};

#[derive(Parser)]
#[command(name = "showsync", about = "Keep light-dance devices in step with the music", version)]
struct Cli {
    /// Interface to receive device replies on
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    bind: Ipv4Addr,

    /// Port devices listen on for broadcasts
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    /// Port device replies arrive on
    #[arg(long, default_value_t = DEFAULT_RESPONSE_PORT)]
    response_port: u16,

    /// Broadcast address to use instead of deriving one
    #[arg(long)]
    broadcast: Option<Ipv4Addr>,

    /// Subnet prefix length used when deriving the broadcast address
    #[arg(long, default_value_t = DEFAULT_PREFIX_LEN)]
    prefix: u8,

    /// Interval preset
    #[arg(long, value_enum, default_value_t = Preset::Standard)]
    timing: Preset,

    /// Override the disconnect threshold, in milliseconds
    #[arg(long)]
    liveness_timeout_ms: Option<u64>,

    /// Soundtrack to play alongside the show
    #[arg(long)]
    music: Option<PathBuf>,

    /// Audio player executable
    #[arg(long, default_value = "ffplay")]
    player: String,

    /// Player argument, repeatable; replaces the ffplay defaults.
    /// `{offset}` becomes the start second and `{file}` the track
    #[arg(long = "player-arg", value_name = "ARG", allow_hyphen_values = true)]
    player_args: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Standard,
    Relaxed,
}

impl Cli {
    fn into_config(self) -> ControllerConfig {
        let mut timing = match self.timing {
            Preset::Standard => TimingConfig::default(),
            Preset::Relaxed => TimingConfig::relaxed(),
        };
        if let Some(ms) = self.liveness_timeout_ms {
            timing.liveness_timeout = Duration::from_millis(ms);
        }
        let broadcast = match self.broadcast {
            Some(addr) => BroadcastTarget::Fixed(addr),
            None => BroadcastTarget::Discover {
                prefix_len: self.prefix,
            },
        };
        let player_args = self.player_args;
        let program = self.player;
        let audio = self.music.map(|file| {
            let defaults = AudioConfig::ffplay(file);
            AudioConfig {
                program,
                args: if player_args.is_empty() {
                    defaults.args
                } else {
                    player_args
                },
                file: defaults.file,
            }
        });
        ControllerConfig {
            bind_ip: self.bind,
            control_port: self.control_port,
            response_port: self.response_port,
            broadcast,
            timing,
            audio,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Start(Option<u64>),
    Stop,
    Status,
    Json,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some("start") => match words.next() {
                Some(secs) => Self::Start(Some(
                    secs.parse()
                        .map_err(|_| format!("not a number of seconds: {secs}"))?,
                )),
                None => Self::Start(None),
            },
            Some("stop") => Self::Stop,
            Some("status") => Self::Status,
            Some("json") => Self::Json,
            Some("quit" | "exit") => Self::Quit,
            Some(other) => return Err(format!("unknown command: {other}")),
            None => return Err(String::new()),
        };
        match words.next() {
            Some(extra) => Err(format!("unexpected argument: {extra}")),
            None => Ok(command),
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let config = Cli::parse().into_config();
    let controller = match Controller::spawn(config) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("showsync: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("showsync: broadcasting to {}", controller.destination());
    let result = console(&controller, io::stdin().lock(), io::stdout().lock());
    controller.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("showsync: {e}");
            ExitCode::FAILURE
        }
    }
}

fn console(controller: &Controller, input: impl BufRead, mut out: impl Write) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(msg) if msg.is_empty() => continue,
            Err(msg) => {
                writeln!(out, "{msg}")?;
                continue;
            }
        };
        match command {
            Command::Start(secs) => {
                let offset = secs.unwrap_or_else(|| controller.offset_secs());
                match controller.start(offset) {
                    StartOutcome::Started { audio: Ok(()) } => {
                        writeln!(out, "started at {offset}s")?;
                    }
                    StartOutcome::Started { audio: Err(e) } => {
                        writeln!(out, "started at {offset}s without audio: {e}")?;
                    }
                    StartOutcome::AlreadyRunning => writeln!(out, "already running")?,
                }
            }
            Command::Stop => match controller.stop() {
                StopOutcome::Stopped { elapsed_secs } => {
                    writeln!(out, "stopped, resume at {elapsed_secs}s")?;
                }
                StopOutcome::NotRunning { offset_secs } => {
                    writeln!(out, "not running, resume at {offset_secs}s")?;
                }
            },
            Command::Status => status(controller, &mut out)?,
            Command::Json => {
                serde_json::to_writer_pretty(&mut out, &controller.device_snapshot())?;
                writeln!(out)?;
            }
            Command::Quit => break,
        }
        out.flush()?;
    }
    Ok(())
}

fn status(controller: &Controller, out: &mut impl Write) -> io::Result<()> {
    let counts = controller.counts();
    let state = if controller.is_running() {
        "running"
    } else {
        "stopped"
    };
    writeln!(
        out,
        "{state} at {:.1}s | last broadcast: {} | connected {} / disconnected {} / total {}",
        millis_as_secs(controller.elapsed_ms()),
        controller.broadcast_display(),
        counts.connected,
        counts.disconnected,
        counts.total,
    )?;
    for device in controller.device_snapshot() {
        let seen = device
            .silent_for_ms
            .map_or_else(|| "never".to_owned(), |ms| format!("{:.1}s ago", millis_as_secs(ms)));
        let liveness = match device.liveness {
            Liveness::Connected => "connected",
            Liveness::Disconnected => "disconnected",
        };
        writeln!(
            out,
            "  {:<15} {:<12} {:<12} {:<20} seen {seen}",
            device.address.to_string(),
            device.device_id,
            liveness,
            device.task_status,
        )?;
    }
    Ok(())
}

fn millis_as_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("start".parse(), Ok(Command::Start(None)));
        assert_eq!("  start 42 ".parse(), Ok(Command::Start(Some(42))));
        assert_eq!("stop".parse(), Ok(Command::Stop));
        assert_eq!("status".parse(), Ok(Command::Status));
        assert_eq!("json".parse(), Ok(Command::Json));
        assert_eq!("quit".parse(), Ok(Command::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!("start soon".parse::<Command>().is_err());
        assert!("stop now".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert_eq!("   ".parse::<Command>(), Err(String::new()));
    }

    #[test]
    fn cli_builds_config() {
        let cli = Cli::parse_from([
            "showsync",
            "--broadcast",
            "10.1.2.255",
            "--timing",
            "relaxed",
            "--liveness-timeout-ms",
            "3000",
            "--music",
            "show.mp3",
            "--player",
            "mpv",
        ]);
        let config = cli.into_config();
        assert_eq!(
            config.broadcast,
            BroadcastTarget::Fixed(Ipv4Addr::new(10, 1, 2, 255))
        );
        assert_eq!(config.timing.liveness_timeout, Duration::from_secs(3));
        assert_eq!(config.timing.heartbeat_idle, Duration::from_secs(1));
        let audio = config.audio.unwrap();
        assert_eq!(audio.program, "mpv");
        assert_eq!(audio.file, PathBuf::from("show.mp3"));
        assert_eq!(audio.args, AudioConfig::ffplay("show.mp3").args);
    }

    #[test]
    fn player_args_replace_ffplay_defaults() {
        let cli = Cli::parse_from([
            "showsync",
            "--music",
            "show.mp3",
            "--player",
            "mpv",
            "--player-arg",
            "--no-video",
            "--player-arg=--start={offset}",
            "--player-arg",
            "{file}",
        ]);
        let audio = cli.into_config().audio.unwrap();
        assert_eq!(audio.program, "mpv");
        assert_eq!(audio.args, ["--no-video", "--start={offset}", "{file}"]);
    }

    #[test]
    fn console_reports_stop_outcome() {
        use showsync::audio::Silent;
        use showsync::net::Transport;
        use showsync::time::ManualClock;
        use std::net::{SocketAddrV4, UdpSocket};
        use std::sync::Arc;

        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = Transport::bind(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            device.local_addr().unwrap(),
        )
        .unwrap();
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let controller = Controller::spawn_with(
            transport,
            time.clone(),
            Box::new(Silent),
            TimingConfig::local(),
        )
        .unwrap();

        let mut out = Vec::new();
        console(&controller, "stop\nstart 3\n".as_bytes(), &mut out).unwrap();
        time.advance(Duration::from_millis(2_400));
        console(&controller, "stop\n".as_bytes(), &mut out).unwrap();
        controller.shutdown();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            ["not running, resume at 0s", "started at 3s", "stopped, resume at 5s"]
        );
    }

    #[test]
    fn cli_defaults_discover_broadcast() {
        let config = Cli::parse_from(["showsync"]).into_config();
        assert_eq!(config, ControllerConfig::default());
    }
}
