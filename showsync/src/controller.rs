//! Controller: the running system.
//!
//! # Architecture
//!
//! [`Controller::spawn`] starts three threads around one shared transport:
//! - **listener**: receives device replies and updates the [`Registry`].
//! - **heartbeat**: probes for devices while the show is stopped.
//! - **broadcaster**: sends the elapsed show time once per second while it
//!   runs.
//!
//! Operator surfaces (console, GUI) call [`start`](Controller::start) and
//! [`stop`](Controller::stop) and poll the read accessors on their own
//! refresh cadence. Nothing is pushed to them.
//!
//! # Wire traffic
//!
//! ```text
//!  controller                                  devices
//!      │  "heartbeat"  (while stopped, 2–10/s)    │
//!      │─────────────────────────────────────────▶│  broadcast
//!      │  u32 BE elapsed ms (while running, 1/s)  │  :control port
//!      │─────────────────────────────────────────▶│
//!      │  "stop"       (once per stop)            │
//!      │─────────────────────────────────────────▶│
//!      │                                          │
//!      │  "<id>: <status>"                        │  unicast
//!      │◀─────────────────────────────────────────│  :response port
//! ```
//!
//! Every control message is absolute, so a lost or duplicated datagram is
//! corrected by the next one.
//!
//! # Example
//!
//! ```no_run
//! use showsync::{Controller, ControllerConfig};
//!
//! let controller = Controller::spawn(ControllerConfig::default())?;
//! controller.start(0);
//! // ... show runs ...
//! let resume_at = controller.stop().resume_secs();
//! controller.shutdown();
//! # let _ = resume_at;
//! # Ok::<(), showsync::ControllerError>(())
//! ```

mod announce;
mod broadcaster;
mod heartbeat;
mod listener;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::audio::{AudioError, AudioPlayer, ProcessPlayer, Silent};
use crate::clock::PlaybackClock;
use crate::config::{ControllerConfig, TimingConfig};
use crate::net::{BroadcastSink, Transport, TransportError};
use crate::protocol::ControlMessage;
use crate::registry::{Counts, DeviceSnapshot, Registry};
use crate::shutdown::Shutdown;
use crate::time::{SystemClock, TimeSource};
use crate::trace::{debug, error, info, warn};

use announce::Announcer;
use broadcaster::{TimeBroadcaster, emit_due_tick};
use heartbeat::HeartbeatDriver;
use listener::ResponseListener;

/// Error starting the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Result of [`Controller::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The show is running. Audio trouble does not stop the show; it is
    /// reported here.
    Started { audio: Result<(), AudioError> },
    /// A run was already in progress and is unaffected.
    AlreadyRunning,
}

impl StartOutcome {
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

/// Result of [`Controller::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The run ended after `elapsed_secs` whole seconds of show time.
    Stopped { elapsed_secs: u64 },
    /// Nothing was running. `offset_secs` is the unchanged resume offset.
    NotRunning { offset_secs: u64 },
}

impl StopOutcome {
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Offset the next start resumes from.
    #[must_use]
    pub const fn resume_secs(&self) -> u64 {
        match *self {
            Self::Stopped { elapsed_secs } => elapsed_secs,
            Self::NotRunning { offset_secs } => offset_secs,
        }
    }
}

/// Handle to a running controller.
///
/// Dropping the handle raises the shutdown signal but does not wait for the
/// threads. Use [`Controller::shutdown`] to join them.
pub struct Controller {
    registry: Arc<Registry>,
    clock: Arc<PlaybackClock>,
    announcer: Arc<Announcer>,
    audio: Box<dyn AudioPlayer>,
    shutdown: Arc<Shutdown>,
    destination: SocketAddr,
    local_addr: Option<SocketAddr>,
    /// Serializes start/stop so audio side effects follow clock order.
    commands: Mutex<()>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Controller {
    /// Opens the transport described by `config` and starts the threads.
    ///
    /// # Errors
    ///
    /// Fails if no broadcast address can be derived, the response port
    /// cannot be bound, or a thread cannot be spawned.
    pub fn spawn(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!(
            control_port = config.control_port,
            response_port = config.response_port,
            broadcast = ?config.broadcast,
            "controller starting"
        );
        let transport = Transport::open(&config).inspect_err(|_e| {
            warn!(error = %_e, "transport unavailable");
        })?;
        let audio: Box<dyn AudioPlayer> = match config.audio {
            Some(audio) => Box::new(ProcessPlayer::new(audio)),
            None => Box::new(Silent),
        };
        Self::spawn_with(transport, Arc::new(SystemClock::new()), audio, config.timing)
    }

    /// Starts the threads over an already-open transport.
    ///
    /// # Errors
    ///
    /// Fails if the receive poller or a thread cannot be created.
    pub fn spawn_with(
        transport: Transport,
        time: Arc<dyn TimeSource>,
        audio: Box<dyn AudioPlayer>,
        timing: TimingConfig,
    ) -> Result<Self, ControllerError> {
        let transport = Arc::new(transport);
        let destination = transport.destination();
        let local_addr = transport.local_addr().ok();
        let receiver = transport.receiver()?;

        let registry = Arc::new(Registry::new(Arc::clone(&time), timing.liveness_timeout));
        let clock = Arc::new(PlaybackClock::new(time));
        let sink: Arc<dyn BroadcastSink> = transport;
        let announcer = Arc::new(Announcer::new(sink));
        let shutdown = Arc::new(Shutdown::new());

        let mut controller = Self {
            registry,
            clock,
            announcer,
            audio,
            shutdown,
            destination,
            local_addr,
            commands: Mutex::new(()),
            threads: Vec::with_capacity(3),
        };

        let mut listener = ResponseListener::new(
            receiver,
            Arc::clone(&controller.registry),
            Arc::clone(&controller.shutdown),
            timing.receive_timeout,
        );
        controller.launch("listener", move || listener.run())?;

        let heartbeat = HeartbeatDriver::new(
            Arc::clone(&controller.announcer),
            Arc::clone(&controller.clock),
            Arc::clone(&controller.registry),
            Arc::clone(&controller.shutdown),
            timing.clone(),
        );
        controller.launch("heartbeat", move || heartbeat.run())?;

        let broadcaster = TimeBroadcaster::new(
            Arc::clone(&controller.clock),
            Arc::clone(&controller.announcer),
            Arc::clone(&controller.shutdown),
            timing.tick_poll,
        );
        controller.launch("broadcaster", move || broadcaster.run())?;

        info!(destination = %destination, "controller ready");
        Ok(controller)
    }

    /// Spawns a named thread. On failure the already-running threads see
    /// the shutdown signal when `self` is dropped by the caller's `?`.
    fn launch<F>(&mut self, name: &'static str, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce() + Send + 'static,
    {
        debug!(thread = name, "spawning thread");
        let handle = thread::Builder::new()
            .name(format!("showsync-{name}"))
            .spawn(move || {
                info!("thread started");
                body();
                info!("thread exiting");
            })
            .map_err(|source| ControllerError::Spawn { name, source })?;
        self.threads.push((name, handle));
        Ok(())
    }

    /// Starts the show at `offset_secs` and plays audio from the same point.
    ///
    /// The first tick goes out before this returns, so devices begin
    /// together without waiting for the broadcaster's next poll.
    pub fn start(&self, offset_secs: u64) -> StartOutcome {
        let _serial = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.clock.start(offset_secs) {
            debug!("start ignored: already running");
            return StartOutcome::AlreadyRunning;
        }
        info!(offset_secs, "show started");
        emit_due_tick(&self.clock, &self.announcer);

        let audio = self.audio.play_from(offset_secs);
        if let Err(_e) = &audio {
            warn!(error = %_e, "show running without audio");
        }
        StartOutcome::Started { audio }
    }

    /// Stops the show. The whole seconds reached become the offset the next
    /// start resumes from.
    ///
    /// Broadcasts `stop` exactly once per run. Calling it while stopped
    /// sends nothing and reports the current resume offset.
    pub fn stop(&self) -> StopOutcome {
        let _serial = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        let stopped = self.clock.stop_with(|_| {
            self.announcer.send(ControlMessage::Stop);
        });
        match stopped {
            Some(elapsed_secs) => {
                self.audio.stop();
                info!(elapsed_secs, "show stopped");
                StopOutcome::Stopped { elapsed_secs }
            }
            None => {
                debug!("stop ignored: not running");
                StopOutcome::NotRunning {
                    offset_secs: self.clock.offset_secs(),
                }
            }
        }
    }

    /// Sets where the next start resumes. Ignored while running.
    pub fn set_offset(&self, offset_secs: u64) -> bool {
        let _serial = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        self.clock.set_offset(offset_secs)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Elapsed show time; the frozen offset while stopped.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    /// Offset the next start resumes from when stopped.
    #[must_use]
    pub fn offset_secs(&self) -> u64 {
        self.clock.offset_secs()
    }

    /// All devices ever seen, in first-seen order.
    #[must_use]
    pub fn device_snapshot(&self) -> Vec<DeviceSnapshot> {
        self.registry.snapshot()
    }

    #[must_use]
    pub fn counts(&self) -> Counts {
        self.registry.counts()
    }

    /// Last broadcast in readable form: `heartbeat`, `stop` or elapsed ms.
    #[must_use]
    pub fn broadcast_display(&self) -> String {
        self.announcer.display()
    }

    /// Broadcast destination.
    #[must_use]
    pub const fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Address device replies should be sent to, if known.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signals the threads to exit without waiting for them.
    pub fn request_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Stops the show if running, signals shutdown and joins every thread.
    pub fn shutdown(mut self) {
        info!("controller shutdown initiated");
        self.stop();
        self.shutdown.trigger();
        for (_name, handle) in self.threads.drain(..) {
            debug!(thread = _name, "waiting for thread to exit");
            if handle.join().is_err() {
                error!(thread = _name, "thread panicked");
            }
        }
        info!("controller shutdown complete");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
    use std::time::Duration;

    /// Controller on loopback with a slow-polling manual clock, plus a
    /// socket standing in for the device side of the broadcast.
    fn loopback(time: Arc<ManualClock>) -> (Controller, UdpSocket) {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        device
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let transport = Transport::bind(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            device.local_addr().unwrap(),
        )
        .unwrap();
        let timing = TimingConfig {
            heartbeat_idle: Duration::from_secs(60),
            heartbeat_active: Duration::from_secs(60),
            ..TimingConfig::local()
        };
        let controller = Controller::spawn_with(transport, time, Box::new(Silent), timing).unwrap();
        (controller, device)
    }

    fn drain(device: &UdpSocket) -> Vec<ControlMessage> {
        let mut buf = [0u8; 64];
        let mut out = Vec::new();
        while let Ok(len) = device.recv(&mut buf) {
            out.push(ControlMessage::decode(&buf[..len]).unwrap());
        }
        out
    }

    #[test]
    fn start_sends_first_tick_immediately() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, device) = loopback(time);
        drain(&device);

        assert!(controller.start(7).is_started());
        assert_eq!(drain(&device), [ControlMessage::Tick(7_000)]);
        assert_eq!(controller.broadcast_display(), "7000");
        controller.shutdown();
    }

    #[test]
    fn start_twice_is_ignored() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, _device) = loopback(time.clone());
        controller.start(0);
        time.advance(Duration::from_millis(2_500));
        assert!(matches!(controller.start(40), StartOutcome::AlreadyRunning));
        assert_eq!(controller.elapsed_ms(), 2_500);
        controller.shutdown();
    }

    #[test]
    fn stop_broadcasts_once_and_reports_offset() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, device) = loopback(time.clone());
        controller.start(0);
        time.advance(Duration::from_millis(5_300));
        drain(&device);

        assert_eq!(controller.stop(), StopOutcome::Stopped { elapsed_secs: 5 });
        assert_eq!(controller.stop(), StopOutcome::NotRunning { offset_secs: 5 });
        let after: Vec<_> = drain(&device)
            .into_iter()
            .filter(|m| *m == ControlMessage::Stop)
            .collect();
        assert_eq!(after, [ControlMessage::Stop]);
        assert_eq!(controller.offset_secs(), 5);
        controller.shutdown();
    }

    #[test]
    fn stop_while_stopped_sends_nothing() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, device) = loopback(time);
        drain(&device);
        let outcome = controller.stop();
        assert!(!outcome.is_stopped());
        assert_eq!(outcome.resume_secs(), 0);
        assert!(!drain(&device).contains(&ControlMessage::Stop));
        controller.shutdown();
    }

    #[test]
    fn set_offset_feeds_next_start() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, device) = loopback(time);
        assert!(controller.set_offset(30));
        drain(&device);
        controller.start(controller.offset_secs());
        assert_eq!(drain(&device), [ControlMessage::Tick(30_000)]);
        assert!(!controller.set_offset(0));
        controller.shutdown();
    }

    #[test]
    fn missing_audio_does_not_block_the_show() {
        struct Broken;
        impl AudioPlayer for Broken {
            fn play_from(&self, _offset_secs: u64) -> Result<(), AudioError> {
                Err(AudioError::MissingFile("/nope.mp3".into()))
            }
            fn stop(&self) {}
        }

        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = Transport::bind(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            device.local_addr().unwrap(),
        )
        .unwrap();
        let controller = Controller::spawn_with(
            transport,
            Arc::new(ManualClock::new(1_700_000_000_000)),
            Box::new(Broken),
            TimingConfig::local(),
        )
        .unwrap();

        let outcome = controller.start(0);
        assert!(matches!(
            outcome,
            StartOutcome::Started {
                audio: Err(AudioError::MissingFile(_))
            }
        ));
        assert!(controller.is_running());
        controller.shutdown();
    }

    #[test]
    fn shutdown_stops_a_running_show() {
        let time = Arc::new(ManualClock::new(1_700_000_000_000));
        let (controller, device) = loopback(time);
        controller.start(0);
        drain(&device);
        controller.shutdown();
        assert!(drain(&device).contains(&ControlMessage::Stop));
    }
}
