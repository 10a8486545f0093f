//! End-to-end tests over loopback UDP.
//!
//! Each test runs a real controller whose broadcast destination is a plain
//! std socket playing the part of the devices' control port. Device replies
//! come from further std sockets, so the whole path from wire to registry
//! is exercised.
//!
//! To see the controller's logs:
//! ```bash
//! RUST_LOG=showsync=debug cargo test --test controller_e2e -- --nocapture
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use showsync::audio::Silent;
use showsync::net::Transport;
use showsync::protocol::ControlMessage;
use showsync::time::{ManualClock, SystemClock, TimeSource};
use showsync::{Controller, Counts, Liveness, StopOutcome, TimingConfig};

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(showsync::init_tracing);
}

/// Controller on loopback plus the socket its broadcasts land on.
fn spawn(time: Arc<dyn TimeSource>) -> (Controller, UdpSocket) {
    init_test_tracing();
    let control = UdpSocket::bind("127.0.0.1:0").expect("bind control");
    control
        .set_read_timeout(Some(Duration::from_millis(20)))
        .expect("read timeout");
    let transport = Transport::bind(
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
        control.local_addr().expect("control addr"),
    )
    .expect("bind transport");
    let controller = Controller::spawn_with(transport, time, Box::new(Silent), TimingConfig::local())
        .expect("spawn controller");
    (controller, control)
}

/// Collects control messages for `window`.
fn collect(control: &UdpSocket, window: Duration) -> Vec<(Instant, ControlMessage)> {
    let deadline = Instant::now() + window;
    let mut buf = [0u8; 64];
    let mut out = Vec::new();
    while Instant::now() < deadline {
        if let Ok(len) = control.recv(&mut buf) {
            let msg = ControlMessage::decode(&buf[..len]).expect("decodable control message");
            out.push((Instant::now(), msg));
        }
    }
    out
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn reply(from: &UdpSocket, to: SocketAddr, text: &str) {
    from.send_to(text.as_bytes(), to).expect("send reply");
}

#[test]
fn heartbeats_reach_devices_while_stopped() {
    let (controller, control) = spawn(Arc::new(SystemClock::new()));
    let seen = collect(&control, Duration::from_millis(300));
    assert!(
        seen.iter().filter(|(_, m)| *m == ControlMessage::Heartbeat).count() >= 2,
        "{seen:?}"
    );
    assert_eq!(controller.broadcast_display(), "heartbeat");
    controller.shutdown();
}

#[test]
fn devices_appear_then_expire() {
    let time = Arc::new(ManualClock::new(1_700_000_000_000));
    let (controller, _control) = spawn(time.clone());
    let to = controller.local_addr().expect("controller address");

    let device = UdpSocket::bind("127.0.0.1:0").expect("bind device");
    reply(&device, to, "lamp1: idle");
    assert!(wait_until(|| controller.counts().total == 1));
    assert_eq!(
        controller.counts(),
        Counts {
            connected: 1,
            disconnected: 0,
            total: 1
        }
    );

    time.advance(Duration::from_millis(501));
    assert_eq!(
        controller.counts(),
        Counts {
            connected: 0,
            disconnected: 1,
            total: 1
        }
    );

    reply(&device, to, "lamp1: running");
    assert!(wait_until(|| controller.counts().connected == 1));
    let snapshot = controller.device_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].task_status, "running");
    assert_eq!(snapshot[0].liveness, Liveness::Connected);

    controller.shutdown();
}

#[cfg(target_os = "linux")]
#[test]
fn devices_are_told_apart_by_address() {
    let time = Arc::new(ManualClock::new(1_700_000_000_000));
    let (controller, _control) = spawn(time.clone());
    let to = controller.local_addr().expect("controller address");

    let a = UdpSocket::bind("127.0.0.1:0").expect("bind a");
    let b = UdpSocket::bind("127.0.0.2:0").expect("bind b");
    reply(&a, to, "A1:idle");
    assert!(wait_until(|| controller.counts().total == 1));
    reply(&b, to, "B2: running");
    assert!(wait_until(|| controller.counts().total == 2));

    let snapshot = controller.device_snapshot();
    assert_eq!(snapshot[0].device_id, "A1");
    assert_eq!(snapshot[0].task_status, "idle");
    assert_eq!(snapshot[1].device_id, "B2");
    assert_eq!(snapshot[1].task_status, "running");
    assert_eq!(
        controller.counts(),
        Counts {
            connected: 2,
            disconnected: 0,
            total: 2
        }
    );

    time.advance(Duration::from_secs(3));
    assert_eq!(
        controller.counts(),
        Counts {
            connected: 0,
            disconnected: 2,
            total: 2
        }
    );

    controller.shutdown();
}

#[test]
fn show_run_ticks_each_second_then_stops_once() {
    let (controller, control) = spawn(Arc::new(SystemClock::new()));
    collect(&control, Duration::from_millis(100));

    assert!(controller.start(0).is_started());
    let running = collect(&control, Duration::from_millis(2_300));
    let ticks: Vec<(Instant, u32)> = running
        .iter()
        .filter_map(|(at, m)| match m {
            ControlMessage::Tick(ms) => Some((*at, *ms)),
            _ => None,
        })
        .collect();

    assert_eq!(ticks.len(), 3, "{running:?}");
    assert!(ticks[0].1 < 100);
    assert!(ticks.windows(2).all(|w| w[0].1 < w[1].1));
    let first_tick = running
        .iter()
        .position(|(_, m)| matches!(m, ControlMessage::Tick(_)))
        .expect("tick sent");
    assert!(
        running[first_tick..]
            .iter()
            .all(|(_, m)| *m != ControlMessage::Heartbeat),
        "heartbeat sent while running: {running:?}"
    );

    assert_eq!(
        controller.stop(),
        StopOutcome::Stopped { elapsed_secs: 2 }
    );
    assert_eq!(
        controller.stop(),
        StopOutcome::NotRunning { offset_secs: 2 }
    );
    let after = collect(&control, Duration::from_millis(300));
    let stops = after
        .iter()
        .filter(|(_, m)| *m == ControlMessage::Stop)
        .count();
    assert_eq!(stops, 1, "{after:?}");
    assert!(after.iter().any(|(_, m)| *m == ControlMessage::Heartbeat));
    assert!(!after.iter().any(|(_, m)| matches!(m, ControlMessage::Tick(_))));

    controller.shutdown();
}

#[test]
fn resume_continues_from_stop_offset() {
    let time = Arc::new(ManualClock::new(1_700_000_000_000));
    let (controller, control) = spawn(time.clone());

    controller.start(0);
    time.advance(Duration::from_millis(4_700));
    assert_eq!(controller.stop().resume_secs(), 4);
    collect(&control, Duration::from_millis(100));

    controller.start(controller.offset_secs());
    let first_tick = collect(&control, Duration::from_millis(100))
        .into_iter()
        .find_map(|(_, m)| match m {
            ControlMessage::Tick(ms) => Some(ms),
            _ => None,
        });
    assert_eq!(first_tick, Some(4_000));

    controller.shutdown();
}

#[test]
fn shutdown_is_prompt() {
    let (controller, _control) = spawn(Arc::new(SystemClock::new()));
    let start = Instant::now();
    controller.shutdown();
    assert!(start.elapsed() < Duration::from_secs(1));
}
