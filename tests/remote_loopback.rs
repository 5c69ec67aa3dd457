//! End-to-end client/server tests over loopback TCP: the SHA-256
//! handshake, the initial snapshot, VFO motion coalescing and the
//! spectrum stream.
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use rusthpsdr::client;
use rusthpsdr::discovery::{DeviceKind, Discovered, Protocol};
use rusthpsdr::radio::StateStore;
use rusthpsdr::server::RemoteServer;
use rusthpsdr::Error;

fn fake_radio() -> Discovered {
    Discovered {
        protocol: Protocol::P1,
        device: DeviceKind::HERMES,
        name: "Hermes".to_string(),
        software_version: 33,
        status: 2,
        mac: [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
        address: "192.168.1.22:1024".parse().unwrap(),
        interface_name: "eth0".to_string(),
        interface_addr: "192.168.1.2".parse().unwrap(),
        interface_netmask: "255.255.255.0".parse().unwrap(),
        use_tcp: false,
        use_routing: false,
        supported_receivers: 2,
        frequency_min: 0.0,
        frequency_max: 61_440_000.0,
    }
}

fn start_server(password: &str) -> (Arc<StateStore>, u16) {
    let store = StateStore::new(fake_radio());
    let server = RemoteServer::new(Arc::clone(&store), password, 0);
    let port = server.listen().unwrap();
    // Keep the server alive for the whole test process.
    std::mem::forget(server);
    (store, port)
}

fn wait_until(deadline: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn wrong_password_is_rejected() {
    let (_store, port) = start_server("secret");
    match client::connect("127.0.0.1", port, "wrong") {
        Err(Error::WrongPassword) => {}
        other => panic!("expected WrongPassword, got {other:?}"),
    }
}

#[test]
fn auth_and_snapshot() {
    let (store, port) = start_server("secret");
    let c = client::connect("127.0.0.1", port, "secret").unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || c.started.load(Ordering::SeqCst)),
        "snapshot did not complete"
    );
    // The snapshot mirrored the radio and both VFOs.
    let radio = c.radio.lock().unwrap().clone().unwrap();
    assert_eq!(radio.name, "Hermes");
    assert_eq!(radio.receivers, 2);
    let vfos = c.vfos.lock().unwrap();
    let want = store.vfos.lock().unwrap()[0].frequency;
    assert_eq!(vfos[0].frequency, want);
    drop(vfos);
    // Bands and memories arrived too.
    assert_eq!(
        c.bands.lock().unwrap().len(),
        rusthpsdr::band::BANDS + rusthpsdr::band::XVTRS
    );
    assert_eq!(c.memories.lock().unwrap().len(), rusthpsdr::store::NUM_MEMORYS);
    assert!(c.transmitter.lock().unwrap().is_some());
    c.close();
}

#[test]
fn vfo_steps_coalesce_into_one_command() {
    let (store, port) = start_server("secret");
    let c = client::connect("127.0.0.1", port, "secret").unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        c.started.load(Ordering::SeqCst)
    }));

    let (f0, step) = {
        let vfos = store.vfos.lock().unwrap();
        (vfos[0].frequency, vfos[0].step)
    };

    // A thousand wheel clicks inside one timer period...
    for _ in 0..1000 {
        c.update_vfo_step(0, 1);
    }
    c.flush_vfo();

    // ...arrive as exactly one CMD_STEP of 1000 steps.
    assert!(
        wait_until(Duration::from_secs(5), || {
            store.vfos.lock().unwrap()[0].frequency == f0 + 1000 * step
        }),
        "server never saw the coalesced step"
    );
    // And nothing more follows: a second flush with an empty
    // accumulator must not move the VFO again.
    c.flush_vfo();
    c.send_heartbeat();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(store.vfos.lock().unwrap()[0].frequency, f0 + 1000 * step);
    c.close();
}

#[test]
fn spectrum_stream_reaches_client() {
    let (store, port) = start_server("secret");
    let c = client::connect("127.0.0.1", port, "secret").unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        c.started.load(Ordering::SeqCst)
    }));

    c.set_spectrum(0, true);
    std::thread::sleep(Duration::from_millis(200));

    // Pump IQ through receiver 0 until the analyzer produces frames.
    let rx = &store.receivers[0];
    rx.start().unwrap();
    rx.displaying.store(true, Ordering::Relaxed);
    let width = rx.display.lock().unwrap().width;
    for _ in 0..8 {
        let env = store.rx_env(0);
        for i in 0..1024 {
            let ph = 2.0 * std::f64::consts::PI * (i as f64) / 64.0;
            rx.add_iq_samples(ph.cos() * 0.3, ph.sin() * 0.3, &env);
        }
    }

    assert!(
        wait_until(Duration::from_secs(5), || {
            c.receivers[0].lock().unwrap().pixel_samples.len() == width
        }),
        "spectrum frame never arrived"
    );
    c.close();
}

#[test]
fn remote_mode_and_drive_commands_apply() {
    let (store, port) = start_server("secret");
    let c = client::connect("127.0.0.1", port, "secret").unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        c.started.load(Ordering::SeqCst)
    }));

    c.set_mode(0, rusthpsdr::filter::Mode::Cwu);
    c.set_drive(37.5);
    c.set_volume(0, -6.0);

    assert!(wait_until(Duration::from_secs(5), || {
        store.vfos.lock().unwrap()[0].mode == rusthpsdr::filter::Mode::Cwu
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        let tx = store.transmitter.as_ref().unwrap();
        (tx.stream.lock().unwrap().drive - 37.5).abs() < 1e-6
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        (store.receivers[0].stream.lock().unwrap().volume - -6.0).abs() < 1e-6
    }));
    // The CW filter followed the mode change.
    let s = store.receivers[0].stream.lock().unwrap();
    assert!(s.filter_low > 0 && s.filter_high > s.filter_low);
    c.close();
}
