/*! HPSDR Protocol 1 ("old protocol") wire engine.

Low-rate engine, 48/96/192/384 kHz, UDP port 1024 with an optional
TCP fallback carrying the identical payload. Everything rides in
METIS frames: `EF FE 01 <endpoint> <seq u32>` plus two 512-byte HPSDR
USB frames. Each USB frame to the radio holds a 5-byte command-and-
control group and 63 (left, right, I, Q) 16-bit quadlets, so one
speaker/sidetone sample stays glued to its IQ pair all the way to the
hardware. Frames from the radio carry 24-bit IQ per receiver plus the
16-bit mic stream.

The C&C groups rotate round-robin so the whole radio state is
reprogrammed continuously; a reconfiguration that changes the
receiver count, PureSignal or dither must stop the stream first.
*/
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};

use crate::CancellationToken;
use crate::radio::{SpeakerPath, StateStore, WireSchedule};
use crate::transmitter::TxOutput;
use crate::Result;
use crate::vfo::{VFO_A, VFO_B};

/// Bytes in one HPSDR USB frame.
pub const USB_FRAME: usize = 512;

/// Bytes in one METIS UDP frame: header plus two USB frames.
pub const METIS_FRAME: usize = 8 + 2 * USB_FRAME;

/// Audio/IQ quadlets per USB frame.
pub const QUADLETS: usize = 63;

const EP2: u8 = 0x02;
const EP6: u8 = 0x06;

const SAMPLE_SCALE_24: f64 = 8_388_607.0;
const SAMPLE_SCALE_16: f64 = 32_767.0;

/// The C&C addresses the engine rotates through on EP2.
const COMMANDS: &[u8] = &[0x00, 0x02, 0x04, 0x06, 0x12, 0x14, 0x16, 0x1E, 0x20];

#[derive(Debug)]
enum Transport {
    Udp(UdpSocket, SocketAddr),
    Tcp(Mutex<TcpStream>),
}

impl Transport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        match self {
            Transport::Udp(s, to) => {
                s.send_to(frame, to)?;
            }
            Transport::Tcp(s) => {
                use std::io::Write;
                s.lock()?.write_all(frame)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Ep2Builder {
    /// Pending quadlets of the current USB frame.
    quadlets: Vec<u8>,
    /// Assembled USB frames waiting for a METIS partner.
    frames: Vec<[u8; USB_FRAME]>,
    command_index: usize,
}

/// Protocol 1 engine.
pub struct Protocol1 {
    store: Arc<StateStore>,
    transport: Transport,
    local: UdpSocket,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
    tx_seq: AtomicU32,
    rx_seq: AtomicU32,
    have_rx_seq: AtomicBool,
    /// PTT/dot/dash bits last seen from the radio.
    pub radio_ptt: AtomicBool,
    /// Dot paddle state from the radio.
    pub radio_dot: AtomicBool,
    /// Dash paddle state from the radio.
    pub radio_dash: AtomicBool,
    mercury_version: AtomicU8,
    /// Drive mirrored out of the transmitter so the C&C builder never
    /// touches the tx stream lock from inside a sample callback.
    drive_cache: AtomicU8,
    /// Same trick for the RX0 sample rate: the speaker path runs
    /// with the rx stream lock held.
    rate_cache: AtomicU32,
    ep2: Mutex<Ep2Builder>,
}

impl std::fmt::Debug for Protocol1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol1")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl Protocol1 {
    /// Create the engine for the store's radio. Binds the local UDP
    /// socket (or connects TCP when the radio was found that way).
    pub fn new(store: Arc<StateStore>) -> Result<Arc<Self>> {
        let radio_addr = store.radio.address;
        let local = UdpSocket::bind(("0.0.0.0", 0))?;
        local.set_read_timeout(Some(std::time::Duration::from_millis(100)))?;
        let transport = if store.radio.use_tcp {
            let stream = TcpStream::connect(radio_addr)?;
            stream.set_nodelay(true)?;
            Transport::Tcp(Mutex::new(stream))
        } else {
            Transport::Udp(local.try_clone()?, radio_addr)
        };
        Ok(Arc::new(Self {
            store,
            transport,
            local,
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            tx_seq: AtomicU32::new(0),
            rx_seq: AtomicU32::new(0),
            have_rx_seq: AtomicBool::new(false),
            radio_ptt: AtomicBool::new(false),
            radio_dot: AtomicBool::new(false),
            radio_dash: AtomicBool::new(false),
            mercury_version: AtomicU8::new(0),
            drive_cache: AtomicU8::new(0),
            rate_cache: AtomicU32::new(48_000),
            ep2: Mutex::new(Ep2Builder::default()),
        }))
    }

    /// Start the stream: prime the radio with two command frames,
    /// send the start datagram and spawn the reader thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let token = CancellationToken::new();
        *self.cancel.lock()? = token.clone();

        // Two full METIS frames program rates and frequencies before
        // any sample data flows.
        self.send_command_frames()?;
        self.send_start_stop(true)?;

        let me = Arc::clone(self);
        std::thread::Builder::new()
            .name("P1 reader".to_string())
            .spawn(move || me.reader_loop(token))?;
        info!("protocol1: started towards {}", self.store.radio.address);
        Ok(())
    }

    /// Stop the stream and drain.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.send_start_stop(false)?;
        self.cancel.lock()?.cancel();
        let mut ep2 = self.ep2.lock()?;
        ep2.quadlets.clear();
        ep2.frames.clear();
        self.have_rx_seq.store(false, Ordering::SeqCst);
        info!("protocol1: stopped");
        Ok(())
    }

    fn send_start_stop(&self, start: bool) -> Result<()> {
        let mut buf = [0u8; 64];
        buf[0] = 0xEF;
        buf[1] = 0xFE;
        buf[2] = 0x04;
        buf[3] = u8::from(start);
        self.transport.send(&buf)
    }

    /// Build the C&C group for one USB frame and advance the
    /// rotation.
    fn next_command(&self, ep2: &mut Ep2Builder) -> [u8; 5] {
        let store = &self.store;
        let mox = store.flags.transmitting();
        let c0 = COMMANDS[ep2.command_index % COMMANDS.len()];
        ep2.command_index += 1;
        // The conventional C0 values already carry the address in
        // bits 7..1; bit 0 is MOX. One store lock at a time in here:
        // this runs with an engine stream lock already held.
        let mut cc = [c0 | u8::from(mox), 0, 0, 0, 0];

        match c0 {
            0x00 => {
                if let Ok(rs) = store.receivers[0].stream.try_lock() {
                    self.rate_cache.store(rs.sample_rate, Ordering::Relaxed);
                }
                let rate = self.rate_cache.load(Ordering::Relaxed);
                cc[1] = match rate {
                    96_000 => 0x01,
                    192_000 => 0x02,
                    384_000 => 0x03,
                    _ => 0x00,
                };
                let band_index = store.vfos.lock().unwrap_or_else(|e| e.into_inner())[VFO_A].band;
                {
                    let bands = store.bands.lock().unwrap_or_else(|e| e.into_inner());
                    let band = &bands[band_index];
                    // Open collector outputs follow the band.
                    cc[2] = (if mox { band.oc_tx } else { band.oc_rx }) << 1;
                    cc[3] = band.alex_attenuation & 0x03;
                }
                let nrx = store.local_receivers as u8 - 1;
                cc[4] = (nrx << 3) | (u8::from(store.flags.duplex.load(Ordering::Relaxed)) << 2);
            }
            0x02 => {
                let tx = store.tx_vfo();
                let f = store.vfos.lock().unwrap_or_else(|e| e.into_inner())[tx].tx_frequency();
                cc[1..5].copy_from_slice(&(f as u32).to_be_bytes());
            }
            0x04 => {
                let f = store.vfos.lock().unwrap_or_else(|e| e.into_inner())[VFO_A].rx_frequency();
                cc[1..5].copy_from_slice(&(f as u32).to_be_bytes());
            }
            0x06 => {
                let f = store.vfos.lock().unwrap_or_else(|e| e.into_inner())[VFO_B].rx_frequency();
                cc[1..5].copy_from_slice(&(f as u32).to_be_bytes());
            }
            0x12 => {
                // The sample path may already hold the tx stream
                // lock, so refresh the cache opportunistically.
                if let Some(t) = store.transmitter.as_ref()
                    && let Ok(ts) = t.stream.try_lock()
                {
                    self.drive_cache
                        .store(((ts.drive * 2.55).round() as i64).clamp(0, 255) as u8, Ordering::Relaxed);
                }
                cc[1] = self.drive_cache.load(Ordering::Relaxed);
            }
            0x14 => {
                // Step attenuator ADC0, preamp bits.
                let adc = store.adc.lock().unwrap_or_else(|e| e.into_inner());
                cc[4] = (adc[0].attenuation.clamp(0, 31)) as u8 | 0x20;
            }
            0x16 => {
                let adc = store.adc.lock().unwrap_or_else(|e| e.into_inner());
                cc[1] = (adc[1].attenuation.clamp(0, 31)) as u8 | 0x20;
            }
            0x1E => {
                let settings = store.settings.lock().unwrap_or_else(|e| e.into_inner());
                cc[1] = u8::from(store.flags.cw_keyer_internal.load(Ordering::Relaxed));
                cc[2] = settings.cw_keyer_sidetone_volume;
                cc[3] = settings.cw_keyer_speed as u8;
            }
            0x20 => {
                let settings = store.settings.lock().unwrap_or_else(|e| e.into_inner());
                let freq = settings.cw_keyer_sidetone_frequency;
                cc[1] = (freq / 10) as u8;
                cc[2] = 10; // hang time, ms, low byte
            }
            _ => {}
        }
        cc
    }

    /// Append one (left, right, i, q) quadlet; ships METIS frames as
    /// they fill.
    fn queue_quadlet(&self, left: i16, right: i16, i: i16, q: i16) {
        let Ok(mut ep2) = self.ep2.lock() else {
            return;
        };
        ep2.quadlets.extend_from_slice(&left.to_be_bytes());
        ep2.quadlets.extend_from_slice(&right.to_be_bytes());
        ep2.quadlets.extend_from_slice(&i.to_be_bytes());
        ep2.quadlets.extend_from_slice(&q.to_be_bytes());
        if ep2.quadlets.len() == QUADLETS * 8 {
            let cc = self.next_command(&mut ep2);
            let mut frame = [0u8; USB_FRAME];
            frame[0] = 0x7F;
            frame[1] = 0x7F;
            frame[2] = 0x7F;
            frame[3..8].copy_from_slice(&cc);
            frame[8..8 + QUADLETS * 8].copy_from_slice(&ep2.quadlets);
            ep2.quadlets.clear();
            ep2.frames.push(frame);
            if ep2.frames.len() == 2 {
                let f1 = ep2.frames[0];
                let f2 = ep2.frames[1];
                ep2.frames.clear();
                drop(ep2);
                if let Err(e) = self.send_metis(EP2, &f1, &f2) {
                    warn!("protocol1: send failed: {e}");
                }
            }
        }
    }

    fn send_metis(&self, endpoint: u8, f1: &[u8; USB_FRAME], f2: &[u8; USB_FRAME]) -> Result<()> {
        let mut frame = [0u8; METIS_FRAME];
        frame[0] = 0xEF;
        frame[1] = 0xFE;
        frame[2] = 0x01;
        frame[3] = endpoint;
        let seq = self.tx_seq.fetch_add(1, Ordering::SeqCst);
        frame[4..8].copy_from_slice(&seq.to_be_bytes());
        frame[8..8 + USB_FRAME].copy_from_slice(f1);
        frame[8 + USB_FRAME..].copy_from_slice(f2);
        self.transport.send(&frame)
    }

    fn send_command_frames(&self) -> Result<()> {
        // Fill two METIS frames with silence so a whole C&C rotation
        // goes out before the stream starts.
        for _ in 0..2 * QUADLETS * 2 {
            self.queue_quadlet(0, 0, 0, 0);
        }
        Ok(())
    }

    fn reader_loop(self: Arc<Self>, token: CancellationToken) {
        let mut buf = [0u8; 2048];
        while !token.is_cancelled() {
            let n = match self.local.recv(&mut buf) {
                Ok(n) => n,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    // Peer error: back to idle, the controller re-arms.
                    error!("protocol1: read error: {e}");
                    break;
                }
            };
            if n == METIS_FRAME && buf[0] == 0xEF && buf[1] == 0xFE && buf[2] == 0x01 {
                let seq = u32::from_be_bytes(buf[4..8].try_into().unwrap());
                if self.have_rx_seq.swap(true, Ordering::Relaxed)
                    && seq != self.rx_seq.load(Ordering::Relaxed)
                {
                    self.store.flags.sequence_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("protocol1: sequence error, got {seq}");
                }
                self.rx_seq.store(seq.wrapping_add(1), Ordering::Relaxed);
                if buf[3] == EP6 {
                    let (f1, f2) = buf[8..].split_at(USB_FRAME);
                    self.parse_usb_frame(&f1[..USB_FRAME]);
                    self.parse_usb_frame(&f2[..USB_FRAME]);
                }
            }
        }
        debug!("protocol1: reader exits");
    }

    /// One EP6 USB frame: C&C group then per-receiver 24-bit IQ plus
    /// the 16-bit mic stream.
    fn parse_usb_frame(&self, frame: &[u8]) {
        if frame[0] != 0x7F || frame[1] != 0x7F || frame[2] != 0x7F {
            warn!("protocol1: USB frame out of sync");
            return;
        }
        let c0 = frame[3];
        self.radio_ptt.store(c0 & 0x01 != 0, Ordering::Relaxed);
        self.radio_dash.store(c0 & 0x02 != 0, Ordering::Relaxed);
        self.radio_dot.store(c0 & 0x04 != 0, Ordering::Relaxed);
        self.store
            .flags
            .radio_ptt
            .store(c0 & 0x01 != 0, Ordering::Relaxed);

        match c0 >> 3 {
            0 => {
                self.store
                    .flags
                    .adc0_overload
                    .store(frame[4] & 0x01 != 0, Ordering::Relaxed);
                self.mercury_version.store(frame[7], Ordering::Relaxed);
            }
            1 => {
                let exciter = u16::from_be_bytes([frame[4], frame[5]]);
                self.store
                    .flags
                    .exciter_power
                    .store(u32::from(exciter), Ordering::Relaxed);
            }
            2 => {
                // Alex forward/reverse power, fed to SWR protection.
                let fwd = u16::from_be_bytes([frame[4], frame[5]]);
                let rev = u16::from_be_bytes([frame[6], frame[7]]);
                if let Some(tx) = &self.store.transmitter {
                    tx.update_swr(
                        f64::from(fwd) / 100.0,
                        f64::from(rev) / 100.0,
                        self.store.flags.tune.load(Ordering::Relaxed),
                    );
                }
            }
            _ => {}
        }

        let transmitting = self.store.flags.transmitting();
        let puresignal = self
            .store
            .transmitter
            .as_ref()
            .and_then(|t| t.stream.lock().ok().map(|s| s.puresignal))
            .unwrap_or(false);
        let nrx = self.store.local_receivers;
        let bytes_per_sample = 6 * nrx + 2;
        let nsamples = (USB_FRAME - 8) / bytes_per_sample;
        let mut pos = 8;
        for _ in 0..nsamples {
            for r in 0..nrx {
                let i = i24(&frame[pos..]) / SAMPLE_SCALE_24;
                let q = i24(&frame[pos + 3..]) / SAMPLE_SCALE_24;
                pos += 6;
                // During PureSignal TX the first two DDCs carry the TX
                // and RX feedback taps instead of antenna signal.
                let rx = if transmitting && puresignal && r < 2 {
                    self.store.receivers.last()
                } else {
                    self.store.receivers.get(r)
                };
                if let Some(rx) = rx {
                    let env = self.store.rx_env(rx.id);
                    rx.add_iq_samples(i, q, &env);
                }
            }
            let mic = i16::from_be_bytes([frame[pos], frame[pos + 1]]);
            pos += 2;
            if let Some(tx) = &self.store.transmitter {
                let env = self.store.tx_env(self);
                tx.add_mic_sample(mic, &env);
            }
        }
    }
}

fn i24(b: &[u8]) -> f64 {
    let v = (i32::from(b[0] as i8) << 16) | (i32::from(b[1]) << 8) | i32::from(b[2]);
    f64::from(v)
}

impl TxOutput for Protocol1 {
    /// TX IQ plus its synchronous sidetone triplet.
    fn iq_samples(&self, i: f64, q: f64, sidetone: f64) {
        let side = (sidetone * SAMPLE_SCALE_16 * 0.25) as i16;
        self.queue_quadlet(
            side,
            side,
            (i * SAMPLE_SCALE_16) as i16,
            (q * SAMPLE_SCALE_16) as i16,
        );
    }
}

impl SpeakerPath for Protocol1 {
    /// RX speaker audio; IQ rails stay zero during RX.
    fn audio_samples(&self, left: i16, right: i16) {
        self.queue_quadlet(left, right, 0, 0);
    }
}

impl WireSchedule for Protocol1 {
    // The C&C rotation reprograms everything continuously; explicit
    // scheduling is a no-op here.
}

/// Restart after a fatal read error: full drain, then start again.
/// Reconfigurations that change the receiver count, PureSignal or
/// dither also funnel through here.
pub fn restart(engine: &Arc<Protocol1>) -> Result<()> {
    engine.stop()?;
    std::thread::sleep(std::time::Duration::from_millis(100));
    engine.start()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DeviceKind, Discovered, Protocol};

    fn fake_radio(addr: SocketAddr) -> Discovered {
        Discovered {
            protocol: Protocol::P1,
            device: DeviceKind::HERMES,
            name: "Hermes".to_string(),
            software_version: 33,
            status: 2,
            mac: [0, 1, 2, 3, 4, 5],
            address: addr,
            interface_name: "lo".to_string(),
            interface_addr: "127.0.0.1".parse().unwrap(),
            interface_netmask: "255.0.0.0".parse().unwrap(),
            use_tcp: false,
            use_routing: true,
            supported_receivers: 2,
            frequency_min: 0.0,
            frequency_max: 61_440_000.0,
        }
    }

    #[test]
    fn start_sends_commands_then_start_datagram() {
        let radio = UdpSocket::bind("127.0.0.1:0").unwrap();
        radio
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let store = StateStore::new(fake_radio(radio.local_addr().unwrap()));
        let engine = Protocol1::new(store).unwrap();
        engine.start().unwrap();

        let mut buf = [0u8; 2048];
        let mut metis = 0;
        let mut start_seen = false;
        for _ in 0..3 {
            let n = radio.recv(&mut buf).unwrap();
            match (n, buf[2]) {
                (METIS_FRAME, 0x01) => {
                    assert_eq!(&buf[..2], &[0xEF, 0xFE]);
                    assert_eq!(buf[3], EP2);
                    // USB frames carry the sync pattern.
                    assert_eq!(&buf[8..11], &[0x7F, 0x7F, 0x7F]);
                    metis += 1;
                }
                (64, 0x04) => {
                    start_seen = true;
                    assert_eq!(buf[3], 1);
                }
                other => panic!("unexpected datagram {other:?}"),
            }
        }
        assert_eq!(metis, 2);
        assert!(start_seen);
        engine.stop().unwrap();
    }

    #[test]
    fn tx_sequence_numbers_increment() {
        let radio = UdpSocket::bind("127.0.0.1:0").unwrap();
        radio
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let store = StateStore::new(fake_radio(radio.local_addr().unwrap()));
        let engine = Protocol1::new(store).unwrap();
        // Ship three METIS frames' worth of audio quadlets.
        for _ in 0..QUADLETS * 6 {
            engine.audio_samples(0, 0);
        }
        let mut buf = [0u8; 2048];
        let mut seqs = Vec::new();
        for _ in 0..3 {
            let n = radio.recv(&mut buf).unwrap();
            assert_eq!(n, METIS_FRAME);
            seqs.push(u32::from_be_bytes(buf[4..8].try_into().unwrap()));
        }
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn ep6_frame_feeds_receivers_and_mic() {
        let radio = UdpSocket::bind("127.0.0.1:0").unwrap();
        let store = StateStore::new(fake_radio(radio.local_addr().unwrap()));
        for rx in &store.receivers {
            rx.start().unwrap();
        }
        let engine = Protocol1::new(Arc::clone(&store)).unwrap();

        // Hand-build one EP6 USB frame with a known IQ pattern.
        let mut frame = [0u8; USB_FRAME];
        frame[0] = 0x7F;
        frame[1] = 0x7F;
        frame[2] = 0x7F;
        frame[3] = 0x01; // PTT from the radio
        let mut pos = 8;
        let nrx = store.local_receivers;
        let nsamples = (USB_FRAME - 8) / (6 * nrx + 2);
        for _ in 0..nsamples {
            for _ in 0..nrx {
                frame[pos..pos + 3].copy_from_slice(&[0x40, 0x00, 0x00]); // I
                frame[pos + 3..pos + 6].copy_from_slice(&[0xC0, 0x00, 0x00]); // -I
                pos += 6;
            }
            frame[pos..pos + 2].copy_from_slice(&100i16.to_be_bytes());
            pos += 2;
        }
        engine.parse_usb_frame(&frame);

        assert!(store.flags.radio_ptt.load(Ordering::Relaxed));
        let s = store.receivers[0].stream.lock().unwrap();
        // 0x400000 / 0x7FFFFF ≈ 0.5
        assert!((s.ring[0] - 0.5).abs() < 1e-3);
        assert!((s.ring[1] + 0.5).abs() < 1e-3);
    }
}
/* vim: textwidth=80
 */
