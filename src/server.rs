/*! Remote-operation server.

Runs on the machine physically attached to the radio. One TCP client
at a time; the handshake is a SHA-256 challenge over a 64-byte nonce,
the protocol version and the shared password. After authentication
the server unloads a full state snapshot, then settles into a
dispatch loop that applies typed commands to the state store while
the engines stream spectrum and audio back through the send-mutexed
frame writer.
*/
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::frame::{FrameWriter, Header, SESSION_READ_TIMEOUT, read_exact, read_header};
use crate::messages::{
    self, AUDIO_DATA_SIZE, BodyLen, CLIENT_SERVER_VERSION, MAX_PAYLOAD, MessageType, SPECTRUM_DATA_SIZE,
};
use crate::radio::{RemoteSink, StateStore, UiEvent};
use crate::receiver::RxState;
use crate::vfo::{VFO_A, VFO_B};
use crate::{Error, Result};

/// Default listen port.
pub const LISTEN_PORT: u16 = 50_000;

/// Spectrum/audio slots: receivers 0..7, slot 8 is the transmitter.
pub const SPECTRUM_SLOTS: usize = 10;

/// Mic ring: 200 ms of 48 kHz audio.
pub const MIC_RING_SIZE: usize = 9600;

/// Below this fill the ring keeps returning silence after an
/// underflow, so replay restarts with some cushion.
pub const MIC_RING_LOW: usize = 1024;

/// Compute the expected challenge response: SHA-256 over
/// `nonce ‖ version(be32) ‖ password`.
#[must_use]
pub fn challenge_digest(nonce: &[u8; 64], password: &str) -> [u8; 32] {
    let mut pwd = password.as_bytes();
    if pwd.len() > 50 {
        pwd = &pwd[..50];
    }
    let mut h = Sha256::new();
    h.update(nonce);
    h.update(CLIENT_SERVER_VERSION.to_be_bytes());
    h.update(pwd);
    h.finalize().into()
}

/// SPSC microphone ring fed by INFO_TXAUDIO, drained by the TX
/// engine. Underflow yields silence until the low-water mark refills.
#[derive(Debug)]
pub struct MicRing {
    buf: Mutex<Vec<i16>>,
    inpt: AtomicUsize,
    outpt: AtomicUsize,
    empty: AtomicBool,
}

impl Default for MicRing {
    fn default() -> Self {
        Self {
            buf: Mutex::new(vec![0; MIC_RING_SIZE]),
            inpt: AtomicUsize::new(0),
            outpt: AtomicUsize::new(0),
            empty: AtomicBool::new(true),
        }
    }
}

impl MicRing {
    fn available(&self) -> usize {
        (self.inpt.load(Ordering::Acquire) + MIC_RING_SIZE - self.outpt.load(Ordering::Acquire))
            % MIC_RING_SIZE
    }

    /// Producer: queue one sample, dropping when full.
    pub fn push(&self, sample: i16) {
        let inpt = self.inpt.load(Ordering::Relaxed);
        let newpt = (inpt + 1) % MIC_RING_SIZE;
        if newpt == self.outpt.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut b) = self.buf.lock() {
            b[inpt] = sample;
        }
        self.inpt.store(newpt, Ordering::Release);
    }

    /// Consumer: one sample, or silence while refilling.
    #[must_use]
    pub fn pop(&self) -> i16 {
        let avail = self.available();
        if avail == 0 {
            self.empty.store(true, Ordering::Relaxed);
        }
        if self.empty.load(Ordering::Relaxed) && avail < MIC_RING_LOW {
            return 0;
        }
        self.empty.store(false, Ordering::Relaxed);
        let outpt = self.outpt.load(Ordering::Relaxed);
        let s = self.buf.lock().map(|b| b[outpt]).unwrap_or(0);
        self.outpt.store((outpt + 1) % MIC_RING_SIZE, Ordering::Release);
        s
    }

    /// Throw everything away (session end).
    pub fn wipe(&self) {
        self.outpt
            .store(self.inpt.load(Ordering::Acquire), Ordering::Release);
        self.empty.store(true, Ordering::Relaxed);
    }
}

/// One authenticated client.
pub struct ClientSession {
    writer: FrameWriter<TcpStream>,
    /// Per-slot spectrum streaming gate.
    pub send_spectrum: [AtomicBool; SPECTRUM_SLOTS],
    running: AtomicBool,
    mic: MicRing,
    audio_accum: [Mutex<Vec<i16>>; 2],
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl ClientSession {
    fn new(stream: TcpStream) -> Result<Self> {
        Ok(Self {
            writer: FrameWriter::new(stream),
            send_spectrum: std::array::from_fn(|_| AtomicBool::new(false)),
            running: AtomicBool::new(true),
            mic: MicRing::default(),
            audio_accum: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
        })
    }

    fn send(&self, msg: &[u8]) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        if self.writer.send(msg).is_err() {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}

/// The server.
pub struct RemoteServer {
    store: Arc<StateStore>,
    password: String,
    port: u16,
    running: Arc<AtomicBool>,
    session: Mutex<Option<Arc<ClientSession>>>,
}

impl std::fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteServer").field("port", &self.port).finish()
    }
}

struct SessionSink {
    session: Arc<ClientSession>,
    store: Arc<StateStore>,
}

impl RemoteSink for SessionSink {
    fn rx_audio(&self, rx_id: usize, left: i16, right: i16) {
        let Some(accum) = self.session.audio_accum.get(rx_id) else {
            return;
        };
        let full = {
            let Ok(mut a) = accum.lock() else { return };
            a.push(left);
            a.push(right);
            if a.len() >= AUDIO_DATA_SIZE * 2 {
                Some(std::mem::take(&mut *a))
            } else {
                None
            }
        };
        if let Some(samples) = full {
            let msg = messages::RxAudioData {
                rx: rx_id as u8,
                numsamples: AUDIO_DATA_SIZE as u16,
                samples,
            };
            self.session.send(&msg.encode());
        }
    }

    fn spectrum_ready(&self, rx_id: usize) {
        if rx_id < SPECTRUM_SLOTS && self.session.send_spectrum[rx_id].load(Ordering::Relaxed) {
            if let Err(e) = send_spectrum(&self.store, &self.session, rx_id) {
                if matches!(e, Error::Fatal(_)) {
                    // The one genuinely fatal path.
                    panic!("{e}");
                }
                debug!("spectrum send: {e}");
            }
        }
    }

    fn mic_sample(&self) -> Option<f64> {
        Some(f64::from(self.session.mic.pop()) * 0.000_030_51)
    }
}

/// Build and send one INFO_SPECTRUM for `rx_id`.
fn send_spectrum(store: &Arc<StateStore>, session: &Arc<ClientSession>, rx_id: usize) -> Result<()> {
    let Some(rx) = store.receivers.iter().find(|r| r.id == rx_id) else {
        return Ok(());
    };
    let vfos = store.vfos.lock()?;
    let mut data = messages::SpectrumData {
        id: rx_id as u8,
        vfo_a_freq: vfos[VFO_A].frequency,
        vfo_b_freq: vfos[VFO_B].frequency,
        vfo_a_ctun_freq: vfos[VFO_A].ctun_frequency,
        vfo_b_ctun_freq: vfos[VFO_B].ctun_frequency,
        vfo_a_offset: vfos[VFO_A].offset,
        vfo_b_offset: vfos[VFO_B].offset,
        ..messages::SpectrumData::default()
    };
    drop(vfos);

    {
        let d = rx.display.lock()?;
        data.zoom = d.zoom as u8;
        data.pan = d.pan as u16;
        data.width = d.width as u16;
        data.meter = d.meter;
        let px = d.analyzer.pixel_samples();
        let n = d.width.min(SPECTRUM_DATA_SIZE);
        data.samples = px
            .iter()
            .skip(d.pan)
            .take(n)
            .map(|&v| v as i32)
            .collect();
    }
    if let Some(tx) = &store.transmitter
        && let Ok(s) = tx.stream.try_lock()
    {
        data.alc = s.alc;
        data.fwd = s.fwd;
        data.swr = s.swr;
    }

    let payload = messages::SpectrumData::FIXED_LEN + 2 * data.samples.len();
    if payload > MAX_PAYLOAD {
        return Err(Error::Fatal("spectrum payload too large".to_string()));
    }
    session.send(&data.encode());
    Ok(())
}

impl RemoteServer {
    /// Create a server; `listen()` starts it.
    #[must_use]
    pub fn new(store: Arc<StateStore>, password: &str, port: u16) -> Arc<Self> {
        Arc::new(Self {
            store,
            password: password.to_string(),
            port,
            running: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        })
    }

    /// Bind the listen socket and spawn the accept thread. Returns
    /// the actual bound port (useful with port 0).
    pub fn listen(self: &Arc<Self>) -> Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        let port = listener.local_addr()?.port();
        self.running.store(true, Ordering::SeqCst);
        let me = Arc::clone(self);
        std::thread::Builder::new()
            .name("HPSDR listen".to_string())
            .spawn(move || me.accept_loop(listener))?;
        info!("server: listening on port {port}");
        Ok(port)
    }

    /// Stop accepting and drop the current client.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut g) = self.session.lock()
            && let Some(s) = g.take()
        {
            s.running.store(false, Ordering::Relaxed);
        }
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        while self.running.load(Ordering::SeqCst) {
            let (stream, peer) = match listener.accept() {
                Ok(x) => x,
                Err(e) => {
                    warn!("server: accept failed: {e}");
                    break;
                }
            };
            info!("server: client connected from {peer}");
            if let Err(e) = self.run_session(stream) {
                info!("server: session ended: {e}");
            } else {
                info!("server: session ended");
            }
            // Whatever happened, leave RX in a sane state.
            self.store.flags.mox.store(false, Ordering::Relaxed);
            self.store.set_remote(None);
            *self.session.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
        debug!("server: accept loop exits");
    }

    fn run_session(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_read_timeout(Some(SESSION_READ_TIMEOUT))?;
        stream.set_nodelay(true)?;

        // Challenge.
        let mut nonce = [0u8; 64];
        rand::rng().fill_bytes(&mut nonce);
        stream.write_all(&nonce)?;

        let expected = challenge_digest(&nonce, &self.password);
        let mut response = [0u8; 32];
        read_exact(&mut stream, &mut response)?;

        if self.password.len() < 5 || response != expected {
            warn!("server: wrong password from client");
            stream.write_all(&[0x00])?;
            return Err(Error::WrongPassword);
        }
        stream.write_all(&[0x7F])?;

        let session = Arc::new(ClientSession::new(stream.try_clone()?)?);
        *self.session.lock()? = Some(Arc::clone(&session));

        // Remote operation cannot tolerate radio-local keying.
        let saved_keyer = self.store.flags.cw_keyer_internal.swap(false, Ordering::SeqCst);
        self.store.schedule_transmit_specific();

        let sink: Arc<dyn RemoteSink> = Arc::new(SessionSink {
            session: Arc::clone(&session),
            store: Arc::clone(&self.store),
        });
        self.store.set_remote(Some(sink));

        self.send_snapshot(&session);
        self.spawn_periodic(&session);

        let r = self.dispatch_loop(&mut stream, &session);

        session.running.store(false, Ordering::Relaxed);
        session.mic.wipe();
        self.store
            .flags
            .cw_keyer_internal
            .store(saved_keyer, Ordering::SeqCst);
        self.store.schedule_transmit_specific();
        r
    }

    /// The initial snapshot, in the canonical order: RADIO, ADC×2,
    /// DAC, Var filters, receivers (feedback tap included), VFO A/B,
    /// bands and bandstacks, memories, TRANSMITTER, START_RADIO.
    fn send_snapshot(&self, session: &Arc<ClientSession>) {
        let snap = self.store.snapshot();
        session.send(&snap.radio.encode());
        for a in &snap.adc {
            session.send(&a.encode());
        }
        session.send(&snap.dac.encode());
        for (mode, slot, (low, high)) in &snap.var_filters {
            session.send(&messages::header_only(
                MessageType::CmdFilterVar,
                *mode,
                *slot,
                crate::codec::pack_short(*low),
                crate::codec::pack_short(*high),
            ));
        }
        for r in &snap.receivers {
            session.send(&r.encode());
        }
        for v in &snap.vfos {
            session.send(&v.encode());
        }
        for b in &snap.bands {
            session.send(&b.encode());
        }
        for b in &snap.bandstacks {
            session.send(&b.encode());
        }
        for m in &snap.memories {
            session.send(&m.encode());
        }
        if let Some(t) = &snap.transmitter {
            session.send(&t.encode());
        }
        session.send(&messages::header_only(MessageType::CmdStartRadio, 0, 0, 0, 0));
    }

    /// Every 150 ms: INFO_DISPLAY, plus INFO_PS while PureSignal is
    /// on.
    fn spawn_periodic(&self, session: &Arc<ClientSession>) {
        let session = Arc::clone(session);
        let store = Arc::clone(&self.store);
        let r = std::thread::Builder::new()
            .name("server periodic".to_string())
            .spawn(move || {
                let mut tick = 0u32;
                while session.running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(150));
                    tick += 1;
                    if tick % 10 == 0 {
                        // Empty heartbeat every 1.5 s; the client's
                        // 30-second read timeout rides on these.
                        session.send(&messages::header_only(
                            MessageType::CmdHeartbeat,
                            0,
                            0,
                            0,
                            0,
                        ));
                    }
                    let flags = &store.flags;
                    let display = messages::DisplayData {
                        adc0_overload: flags.adc0_overload.load(Ordering::Relaxed),
                        adc1_overload: flags.adc1_overload.load(Ordering::Relaxed),
                        high_swr_seen: store
                            .transmitter
                            .as_ref()
                            .map(|t| t.high_swr_seen.load(Ordering::Relaxed))
                            .unwrap_or(false),
                        tx_fifo_overrun: flags.tx_fifo_overrun.load(Ordering::Relaxed),
                        tx_fifo_underrun: flags.tx_fifo_underrun.load(Ordering::Relaxed),
                        tx_inhibit: flags.tx_inhibit.load(Ordering::Relaxed),
                        exciter_power: flags.exciter_power.load(Ordering::Relaxed) as i32,
                        adc0: flags.adc0_level.load(Ordering::Relaxed) as i32,
                        adc1: flags.adc1_level.load(Ordering::Relaxed) as i32,
                        sequence_errors: flags.sequence_errors.load(Ordering::Relaxed) as i32,
                    };
                    session.send(&display.encode());

                    let ps_on = store
                        .transmitter
                        .as_ref()
                        .and_then(|t| t.stream.lock().ok().map(|s| s.puresignal))
                        .unwrap_or(false);
                    if ps_on
                        && let Some(tx) = &store.transmitter
                        && let Ok(s) = tx.stream.lock()
                    {
                        let ps = messages::PsData {
                            psinfo: s.dsp.ps_info(),
                            attenuation: 0,
                            ps_getpk: s.dsp.ps_getpk(),
                            ps_getmx: s.dsp.ps_getmx(),
                        };
                        drop(s);
                        session.send(&ps.encode());
                    }
                }
            });
        if let Err(e) = r {
            warn!("server: periodic thread: {e}");
        }
    }

    fn dispatch_loop(&self, stream: &mut TcpStream, session: &Arc<ClientSession>) -> Result<()> {
        while session.running.load(Ordering::Relaxed) && self.running.load(Ordering::SeqCst) {
            let header = read_header(stream)?;
            let Some(kind) = MessageType::from_u16(header.kind) else {
                warn!("server: unknown message type {}", header.kind);
                continue;
            };
            let body = match kind.body_len() {
                BodyLen::None => Vec::new(),
                BodyLen::Fixed(n) => {
                    let mut b = vec![0u8; n];
                    read_exact(stream, &mut b)?;
                    b
                }
                BodyLen::Variable => {
                    let mut b = vec![0u8; usize::from(header.s1)];
                    read_exact(stream, &mut b)?;
                    b
                }
            };
            self.apply(kind, &header, &body, session)?;
        }
        Ok(())
    }

    /// Apply one client command to the store.
    fn apply(
        &self,
        kind: MessageType,
        h: &Header,
        body: &[u8],
        session: &Arc<ClientSession>,
    ) -> Result<()> {
        use MessageType::*;
        let store = &self.store;
        let flags = &store.flags;
        match kind {
            CmdHeartbeat => {}
            InfoTxAudio => {
                // Mic samples go straight to the ring, not through
                // the command queue.
                let audio = messages::TxAudioData::decode(body);
                for i in 0..usize::from(audio.numsamples).min(audio.samples.len()) {
                    session.mic.push(audio.samples[i]);
                }
            }
            CmdSpectrum => {
                let id = usize::from(h.b1);
                if id < SPECTRUM_SLOTS {
                    session.send_spectrum[id].store(h.b2 != 0, Ordering::Relaxed);
                }
            }
            CmdMox | CmdPtt => {
                flags.mox.store(h.b1 != 0, Ordering::Relaxed);
                if let Some(tx) = &store.transmitter {
                    tx.set_transmit(h.b1 != 0)?;
                }
            }
            CmdTune => flags.tune.store(h.b1 != 0, Ordering::Relaxed),
            CmdVox => flags.vox.store(h.b1 != 0, Ordering::Relaxed),
            CmdDup => flags.duplex.store(h.b1 != 0, Ordering::Relaxed),
            CmdSplit => flags.split.store(h.b1 != 0, Ordering::Relaxed),
            CmdSat => flags.sat_mode.store(h.b1, Ordering::Relaxed),
            CmdLock => flags.locked.store(h.b1 != 0, Ordering::Relaxed),
            CmdMuteRx => flags
                .mute_rx_while_transmitting
                .store(h.b2 != 0, Ordering::Relaxed),
            CmdRxSelect => flags
                .active_receiver
                .store(usize::from(h.b1), Ordering::Relaxed),
            CmdAgc => {
                if let Some(rx) = store.receivers.get(usize::from(h.b1)) {
                    let mut s = rx.stream.lock()?;
                    s.agc.mode = h.b2;
                    let agc = s.agc;
                    s.dsp.set_agc(agc);
                }
            }
            CmdAgcGain => {
                let c = messages::AgcGainCommand::decode(body);
                if let Some(rx) = store.receivers.get(usize::from(c.id)) {
                    let mut s = rx.stream.lock()?;
                    s.agc.gain = c.gain;
                    s.agc.hang = c.hang;
                    s.agc.thresh = c.thresh;
                    s.agc.hang_thresh = c.hang_thresh;
                    let agc = s.agc;
                    s.dsp.set_agc(agc);
                }
            }
            CmdDrive => {
                let v = crate::codec::WireReader::new(body).double();
                if let Some(tx) = &store.transmitter {
                    tx.stream.lock()?.drive = v.clamp(0.0, 100.0);
                }
                store.schedule_high_priority();
            }
            CmdMicGain => {
                let _v = crate::codec::WireReader::new(body).double();
            }
            CmdVolume => {
                let v = crate::codec::WireReader::new(body).double();
                if let Some(rx) = store.receivers.get(usize::from(h.b1)) {
                    rx.stream.lock()?.volume = v;
                }
            }
            CmdSquelch => {
                let v = crate::codec::WireReader::new(body).double();
                if let Some(rx) = store.receivers.get(usize::from(h.b1)) {
                    let mut s = rx.stream.lock()?;
                    s.dsp.set_squelch(h.b2 != 0, v);
                }
            }
            CmdFreq => {
                let f = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].move_to(f);
                store.schedule_high_priority();
            }
            CmdMove => {
                let hz = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].move_hz(hz, h.b2 != 0);
                store.schedule_high_priority();
            }
            CmdMoveTo => {
                let f = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].move_to(f);
                store.schedule_high_priority();
            }
            CmdStep => {
                let steps = crate::codec::unpack_short(h.s1);
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].apply_step(i64::from(steps));
                store.schedule_high_priority();
            }
            CmdVfoStepSize => {
                let size = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].step = size;
            }
            CmdRit => {
                let rit = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                let mut vfos = store.vfos.lock()?;
                vfos[v].rit = rit;
                vfos[v].rit_enabled = h.b2 != 0;
                drop(vfos);
                store.schedule_high_priority();
            }
            CmdXit => {
                let xit = crate::codec::WireReader::new(body).i64();
                let v = usize::from(h.b1).min(1);
                let mut vfos = store.vfos.lock()?;
                vfos[v].xit = xit;
                vfos[v].xit_enabled = h.b2 != 0;
                drop(vfos);
                store.schedule_high_priority();
            }
            CmdRitStep => {
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].rit_step = h.s1;
            }
            CmdCtun => {
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].set_ctun(h.b2 != 0);
                store.schedule_high_priority();
            }
            CmdMode => {
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].mode = crate::filter::Mode::from_u8(h.b2);
                store.mode_changed(v)?;
            }
            CmdFilterSel => {
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].filter = usize::from(h.b2);
                store.rx_filter_changed(v)?;
            }
            CmdFilterVar => {
                let mode = usize::from(h.b1).min(crate::filter::MODES - 1);
                let low = crate::codec::unpack_short(h.s1);
                let high = crate::codec::unpack_short(h.s2);
                let mut var = store.var_filters.lock()?;
                if usize::from(h.b2) == crate::filter::FILTER_VAR2 {
                    var.var2[mode] = (low, high);
                } else {
                    var.var1[mode] = (low, high);
                }
            }
            CmdFilterCut => {
                let rx = usize::from(h.b1).min(1);
                let mode = store.vfos.lock()?[rx].mode as usize;
                {
                    let mut var = store.var_filters.lock()?;
                    var.var1[mode] = (
                        crate::codec::unpack_short(h.s1),
                        crate::codec::unpack_short(h.s2),
                    );
                }
                store.rx_filter_changed(rx)?;
            }
            CmdBandSel => {
                let v = usize::from(h.b1).min(1);
                store.select_band(v, usize::from(h.b2))?;
            }
            CmdBandstack => {
                store.bandstack_next(usize::from(h.b1).min(1))?;
            }
            CmdSampleRate => {
                let rate = crate::codec::WireReader::new(body).i64();
                store.set_rx_sample_rate(usize::from(h.b1), rate as u32)?;
            }
            CmdZoom => {
                let rx_id = usize::from(h.b1);
                if let Some(rx) = store.receivers.get(rx_id) {
                    let width = rx.display.lock()?.width;
                    let offset = {
                        let vfos = store.vfos.lock()?;
                        let v = &vfos[rx_id.min(1)];
                        v.ctun.then_some(v.offset)
                    };
                    rx.update_zoom(width, usize::from(h.b2), offset)?;
                }
            }
            CmdPan => {
                if let Some(rx) = store.receivers.get(usize::from(h.b1)) {
                    let mut d = rx.display.lock()?;
                    let max = d.pixels - d.width;
                    d.pan = usize::from(h.s1).min(max);
                }
            }
            CmdRxFft => {
                let _size = crate::codec::WireReader::new(body).i64();
            }
            CmdTxFft => {
                let _size = crate::codec::WireReader::new(body).i64();
            }
            CmdNoise => {
                let c = messages::NoiseCommand::decode(body);
                if let Some(rx) = store.receivers.get(usize::from(c.id)) {
                    let mut s = rx.stream.lock()?;
                    s.nb = c.nb;
                    s.noise = crate::dsp::NoiseParams {
                        nb: c.nb,
                        nr: c.nr,
                        anf: c.anf != 0,
                        snb: c.snb != 0,
                        nb2_mode: c.nb2_mode,
                        nb_tau: c.nb_tau,
                        nb_hang: c.nb_hang,
                        nb_advtime: c.nb_advtime,
                        nb_thresh: c.nb_thresh,
                    };
                    let p = s.noise;
                    s.dsp.set_noise(p);
                }
            }
            CmdRxEq | CmdTxEq => {
                let c = messages::EqualizerCommand::decode(body);
                if kind == CmdRxEq {
                    if let Some(rx) = store.receivers.get(usize::from(c.id)) {
                        let mut s = rx.stream.lock()?;
                        s.dsp.set_equalizer(c.enable, &c.freq, &c.gain);
                    }
                } else if let Some(tx) = &store.transmitter {
                    let mut s = tx.stream.lock()?;
                    s.dsp.set_equalizer(c.enable, &c.freq, &c.gain);
                }
            }
            CmdPsOnOff => {
                if let Some(tx) = &store.transmitter {
                    let mut s = tx.stream.lock()?;
                    s.puresignal = h.b1 != 0;
                    let on = s.puresignal;
                    s.dsp.ps_run(on);
                }
                store.schedule_transmit_specific();
            }
            CmdPsReset => {
                if let Some(tx) = &store.transmitter {
                    tx.stream.lock()?.dsp.ps_reset();
                }
            }
            CmdPsResume => {
                if let Some(tx) = &store.transmitter {
                    tx.stream.lock()?.dsp.ps_resume();
                }
            }
            CmdPsParams => {
                let c = messages::PsParams::decode(body);
                if let Some(tx) = &store.transmitter {
                    let mut s = tx.stream.lock()?;
                    s.ps_auto_on = c.ps_oneshot;
                    let _ = c.ps_setpk;
                }
            }
            CmdTwoTone => {
                if let Some(tx) = &store.transmitter {
                    let null = crate::transmitter::NullTxOutput;
                    let env = store.tx_env(&null);
                    tx.set_twotone(h.b1 != 0, &env)?;
                }
            }
            CmdCw => {
                // Remote CW: key state in b1, wait in s1/s2 as a
                // 32-bit sample count.
                if let Some(tx) = &store.transmitter {
                    let wait = (u32::from(h.s1) << 16) | u32::from(h.s2);
                    tx.cw_ring.queue(h.b1 != 0, wait);
                }
            }
            CmdSidetoneFreq => {
                store.settings.lock()?.cw_keyer_sidetone_frequency = h.s1;
                store.schedule_transmit_specific();
            }
            CmdStore => store.store_memory(usize::from(h.b1))?,
            CmdRecall => store.recall_memory(usize::from(h.b1))?,
            CmdVfoAtoB => {
                let mut vfos = store.vfos.lock()?;
                let a = vfos[VFO_A].clone();
                vfos[VFO_B] = a;
                drop(vfos);
                store.schedule_high_priority();
            }
            CmdVfoBtoA => {
                let mut vfos = store.vfos.lock()?;
                let b = vfos[VFO_B].clone();
                vfos[VFO_A] = b;
                drop(vfos);
                store.schedule_high_priority();
            }
            CmdVfoSwap => {
                let mut vfos = store.vfos.lock()?;
                vfos.swap(0, 1);
                drop(vfos);
                store.schedule_high_priority();
            }
            CmdTxFilter => {
                if let Some(tx) = &store.transmitter {
                    let mut s = tx.stream.lock()?;
                    s.use_rx_filter = h.b1 != 0;
                    s.filter_low = crate::codec::unpack_short(h.s1);
                    s.filter_high = crate::codec::unpack_short(h.s2);
                    let (lo, hi) = (s.filter_low, s.filter_high);
                    s.dsp.set_filter(f64::from(lo), f64::from(hi));
                }
            }
            CmdDeviation => {
                let v = usize::from(h.b1).min(1);
                store.vfos.lock()?[v].deviation = h.s1;
                store.rx_filter_changed(v)?;
            }
            CmdStartRadio => {
                for rx in &store.receivers {
                    if rx.stream.lock()?.state == RxState::Ready {
                        rx.start()?;
                    }
                }
            }
            InfoBand => {
                let c = messages::BandData::decode(body);
                let mut bands = store.bands.lock()?;
                if let Some(b) = bands.get_mut(usize::from(c.band)) {
                    b.oc_rx = c.oc_rx;
                    b.oc_tx = c.oc_tx;
                    b.alex_rx_antenna = c.alex_rx_antenna;
                    b.alex_tx_antenna = c.alex_tx_antenna;
                    b.alex_attenuation = c.alex_attenuation;
                    b.disable_pa = c.disable_pa;
                    b.pa_calibration = c.pa_calibration;
                    b.frequency_min = c.frequency_min;
                    b.frequency_max = c.frequency_max;
                    b.frequency_lo = c.frequency_lo;
                    b.error_lo = c.error_lo;
                }
            }
            InfoBandstack => {
                let c = messages::BandstackData::decode(body);
                let mut bands = store.bands.lock()?;
                if let Some(b) = bands.get_mut(usize::from(c.band))
                    && let Some(e) = b.stack.entries.get_mut(usize::from(c.stack))
                {
                    e.frequency = c.frequency;
                    e.ctun = c.ctun;
                    e.ctun_frequency = c.ctun_frequency;
                    e.mode = crate::filter::Mode::from_u8(c.mode);
                    e.filter = usize::from(c.filter);
                    e.deviation = c.deviation;
                    e.ctcss_enabled = c.ctcss_enabled;
                    e.ctcss = c.ctcss;
                }
            }
            InfoAdc | InfoDac => {
                // Only meaningful for Soapy antenna switching; HPSDR
                // radios ignore these silently.
                if store.radio.protocol == crate::discovery::Protocol::Soapy {
                    if kind == InfoAdc {
                        let c = messages::AdcData::decode(body);
                        let mut adc = store.adc.lock()?;
                        if let Some(a) = adc.get_mut(usize::from(c.adc)) {
                            a.antenna = c.antenna;
                            a.gain = c.gain;
                        }
                    } else {
                        let c = messages::DacData::decode(body);
                        let mut dac = store.dac.lock()?;
                        dac.antenna = c.antenna;
                        dac.gain = c.gain;
                    }
                }
            }
            other => {
                debug!("server: {other:?} accepted, no handler side effects");
            }
        }
        // SAT/SPLIT change which VFO keys the radio.
        if matches!(kind, CmdSat | CmdSplit) {
            store.schedule_high_priority();
            store.ui(UiEvent::VfoChanged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_digest_is_deterministic() {
        let nonce = [0u8; 64];
        let d1 = challenge_digest(&nonce, "secret");
        let d2 = challenge_digest(&nonce, "secret");
        assert_eq!(d1, d2);
        assert_ne!(d1, challenge_digest(&nonce, "secreT"));
        let mut nonce2 = nonce;
        nonce2[63] = 1;
        assert_ne!(d1, challenge_digest(&nonce2, "secret"));
    }

    #[test]
    fn challenge_digest_matches_manual_sha() {
        let nonce = [0u8; 64];
        let mut h = Sha256::new();
        h.update(nonce);
        h.update(0x0100_0002u32.to_be_bytes());
        h.update(b"secret");
        let want: [u8; 32] = h.finalize().into();
        assert_eq!(challenge_digest(&nonce, "secret"), want);
    }

    #[test]
    fn long_passwords_truncate_at_50() {
        let nonce = [7u8; 64];
        let long: String = "x".repeat(60);
        let fifty: String = "x".repeat(50);
        assert_eq!(challenge_digest(&nonce, &long), challenge_digest(&nonce, &fifty));
    }

    #[test]
    fn mic_ring_low_water() {
        let r = MicRing::default();
        // Empty ring: silence.
        assert_eq!(r.pop(), 0);
        // Fill below the low-water mark: still silence.
        for i in 0..MIC_RING_LOW - 1 {
            r.push(i as i16);
        }
        assert_eq!(r.pop(), 0);
        // Crossing the mark opens the tap.
        for i in 0..16 {
            r.push(i);
        }
        assert_eq!(r.pop(), 0i16);
        assert_eq!(r.pop(), 1i16);
        r.wipe();
        assert_eq!(r.pop(), 0);
    }
}
/* vim: textwidth=80
 */
