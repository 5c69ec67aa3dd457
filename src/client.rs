/*! Remote-operation client.

Connects to a server over TCP, authenticates with the SHA-256
challenge, ingests the initial snapshot into a sparse mirror of the
state store, and from then on translates user actions into typed
commands. It never runs DSP; spectrum and audio arrive ready-made.

VFO motion is the one subtle path: a wheel can produce hundreds of
steps per second, so steps and hertz deltas accumulate under a mutex
and a 100 ms timer flushes them as single CMD_STEP/CMD_MOVE
messages. The same timer sends a heartbeat every 150th tick.
*/
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};

use crate::codec::pack_short;
use crate::frame::{FrameWriter, read_exact, read_header};
use crate::messages::{self, AUDIO_DATA_SIZE, BodyLen, MessageType};
use crate::radio::UiEvent;
use crate::server::challenge_digest;
use crate::{Error, Result};

/// Hard ceiling on connect plus handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// VFO coalescing flush interval.
pub const VFO_TIMER: Duration = Duration::from_millis(100);

/// Heartbeat every this many timer ticks (15 s).
pub const HEARTBEAT_TICKS: u32 = 150;

/// Mirror of one receiver plus its display surface.
#[derive(Debug, Default)]
pub struct MirrorRx {
    /// Last INFO_RECEIVER.
    pub data: messages::ReceiverData,
    /// Pixel row, written under the display lock.
    pub pixel_samples: Vec<f32>,
    /// Meter from the last spectrum frame.
    pub meter: f64,
}

#[derive(Debug, Default)]
struct VfoAccumulator {
    steps: [i64; 2],
    hz: [i64; 2],
    round: [bool; 2],
}

/// The connected client.
pub struct RemoteClient {
    writer: FrameWriter<TcpStream>,
    running: Arc<AtomicBool>,
    /// Global radio data from INFO_RADIO.
    pub radio: Mutex<Option<messages::RadioData>>,
    /// Receiver mirrors, indexed by rx id; each behind its own
    /// display lock.
    pub receivers: Vec<Mutex<MirrorRx>>,
    /// Transmitter mirror.
    pub transmitter: Mutex<Option<messages::TransmitterData>>,
    /// VFO mirrors.
    pub vfos: Mutex<[messages::VfoData; 2]>,
    /// Band mirrors.
    pub bands: Mutex<Vec<messages::BandData>>,
    /// Bandstack mirrors.
    pub bandstacks: Mutex<Vec<messages::BandstackData>>,
    /// Memory mirrors.
    pub memories: Mutex<Vec<messages::MemoryData>>,
    /// Latest INFO_DISPLAY.
    pub display: Mutex<messages::DisplayData>,
    /// Latest INFO_PS.
    pub ps: Mutex<messages::PsData>,
    /// Set when CMD_START_RADIO arrives: snapshot complete.
    pub started: AtomicBool,
    accumulated: Mutex<VfoAccumulator>,
    ui: Mutex<Option<Sender<UiEvent>>>,
    mic_buffer: Mutex<Vec<i16>>,
    ticks: AtomicU32,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

/// Connect and authenticate, with precise error kinds: bad host,
/// timeout, wrong password, or plain transport trouble.
pub fn connect(host: &str, port: u16, password: &str) -> Result<Arc<RemoteClient>> {
    let addr = format!("{host}:{port}")
        .to_socket_addrs()
        .map_err(|e| Error::BadHost(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| Error::BadHost(host.to_string()))?;

    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Error::Timeout(format!("connect to {addr}"))
        } else {
            Error::Io(e)
        }
    })?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

    // Challenge/response.
    let mut nonce = [0u8; 64];
    read_exact(&mut stream, &mut nonce)?;
    let digest = challenge_digest(&nonce, password);
    stream.write_all(&digest)?;

    let mut verdict = [0u8; 1];
    read_exact(&mut stream, &mut verdict)?;
    if verdict[0] != 0x7F {
        return Err(Error::WrongPassword);
    }
    info!("client: authenticated to {addr}");

    // The snapshot and the streams arrive on the same socket; no
    // read timeout from here on, the heartbeats keep it alive.
    stream.set_read_timeout(None)?;

    let client = Arc::new(RemoteClient {
        writer: FrameWriter::new(stream.try_clone()?),
        running: Arc::new(AtomicBool::new(true)),
        radio: Mutex::new(None),
        receivers: (0..4).map(|_| Mutex::new(MirrorRx::default())).collect(),
        transmitter: Mutex::new(None),
        vfos: Mutex::new([messages::VfoData::default(), messages::VfoData::default()]),
        bands: Mutex::new(Vec::new()),
        bandstacks: Mutex::new(Vec::new()),
        memories: Mutex::new(Vec::new()),
        display: Mutex::new(messages::DisplayData::default()),
        ps: Mutex::new(messages::PsData::default()),
        started: AtomicBool::new(false),
        accumulated: Mutex::new(VfoAccumulator::default()),
        ui: Mutex::new(None),
        mic_buffer: Mutex::new(Vec::new()),
        ticks: AtomicU32::new(0),
    });

    let me = Arc::clone(&client);
    std::thread::Builder::new()
        .name("client receive".to_string())
        .spawn(move || me.receive_loop(stream))?;

    let me = Arc::clone(&client);
    std::thread::Builder::new()
        .name("client vfo timer".to_string())
        .spawn(move || {
            while me.running.load(Ordering::Relaxed) {
                std::thread::sleep(VFO_TIMER);
                me.flush_vfo();
                if me.ticks.fetch_add(1, Ordering::Relaxed) % HEARTBEAT_TICKS
                    == HEARTBEAT_TICKS - 1
                {
                    me.send_heartbeat();
                }
            }
        })?;

    Ok(client)
}

impl RemoteClient {
    /// Attach the UI event queue.
    pub fn set_ui(&self, tx: Sender<UiEvent>) {
        *self.ui.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    /// Still connected?
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Disconnect.
    pub fn close(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn ui(&self, ev: UiEvent) {
        if let Ok(g) = self.ui.lock()
            && let Some(tx) = g.as_ref()
        {
            let _ = tx.send(ev);
        }
    }

    fn send(&self, msg: &[u8]) {
        if self.writer.send(msg).is_err() {
            self.running.store(false, Ordering::Relaxed);
        }
    }

    /// Accumulate wheel steps; the timer flushes them.
    pub fn update_vfo_step(&self, v: usize, steps: i64) {
        if let Ok(mut a) = self.accumulated.lock() {
            a.steps[v.min(1)] += steps;
        }
    }

    /// Accumulate a hertz move; `round` snaps to the step grid.
    pub fn update_vfo_move(&self, v: usize, hz: i64, round: bool) {
        if let Ok(mut a) = self.accumulated.lock() {
            a.hz[v.min(1)] += hz;
            a.round[v.min(1)] = round;
        }
    }

    /// Flush accumulated VFO motion as at most one CMD_STEP and one
    /// CMD_MOVE per VFO.
    pub fn flush_vfo(&self) {
        let taken = {
            let Ok(mut a) = self.accumulated.lock() else {
                return;
            };
            std::mem::take(&mut *a)
        };
        for v in 0..2 {
            if taken.steps[v] != 0 {
                self.send(&messages::header_only(
                    MessageType::CmdStep,
                    v as u8,
                    0,
                    pack_short(taken.steps[v] as i32),
                    0,
                ));
            }
            if taken.hz[v] != 0 || taken.round[v] {
                self.send(&messages::u64_command(
                    MessageType::CmdMove,
                    v as u8,
                    u8::from(taken.round[v]),
                    taken.hz[v],
                ));
            }
        }
    }

    /// Keep-alive.
    pub fn send_heartbeat(&self) {
        self.send(&messages::header_only(MessageType::CmdHeartbeat, 0, 0, 0, 0));
    }

    /// Key or unkey the radio.
    pub fn set_mox(&self, on: bool) {
        self.send(&messages::header_only(MessageType::CmdMox, u8::from(on), 0, 0, 0));
    }

    /// Tune carrier on/off.
    pub fn set_tune(&self, on: bool) {
        self.send(&messages::header_only(MessageType::CmdTune, u8::from(on), 0, 0, 0));
    }

    /// TX drive, 0..100.
    pub fn set_drive(&self, drive: f64) {
        self.send(&messages::double_command(MessageType::CmdDrive, 0, 0, drive));
    }

    /// RX volume in dB.
    pub fn set_volume(&self, rx: usize, volume: f64) {
        self.send(&messages::double_command(
            MessageType::CmdVolume,
            rx as u8,
            0,
            volume,
        ));
    }

    /// Squelch enable and level.
    pub fn set_squelch(&self, rx: usize, enable: bool, level: f64) {
        self.send(&messages::double_command(
            MessageType::CmdSquelch,
            rx as u8,
            u8::from(enable),
            level,
        ));
    }

    /// Mode on a VFO.
    pub fn set_mode(&self, v: usize, mode: crate::filter::Mode) {
        self.send(&messages::header_only(
            MessageType::CmdMode,
            v as u8,
            mode as u8,
            0,
            0,
        ));
    }

    /// Filter slot on a VFO.
    pub fn set_filter(&self, v: usize, filter: usize) {
        self.send(&messages::header_only(
            MessageType::CmdFilterSel,
            v as u8,
            filter as u8,
            0,
            0,
        ));
    }

    /// Absolute frequency.
    pub fn set_frequency(&self, v: usize, hz: i64) {
        self.send(&messages::u64_command(MessageType::CmdFreq, v as u8, 0, hz));
    }

    /// AGC mode.
    pub fn set_agc(&self, rx: usize, agc: u8) {
        self.send(&messages::header_only(MessageType::CmdAgc, rx as u8, agc, 0, 0));
    }

    /// Band selection.
    pub fn select_band(&self, v: usize, band: usize) {
        self.send(&messages::header_only(
            MessageType::CmdBandSel,
            v as u8,
            band as u8,
            0,
            0,
        ));
    }

    /// Zoom factor.
    pub fn set_zoom(&self, rx: usize, zoom: usize) {
        self.send(&messages::header_only(
            MessageType::CmdZoom,
            rx as u8,
            zoom as u8,
            0,
            0,
        ));
    }

    /// Pan offset.
    pub fn set_pan(&self, rx: usize, pan: u16) {
        self.send(&messages::header_only(MessageType::CmdPan, rx as u8, 0, pan, 0));
    }

    /// Split on/off.
    pub fn set_split(&self, on: bool) {
        self.send(&messages::header_only(MessageType::CmdSplit, u8::from(on), 0, 0, 0));
    }

    /// RX sample rate.
    pub fn set_sample_rate(&self, rx: usize, rate: u32) {
        self.send(&messages::u64_command(
            MessageType::CmdSampleRate,
            rx as u8,
            0,
            i64::from(rate),
        ));
    }

    /// Start or stop the spectrum stream for a slot.
    pub fn set_spectrum(&self, id: usize, on: bool) {
        self.send(&messages::header_only(
            MessageType::CmdSpectrum,
            id as u8,
            u8::from(on),
            0,
            0,
        ));
    }

    /// Remote CW key event.
    pub fn send_cw(&self, down: bool, wait: u32) {
        self.send(&messages::header_only(
            MessageType::CmdCw,
            u8::from(down),
            0,
            (wait >> 16) as u16,
            wait as u16,
        ));
    }

    /// One uplink mic sample. Buffers a full INFO_TXAUDIO block;
    /// while not actually transmitting voice the older half is
    /// dropped so a fresh TX start still has some lead-in.
    pub fn queue_mic_sample(&self, sample: i16, voice_tx: bool) {
        let full = {
            let Ok(mut b) = self.mic_buffer.lock() else {
                return;
            };
            b.push(sample);
            if b.len() < AUDIO_DATA_SIZE {
                None
            } else if voice_tx {
                Some(std::mem::take(&mut *b))
            } else {
                let half = b.split_off(AUDIO_DATA_SIZE / 2);
                *b = half;
                None
            }
        };
        if let Some(samples) = full {
            let msg = messages::TxAudioData {
                rx: 0,
                numsamples: samples.len() as u16,
                samples,
            };
            self.send(&msg.encode());
        }
    }

    fn receive_loop(self: Arc<Self>, mut stream: TcpStream) {
        while self.running.load(Ordering::Relaxed) {
            let header = match read_header(&mut stream) {
                Ok(h) => h,
                Err(e) => {
                    warn!("client: read error: {e}");
                    break;
                }
            };
            let Some(kind) = MessageType::from_u16(header.kind) else {
                warn!("client: unknown message type {}", header.kind);
                continue;
            };
            let body = match kind.body_len() {
                BodyLen::None => Vec::new(),
                BodyLen::Fixed(n) => {
                    let mut b = vec![0u8; n];
                    if read_exact(&mut stream, &mut b).is_err() {
                        break;
                    }
                    b
                }
                BodyLen::Variable => {
                    let mut b = vec![0u8; usize::from(header.s1)];
                    if read_exact(&mut stream, &mut b).is_err() {
                        break;
                    }
                    b
                }
            };
            self.ingest(kind, &header, &body);
        }
        self.running.store(false, Ordering::Relaxed);
        self.ui(UiEvent::Dialog("Server connection lost".to_string()));
        debug!("client: receive loop exits");
    }

    fn ingest(&self, kind: MessageType, h: &crate::frame::Header, body: &[u8]) {
        use MessageType::*;
        match kind {
            CmdHeartbeat => {}
            InfoRadio => {
                *self.radio.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(messages::RadioData::decode(body));
            }
            InfoReceiver => {
                let d = messages::ReceiverData::decode(body);
                if let Some(rx) = self.receivers.get(usize::from(d.id))
                    && let Ok(mut m) = rx.lock()
                {
                    m.data = d;
                }
            }
            InfoTransmitter => {
                *self.transmitter.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(messages::TransmitterData::decode(body));
            }
            InfoVfo => {
                let d = messages::VfoData::decode(body);
                let v = usize::from(d.vfo).min(1);
                self.vfos.lock().unwrap_or_else(|e| e.into_inner())[v] = d;
                self.ui(UiEvent::VfoChanged);
            }
            InfoAdc | InfoDac => {}
            InfoBand => {
                let d = messages::BandData::decode(body);
                let mut bands = self.bands.lock().unwrap_or_else(|e| e.into_inner());
                let idx = usize::from(d.band);
                if bands.len() <= idx {
                    bands.resize_with(idx + 1, messages::BandData::default);
                }
                bands[idx] = d;
            }
            InfoBandstack => {
                let d = messages::BandstackData::decode(body);
                self.bandstacks
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(d);
            }
            InfoMemory => {
                let d = messages::MemoryData::decode(body);
                let mut mem = self.memories.lock().unwrap_or_else(|e| e.into_inner());
                let idx = usize::from(d.index);
                if mem.len() <= idx {
                    mem.resize_with(idx + 1, messages::MemoryData::default);
                }
                mem[idx] = d;
            }
            InfoDisplay => {
                *self.display.lock().unwrap_or_else(|e| e.into_inner()) =
                    messages::DisplayData::decode(body);
            }
            InfoPs => {
                *self.ps.lock().unwrap_or_else(|e| e.into_inner()) =
                    messages::PsData::decode(body);
            }
            InfoSpectrum => {
                let d = messages::SpectrumData::decode(body);
                let id = usize::from(d.id);
                if let Some(rx) = self.receivers.get(id)
                    && let Ok(mut m) = rx.lock()
                {
                    // De-serialize into the pixel row under this rx's
                    // display lock; the redraw happens on the UI task.
                    let width = usize::from(d.width);
                    if m.pixel_samples.len() != width {
                        m.pixel_samples = vec![-140.0; width];
                    }
                    for (i, s) in d.samples.iter().take(width).enumerate() {
                        m.pixel_samples[i] = *s as f32;
                    }
                    m.meter = d.meter;
                }
                {
                    let mut vfos = self.vfos.lock().unwrap_or_else(|e| e.into_inner());
                    vfos[0].frequency = d.vfo_a_freq;
                    vfos[0].ctun_frequency = d.vfo_a_ctun_freq;
                    vfos[0].offset = d.vfo_a_offset;
                    vfos[1].frequency = d.vfo_b_freq;
                    vfos[1].ctun_frequency = d.vfo_b_ctun_freq;
                    vfos[1].offset = d.vfo_b_offset;
                }
                self.ui(UiEvent::Redraw(id));
            }
            InfoRxAudio => {
                let d = messages::RxAudioData::decode(body);
                // Local playback is the audio backend's business; the
                // mirror only tracks levels.
                let _ = d;
            }
            CmdFilterVar => {
                debug!("client: var filter update for mode {}", h.b1);
            }
            CmdStartRadio => {
                self.started.store(true, Ordering::SeqCst);
                info!("client: snapshot complete, radio started");
            }
            other => {
                debug!("client: ignoring {other:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_host_error_kind() {
        let r = connect("no.such.host.invalid", 50000, "secret");
        assert!(matches!(r, Err(Error::BadHost(_))));
    }

    #[test]
    fn vfo_accumulation_coalesces() {
        // The accumulator is private state; exercise it through a
        // client wired to a dead socket pair.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let t = std::thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            // Minimal fake handshake.
            s.write_all(&[0u8; 64]).unwrap();
            let mut digest = [0u8; 32];
            s.read_exact(&mut digest).unwrap();
            s.write_all(&[0x7F]).unwrap();
            s
        });
        let client = connect("127.0.0.1", addr.port(), "secret").unwrap();
        let _stream = t.join().unwrap();
        for _ in 0..1000 {
            client.update_vfo_step(0, 1);
        }
        {
            let a = client.accumulated.lock().unwrap();
            assert_eq!(a.steps[0], 1000);
        }
        client.flush_vfo();
        let a = client.accumulated.lock().unwrap();
        assert_eq!(a.steps[0], 0);
        client.close();
    }
}
/* vim: textwidth=80
 */
