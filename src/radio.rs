/*! The state store.

Owns every entity: the selected radio, the receivers, the
transmitter, both VFOs, bands, memory slots and the global flags.
Engines hold `Arc`s and indices, never references into each other.
All external mutation goes through the narrow functions here, which
apply the cross-entity side effects: a mode change re-derives filter
edges and AGC lines, a band change re-evaluates the open-collector
and Alex settings, a sample-rate change on protocol 1 drags the
second receiver along because the firmware slaves them.
*/
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::band::{Band, Bandstack, default_bands};
use crate::cw;
use crate::discovery::{Discovered, Protocol};
use crate::filter::{self, Mode, VarFilters};
use crate::messages;
use crate::receiver::{PS_RX_FEEDBACK, Receiver, RxEnv, RxOutput};
use crate::store::{MemorySlot, NUM_MEMORYS};
use crate::transmitter::{Transmitter, TxEnv, TxOutput};
use crate::vfo::{SatMode, VFO_A, VFO_B, Vfo, tx_vfo_index};
use crate::Result;

/// Capture/replay lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing captured.
    #[default]
    Off,
    /// Recording RX audio.
    Recording,
    /// Buffer full or user stopped.
    RecordDone,
    /// Replaying into the TX path.
    Replay,
    /// Replay ran out.
    ReplayDone,
}

/// Ten seconds of 48 kHz audio.
pub const CAPTURE_MAX: usize = 480_000;

/// The capture buffer.
#[derive(Debug, Default)]
pub struct Capture {
    /// Lifecycle.
    pub state: CaptureState,
    data: Vec<f64>,
    replay_ptr: usize,
}

impl Capture {
    /// Record one sample; flips to `RecordDone` when full.
    pub fn record(&mut self, sample: f64) {
        if self.state != CaptureState::Recording {
            return;
        }
        if self.data.len() < CAPTURE_MAX {
            self.data.push(sample);
        } else {
            self.state = CaptureState::RecordDone;
        }
    }

    /// Next replay sample; flips to `ReplayDone` on exhaustion.
    pub fn replay_next(&mut self) -> Option<f64> {
        if self.state != CaptureState::Replay {
            return None;
        }
        if self.replay_ptr < self.data.len() {
            let s = self.data[self.replay_ptr];
            self.replay_ptr += 1;
            Some(s)
        } else {
            self.state = CaptureState::ReplayDone;
            None
        }
    }

    /// Arm recording from scratch.
    pub fn start_recording(&mut self) {
        self.data.clear();
        self.replay_ptr = 0;
        self.state = CaptureState::Recording;
    }

    /// Arm replay from the start.
    pub fn start_replay(&mut self) {
        self.replay_ptr = 0;
        self.state = CaptureState::Replay;
    }
}

/// Events for the single-threaded UI task, the only place redraws
/// happen.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Redraw a receiver panadapter.
    Redraw(usize),
    /// VFO bar needs an update.
    VfoChanged,
    /// Severity-tagged dialog; strings starting with "FATAL" exit
    /// after acknowledgement.
    Dialog(String),
}

/// Wire-engine command scheduling. Protocol 2 coalesces these;
/// protocol 1 rewrites its C&C round-robin anyway and ignores them.
pub trait WireSchedule: Send + Sync {
    /// Frequencies, attenuation, OC lines.
    fn high_priority(&self) {}
    /// Sample-rate/DDC setup.
    fn receive_specific(&self) {}
    /// Mic/CW/DUC setup.
    fn transmit_specific(&self) {}
    /// Everything else.
    fn general(&self) {}
}

/// The HPSDR speaker path of the active wire engine.
pub trait SpeakerPath: Send + Sync {
    /// One stereo sample to the radio's audio codec.
    fn audio_samples(&self, left: i16, right: i16);
}

/// The remote server's taps into the engines.
pub trait RemoteSink: Send + Sync {
    /// RX audio towards the client.
    fn rx_audio(&self, rx_id: usize, left: i16, right: i16) {
        let _ = (rx_id, left, right);
    }

    /// A fresh analyzer frame is ready on `rx_id`.
    fn spectrum_ready(&self, rx_id: usize) {
        let _ = rx_id;
    }

    /// Mic sample from the client, if one is authenticated.
    fn mic_sample(&self) -> Option<f64> {
        None
    }
}

/// Global boolean/scalar state shared across threads.
#[derive(Debug, Default)]
pub struct GlobalFlags {
    /// Manually keyed.
    pub mox: AtomicBool,
    /// Tune carrier requested.
    pub tune: AtomicBool,
    /// VOX keyed.
    pub vox: AtomicBool,
    /// Keep receiving while transmitting.
    pub duplex: AtomicBool,
    /// Split: TX on the other VFO.
    pub split: AtomicBool,
    /// SAT mode byte (see [`SatMode`]).
    pub sat_mode: AtomicU8,
    /// Mute RX audio during TX even in duplex.
    pub mute_rx_while_transmitting: AtomicBool,
    /// The radio keys CW itself.
    pub cw_keyer_internal: AtomicBool,
    /// PTT asserted by the radio.
    pub radio_ptt: AtomicBool,
    /// Which receiver the UI considers active.
    pub active_receiver: AtomicUsize,
    /// VFO lock.
    pub locked: AtomicBool,
    /// ADC0 overload reported by the hardware.
    pub adc0_overload: AtomicBool,
    /// ADC1 overload.
    pub adc1_overload: AtomicBool,
    /// TX FIFO overrun seen.
    pub tx_fifo_overrun: AtomicBool,
    /// TX FIFO underrun seen.
    pub tx_fifo_underrun: AtomicBool,
    /// External TX inhibit input.
    pub tx_inhibit: AtomicBool,
    /// Wire-engine sequence errors.
    pub sequence_errors: AtomicU32,
    /// Exciter power reading.
    pub exciter_power: AtomicU32,
    /// ADC0 level reading.
    pub adc0_level: AtomicU32,
    /// ADC1 level reading.
    pub adc1_level: AtomicU32,
}

impl GlobalFlags {
    /// Radio is keyed by any source.
    #[must_use]
    pub fn transmitting(&self) -> bool {
        self.mox.load(Ordering::Relaxed)
            || self.tune.load(Ordering::Relaxed)
            || self.vox.load(Ordering::Relaxed)
    }
}

/// Per-ADC state.
#[derive(Clone, Copy, Debug)]
pub struct AdcState {
    /// Antenna selection.
    pub antenna: i32,
    /// Step attenuator, dB.
    pub attenuation: i32,
    /// RX gain, dB.
    pub gain: f64,
    /// Lower gain limit.
    pub min_gain: f64,
    /// Upper gain limit.
    pub max_gain: f64,
}

impl Default for AdcState {
    fn default() -> Self {
        Self {
            antenna: 0,
            attenuation: 0,
            gain: 20.0,
            min_gain: -12.0,
            max_gain: 48.0,
        }
    }
}

/// DAC state.
#[derive(Clone, Copy, Debug, Default)]
pub struct DacState {
    /// TX antenna selection.
    pub antenna: u8,
    /// TX gain, dB.
    pub gain: f64,
}

/// Antenna and gain-element names a Soapy device exposes. Empty for
/// HPSDR radios.
#[derive(Clone, Debug, Default)]
pub struct SoapyCaps {
    /// RX antenna names.
    pub rx_antennas: Vec<String>,
    /// TX antenna names.
    pub tx_antennas: Vec<String>,
    /// RX gain element names.
    pub rx_gains: Vec<String>,
    /// TX gain element names.
    pub tx_gains: Vec<String>,
}

/// Misc scalar settings without a better home.
#[derive(Clone, Debug)]
pub struct RadioSettings {
    /// Keyer speed, WPM.
    pub cw_keyer_speed: u32,
    /// Sidetone pitch, Hz.
    pub cw_keyer_sidetone_frequency: u16,
    /// Sidetone level 0..127.
    pub cw_keyer_sidetone_volume: u8,
    /// Panadapter width in screen pixels.
    pub display_width: u16,
    /// Regulatory region.
    pub region: u8,
    /// PA enabled.
    pub pa_enabled: bool,
    /// PA power class index.
    pub pa_power: u16,
    /// PA calibration interpolation points.
    pub pa_trim: [f64; 11],
    /// Drive ceiling.
    pub drive_max: f64,
    /// Drive ceiling in digital modes.
    pub drive_digi_max: f64,
    /// Diversity enabled.
    pub diversity_enabled: bool,
    /// Diversity gain (the rotation's cosine scale).
    pub div_gain: f64,
    /// Diversity phase.
    pub div_phase: f64,
    /// TX allowed outside band edges.
    pub tx_out_of_band_allowed: bool,
    /// CTCSS enabled.
    pub ctcss_enabled: bool,
    /// CTCSS tone index.
    pub ctcss: u8,
    /// Frequency calibration offset, Hz.
    pub frequency_calibration: i64,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            cw_keyer_speed: 20,
            cw_keyer_sidetone_frequency: 700,
            cw_keyer_sidetone_volume: 64,
            display_width: 800,
            region: 0,
            pa_enabled: true,
            pa_power: 0,
            pa_trim: [
                0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0,
            ],
            drive_max: 100.0,
            drive_digi_max: 100.0,
            diversity_enabled: false,
            div_gain: 1.0,
            div_phase: 0.0,
            tx_out_of_band_allowed: false,
            ctcss_enabled: false,
            ctcss: 0,
            frequency_calibration: 0,
        }
    }
}

/// Interpolate the PA calibration table into watts.
#[must_use]
pub fn compute_power(trim: &[f64; 11], pa_power_watts: f64, p: f64) -> f64 {
    let interval = 0.1 * pa_power_watts;
    let mut i = 0;
    if p > trim[10] {
        i = 9;
    } else {
        while i < 10 && p > trim[i] {
            i += 1;
        }
        i = i.saturating_sub(1);
    }
    let span = trim[i + 1] - trim[i];
    let frac = if span.abs() < f64::EPSILON {
        0.0
    } else {
        (p - trim[i]) / span
    };
    interval * ((1.0 - frac) * i as f64 + frac * (i + 1) as f64)
}

/// The authoritative mutable state.
pub struct StateStore {
    /// The radio this process drives.
    pub radio: Discovered,
    /// Receive chains; ids at or above `receivers` are feedback taps.
    pub receivers: Vec<Arc<Receiver>>,
    /// Number of local (non-feedback) receivers.
    pub local_receivers: usize,
    /// The transmitter, absent on RX-only setups.
    pub transmitter: Option<Arc<Transmitter>>,
    /// VFO A and B.
    pub vfos: Mutex<[Vfo; 2]>,
    /// Band table.
    pub bands: Mutex<Vec<Band>>,
    /// Memory slots.
    pub memories: Mutex<[MemorySlot; NUM_MEMORYS]>,
    /// Adjustable Var1/Var2 edges.
    pub var_filters: Mutex<VarFilters>,
    /// ADC states.
    pub adc: Mutex<[AdcState; 2]>,
    /// DAC state.
    pub dac: Mutex<DacState>,
    /// Scalar settings.
    pub settings: Mutex<RadioSettings>,
    /// Soapy device capabilities.
    pub soapy: Mutex<SoapyCaps>,
    /// Shared flags.
    pub flags: GlobalFlags,
    /// Capture buffer.
    pub capture: Mutex<Capture>,
    ui: Mutex<Option<Sender<UiEvent>>>,
    wire: Mutex<Option<Arc<dyn WireSchedule>>>,
    speaker: Mutex<Option<Arc<dyn SpeakerPath>>>,
    remote: Mutex<Option<Arc<dyn RemoteSink>>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("radio", &self.radio.name)
            .field("receivers", &self.receivers.len())
            .finish()
    }
}

impl StateStore {
    /// Build the store for a selected radio. Creates the receive
    /// chains (plus the PureSignal feedback tap on HPSDR protocols)
    /// and the transmitter.
    #[must_use]
    pub fn new(radio: Discovered) -> Arc<Self> {
        let local = usize::from(radio.supported_receivers.min(2));
        let (rate, ratio) = match radio.protocol {
            Protocol::P1 => (48_000, 1),
            Protocol::P2 => (48_000, 4),
            Protocol::Soapy => (768_000, 1),
        };
        let width = 800;
        let mut receivers: Vec<Arc<Receiver>> = (0..local)
            .map(|id| Arc::new(Receiver::new(id, rate, 1024, width)))
            .collect();
        if matches!(radio.protocol, Protocol::P1 | Protocol::P2) {
            receivers.push(Arc::new(Receiver::new(PS_RX_FEEDBACK, rate, 1024, width)));
        }
        let transmitter = Some(Arc::new(Transmitter::new(8, 1024, ratio)));
        Arc::new(Self {
            radio,
            receivers,
            local_receivers: local,
            transmitter,
            vfos: Mutex::new([Vfo::default(), Vfo::default()]),
            bands: Mutex::new(default_bands()),
            memories: Mutex::new(std::array::from_fn(|_| MemorySlot::default())),
            var_filters: Mutex::new(VarFilters::default()),
            adc: Mutex::new([AdcState::default(); 2]),
            dac: Mutex::new(DacState::default()),
            settings: Mutex::new(RadioSettings::default()),
            soapy: Mutex::new(SoapyCaps::default()),
            flags: GlobalFlags::default(),
            capture: Mutex::new(Capture::default()),
            ui: Mutex::new(None),
            wire: Mutex::new(None),
            speaker: Mutex::new(None),
            remote: Mutex::new(None),
        })
    }

    /// Attach the UI event queue.
    pub fn set_ui(&self, tx: Sender<UiEvent>) {
        *self.ui.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    /// Attach the wire engine's scheduler.
    pub fn set_wire(&self, wire: Arc<dyn WireSchedule>) {
        *self.wire.lock().unwrap_or_else(|e| e.into_inner()) = Some(wire);
    }

    /// Attach the wire engine's speaker path.
    pub fn set_speaker(&self, sp: Arc<dyn SpeakerPath>) {
        *self.speaker.lock().unwrap_or_else(|e| e.into_inner()) = Some(sp);
    }

    /// Attach (or detach) the remote server sink.
    pub fn set_remote(&self, remote: Option<Arc<dyn RemoteSink>>) {
        *self.remote.lock().unwrap_or_else(|e| e.into_inner()) = remote;
    }

    /// Queue a UI event; drops silently when no UI is attached
    /// (headless server).
    pub fn ui(&self, ev: UiEvent) {
        if let Ok(g) = self.ui.lock()
            && let Some(tx) = g.as_ref()
        {
            let _ = tx.send(ev);
        }
    }

    fn schedule<F: Fn(&dyn WireSchedule)>(&self, f: F) {
        if let Ok(g) = self.wire.lock()
            && let Some(w) = g.as_ref()
        {
            f(w.as_ref());
        }
    }

    /// Ask the wire engine for a high-priority update.
    pub fn schedule_high_priority(&self) {
        self.schedule(|w| w.high_priority());
    }

    /// Ask the wire engine for a receive-specific update.
    pub fn schedule_receive_specific(&self) {
        self.schedule(|w| w.receive_specific());
    }

    /// Ask the wire engine for a transmit-specific update.
    pub fn schedule_transmit_specific(&self) {
        self.schedule(|w| w.transmit_specific());
    }

    /// Ask the wire engine for a general update.
    pub fn schedule_general(&self) {
        self.schedule(|w| w.general());
    }

    /// Current SAT mode.
    #[must_use]
    pub fn sat_mode(&self) -> SatMode {
        SatMode::from_u8(self.flags.sat_mode.load(Ordering::Relaxed))
    }

    /// Index of the VFO that controls the transmitter.
    #[must_use]
    pub fn tx_vfo(&self) -> usize {
        tx_vfo_index(self.flags.split.load(Ordering::Relaxed), self.sat_mode())
    }

    /// The TX mode right now.
    #[must_use]
    pub fn tx_mode(&self) -> Mode {
        let v = self.tx_vfo();
        self.vfos.lock().map(|g| g[v].mode).unwrap_or_default()
    }

    /// Remote client's mic sample, if any.
    #[must_use]
    pub fn remote_mic_sample(&self) -> Option<f64> {
        self.remote
            .lock()
            .ok()
            .and_then(|g| g.as_ref().and_then(|r| r.mic_sample()))
    }

    /// Build the per-buffer receive context for `rx_id`.
    #[must_use]
    pub fn rx_env<'a>(&'a self, rx_id: usize) -> RxEnv<'a> {
        RxEnv {
            transmitting: self.flags.transmitting(),
            duplex: self.flags.duplex.load(Ordering::Relaxed),
            mute_rx_while_transmitting: self
                .flags
                .mute_rx_while_transmitting
                .load(Ordering::Relaxed),
            active: self.flags.active_receiver.load(Ordering::Relaxed) == rx_id,
            capture_recording: self
                .capture
                .lock()
                .map(|c| c.state == CaptureState::Recording)
                .unwrap_or(false),
            output: self,
        }
    }

    /// Build the per-sample transmit context.
    #[must_use]
    pub fn tx_env<'a>(&'a self, output: &'a dyn TxOutput) -> TxEnv<'a> {
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        let replay = self
            .capture
            .lock()
            .ok()
            .and_then(|mut c| c.replay_next());
        TxEnv {
            mode: self.tx_mode(),
            tune: self.flags.tune.load(Ordering::Relaxed),
            transmitting: self.flags.transmitting(),
            radio_ptt: self.flags.radio_ptt.load(Ordering::Relaxed),
            protocol: self.radio.protocol,
            local_mic: None,
            remote_mic: self.remote_mic_sample(),
            capture_replay: replay,
            cw_keyer_sidetone_frequency: f64::from(settings.cw_keyer_sidetone_frequency),
            cw_keyer_sidetone_volume: settings.cw_keyer_sidetone_volume,
            cat_cw_active: false,
            cw_keyer_internal: self.flags.cw_keyer_internal.load(Ordering::Relaxed),
            device: self.radio.device,
            output,
        }
    }

    /// A VFO's mode changed: re-derive the filter edges per the
    /// mode-filter table, re-run the AGC calculation on every
    /// affected receiver and, when the active receiver is involved,
    /// re-derive the TX filter if `use_rx_filter` is set.
    pub fn mode_changed(&self, v: usize) -> Result<()> {
        let mode = {
            let vfos = self.vfos.lock()?;
            vfos[v].mode
        };
        for rx in &self.receivers {
            if rx.id == v && rx.id < self.local_receivers {
                self.rx_filter_changed(rx.id)?;
            }
        }
        let active = self.flags.active_receiver.load(Ordering::Relaxed);
        if active == v
            && let Some(tx) = &self.transmitter
        {
            // Read the rx edges before touching the tx lock; nesting
            // the two invites an ordering cycle with the engines.
            let rx_edges = self
                .receivers
                .get(active)
                .and_then(|rx| rx.stream.lock().ok().map(|rs| (rs.filter_low, rs.filter_high)));
            let mut s = tx.stream.lock()?;
            if s.use_rx_filter
                && let Some((lo, hi)) = rx_edges
            {
                s.filter_low = lo;
                s.filter_high = hi;
                s.dsp.set_filter(f64::from(lo), f64::from(hi));
            }
            s.dsp.set_mode(mode);
        }
        self.schedule(|w| w.transmit_specific());
        self.ui(UiEvent::VfoChanged);
        Ok(())
    }

    /// Re-derive one receiver's passband from its VFO and push the
    /// result plus fresh AGC lines into the DSP.
    pub fn rx_filter_changed(&self, rx_id: usize) -> Result<()> {
        let Some(rx) = self.receivers.get(rx_id) else {
            return Ok(());
        };
        let (mode, filter_idx, deviation) = {
            let vfos = self.vfos.lock()?;
            let v = &vfos[rx_id.min(1)];
            (v.mode, v.filter, i32::from(v.deviation))
        };
        let settings = self.settings.lock()?;
        let sidetone = i32::from(settings.cw_keyer_sidetone_frequency);
        drop(settings);
        let var = self.var_filters.lock()?;
        let (low, high) = filter::filter_edges(mode, filter_idx, sidetone, deviation, Some(&var));
        drop(var);

        let mut s = rx.stream.lock()?;
        s.mode = mode;
        s.filter_low = low;
        s.filter_high = high;
        s.dsp.set_mode(mode);
        s.dsp.set_filter(f64::from(low), f64::from(high));
        // The AGC line depends on the filter width.
        let width = f64::from((high - low).abs().max(1));
        s.agc.thresh = s.agc.gain - 70.0 - 10.0 * width.log10();
        let agc = s.agc;
        s.dsp.set_agc(agc);
        Ok(())
    }

    /// Change a receiver's sample rate, clamping to the protocol cap
    /// and slaving RX1 to RX0 on protocol 1.
    pub fn set_rx_sample_rate(&self, rx_id: usize, rate: u32) -> Result<()> {
        let mut rate = rate;
        if self.radio.protocol == Protocol::P1 && rate > crate::receiver::P1_MAX_SAMPLE_RATE {
            warn!("sample rate {rate} above protocol-1 cap, clamping");
            rate = crate::receiver::P1_MAX_SAMPLE_RATE;
        }
        let slaved = self.radio.protocol == Protocol::P1 && rx_id == 0;
        for rx in &self.receivers {
            if rx.id == rx_id || (slaved && rx.id == 1) {
                rx.change_sample_rate(rate)?;
                let mut vfos = self.vfos.lock()?;
                if rx.id < 2 && vfos[rx.id].clamp_ctun(rate) {
                    info!("rx{}: CTUN offset no longer fits, re-centered", rx.id);
                }
            }
        }
        self.schedule(|w| w.receive_specific());
        Ok(())
    }

    /// Select a band on a VFO: pick its active bandstack entry, copy
    /// it into the VFO, and re-evaluate the hardware side effects.
    pub fn select_band(&self, v: usize, band_index: usize) -> Result<()> {
        let bands = self.bands.lock()?;
        let Some(band) = bands.get(band_index) else {
            return Err(crate::Error::OutOfRange(format!("band {band_index}")));
        };
        let entry = band.stack.entries[band.stack.current];
        let lo = band.frequency_lo;
        let stack_index = band.stack.current;
        drop(bands);

        {
            let mut vfos = self.vfos.lock()?;
            let vfo = &mut vfos[v];
            vfo.band = band_index;
            vfo.bandstack = stack_index;
            vfo.frequency = entry.frequency;
            vfo.ctun = entry.ctun;
            vfo.ctun_frequency = entry.ctun_frequency;
            vfo.offset = if entry.ctun {
                entry.ctun_frequency - entry.frequency
            } else {
                0
            };
            vfo.mode = entry.mode;
            vfo.filter = entry.filter;
            vfo.deviation = entry.deviation;
            vfo.lo = lo;
        }
        self.mode_changed(v)?;
        // OC lines, Alex attenuation and PA calibration all follow
        // the band; the wire engine reads them from here.
        self.schedule(|w| {
            w.high_priority();
            w.general();
        });
        Ok(())
    }

    /// Step to the next bandstack entry of the VFO's current band.
    pub fn bandstack_next(&self, v: usize) -> Result<()> {
        let band_index = self.vfos.lock()?[v].band;
        {
            let mut bands = self.bands.lock()?;
            let stack: &mut Bandstack = &mut bands[band_index].stack;
            stack.advance();
        }
        self.select_band(v, band_index)
    }

    /// Store both VFOs into a memory slot.
    pub fn store_memory(&self, index: usize) -> Result<()> {
        if index >= NUM_MEMORYS {
            return Err(crate::Error::OutOfRange(format!("memory {index}")));
        }
        let (ctcss_enabled, ctcss) = {
            let settings = self.settings.lock()?;
            (settings.ctcss_enabled, settings.ctcss)
        };
        let vfos = self.vfos.lock()?;
        let mut mem = self.memories.lock()?;
        let sat = self.flags.sat_mode.load(Ordering::Relaxed);
        mem[index].store(&vfos[VFO_A], &vfos[VFO_B], sat, ctcss_enabled, ctcss);
        Ok(())
    }

    /// Recall a memory slot into both VFOs.
    pub fn recall_memory(&self, index: usize) -> Result<()> {
        if index >= NUM_MEMORYS {
            return Err(crate::Error::OutOfRange(format!("memory {index}")));
        }
        {
            let mut vfos = self.vfos.lock()?;
            let mem = self.memories.lock()?;
            let (a, b) = vfos.split_at_mut(1);
            mem[index].recall(&mut a[0], &mut b[0]);
        }
        self.mode_changed(VFO_A)?;
        self.schedule(|w| w.high_priority());
        Ok(())
    }

    /// Whether a TX on `freq` is legal, raising the out-of-band
    /// warning if not.
    pub fn check_tx_frequency(&self, freq: i64) -> Result<bool> {
        if self.settings.lock()?.tx_out_of_band_allowed {
            return Ok(true);
        }
        let band_index = self.vfos.lock()?[self.tx_vfo()].band;
        let bands = self.bands.lock()?;
        let ok = bands
            .get(band_index)
            .map(|b| b.contains(freq))
            .unwrap_or(false);
        drop(bands);
        if !ok && let Some(tx) = &self.transmitter {
            tx.set_out_of_band();
            self.ui(UiEvent::Dialog("Out of band".to_string()));
        }
        Ok(ok)
    }

    /// Regenerate CW ramps for the current keyer speed.
    pub fn keyer_speed_changed(&self, wpm: u32) -> Result<()> {
        {
            let mut settings = self.settings.lock()?;
            settings.cw_keyer_speed = wpm;
        }
        if let Some(tx) = &self.transmitter {
            tx.set_ramps(cw::ramp_width_ms(wpm))?;
        }
        self.schedule(|w| w.transmit_specific());
        Ok(())
    }

    /// Assemble the full remote snapshot, in the order the server
    /// streams it.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        // Entity (receiver/transmitter) locks first and released
        // before any store-level lock: the engine threads take them
        // in the opposite direction.
        let mut receivers = Vec::new();
        for rx in &self.receivers {
            let s = rx.stream.lock().unwrap_or_else(|e| e.into_inner());
            let d = rx.display.lock().unwrap_or_else(|e| e.into_inner());
            receivers.push(messages::ReceiverData {
                id: rx.id as u8,
                adc: s.adc,
                agc: s.agc.mode,
                zoom: d.zoom as u8,
                pan: d.pan as u16,
                width: d.width as u16,
                fps: d.fps,
                filter_low: s.filter_low,
                filter_high: s.filter_high,
                hz_per_pixel: f64::from(s.sample_rate) / d.pixels as f64,
                volume: s.volume,
                agc_gain: s.agc.gain,
                agc_hang: s.agc.hang,
                agc_thresh: s.agc.thresh,
                agc_hang_threshold: s.agc.hang_thresh,
                nb: s.noise.nb,
                nr: s.noise.nr,
                anf: u8::from(s.noise.anf),
                snb: u8::from(s.noise.snb),
                sample_rate: u64::from(s.sample_rate),
                ..messages::ReceiverData::default()
            });
        }
        let mut transmitter = self.transmitter.as_ref().map(|tx| {
            let s = tx.stream.lock().unwrap_or_else(|e| e.into_inner());
            messages::TransmitterData {
                id: tx.id as u8,
                drive: s.drive as u8,
                tune_drive: s.tune_drive as u8,
                tune_use_drive: s.tune_use_drive,
                use_rx_filter: s.use_rx_filter,
                puresignal: s.puresignal,
                feedback: s.ps_feedback,
                auto_on: s.ps_auto_on,
                ctcss_enabled: s.ctcss_enabled,
                ctcss: s.ctcss,
                filter_low: s.filter_low,
                filter_high: s.filter_high,
                deviation: s.deviation,
                ..messages::TransmitterData::default()
            }
        });

        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        let vfos = self.vfos.lock().unwrap_or_else(|e| e.into_inner());
        let bands = self.bands.lock().unwrap_or_else(|e| e.into_inner());
        let memories = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        let adc = self.adc.lock().unwrap_or_else(|e| e.into_inner());
        let dac = self.dac.lock().unwrap_or_else(|e| e.into_inner());
        let var = self.var_filters.lock().unwrap_or_else(|e| e.into_inner());
        let soapy = self.soapy.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = transmitter.as_mut() {
            t.width = settings.display_width;
        }

        let mut radio = messages::RadioData {
            name: self.radio.name.clone(),
            locked: self.flags.locked.load(Ordering::Relaxed),
            protocol: match self.radio.protocol {
                Protocol::P1 => 0,
                Protocol::P2 => 1,
                Protocol::Soapy => 2,
            },
            supported_receivers: self.radio.supported_receivers,
            receivers: self.local_receivers as u8,
            n_adc: 2,
            region: settings.region,
            tx_out_of_band_allowed: settings.tx_out_of_band_allowed,
            pa_enabled: settings.pa_enabled,
            cw_keyer_sidetone_volume: settings.cw_keyer_sidetone_volume,
            mute_rx_while_transmitting: self
                .flags
                .mute_rx_while_transmitting
                .load(Ordering::Relaxed),
            split: self.flags.split.load(Ordering::Relaxed),
            sat_mode: self.flags.sat_mode.load(Ordering::Relaxed),
            duplex: self.flags.duplex.load(Ordering::Relaxed),
            diversity_enabled: settings.diversity_enabled,
            have_rx_gain: true,
            pa_power: settings.pa_power,
            cw_keyer_sidetone_frequency: settings.cw_keyer_sidetone_frequency,
            device: self.radio.device.0,
            display_width: settings.display_width,
            drive_max: settings.drive_max,
            drive_digi_max: settings.drive_digi_max,
            div_gain: settings.div_gain,
            div_phase: settings.div_phase,
            frequency_calibration: settings.frequency_calibration,
            radio_frequency_min: self.radio.frequency_min as i64,
            radio_frequency_max: self.radio.frequency_max as i64,
            soapy_rx_antennas: soapy.rx_antennas.len() as u8,
            soapy_tx_antennas: soapy.tx_antennas.len() as u8,
            soapy_rx_gains: soapy.rx_gains.len() as u8,
            soapy_tx_gains: soapy.tx_gains.len() as u8,
            ..messages::RadioData::default()
        };
        for (i, name) in soapy.rx_antennas.iter().take(8).enumerate() {
            radio.soapy_rx_antenna[i] = name.clone();
        }
        for (i, name) in soapy.tx_antennas.iter().take(8).enumerate() {
            radio.soapy_tx_antenna[i] = name.clone();
        }
        for (i, name) in soapy.rx_gains.iter().take(8).enumerate() {
            radio.soapy_rx_gain[i] = name.clone();
        }
        for (i, name) in soapy.tx_gains.iter().take(8).enumerate() {
            radio.soapy_tx_gain[i] = name.clone();
        }
        drop(soapy);

        let adc_data: [messages::AdcData; 2] = std::array::from_fn(|i| messages::AdcData {
            adc: i as u8,
            antenna: adc[i].antenna,
            attenuation: adc[i].attenuation,
            gain: adc[i].gain,
            min_gain: adc[i].min_gain,
            max_gain: adc[i].max_gain,
        });
        let dac_data = messages::DacData {
            antenna: dac.antenna,
            gain: dac.gain,
        };

        let mut var_filters = Vec::new();
        for m in 0..filter::MODES {
            var_filters.push((m as u8, filter::FILTER_VAR1 as u8, var.var1[m]));
            var_filters.push((m as u8, filter::FILTER_VAR2 as u8, var.var2[m]));
        }

        let vfo_data: [messages::VfoData; 2] = std::array::from_fn(|i| {
            let v = &vfos[i];
            messages::VfoData {
                vfo: i as u8,
                band: v.band as u8,
                bandstack: v.bandstack as u8,
                mode: v.mode as u8,
                filter: v.filter as u8,
                ctun: v.ctun,
                rit_enabled: v.rit_enabled,
                xit_enabled: v.xit_enabled,
                cw_audio_peak_filter: v.cw_audio_peak_filter,
                rit_step: v.rit_step,
                deviation: v.deviation,
                frequency: v.frequency,
                ctun_frequency: v.ctun_frequency,
                rit: v.rit,
                xit: v.xit,
                lo: v.lo,
                offset: v.offset,
                step: v.step,
            }
        });

        let mut band_data = Vec::new();
        let mut bandstack_data = Vec::new();
        for (i, b) in bands.iter().enumerate() {
            band_data.push(messages::BandData {
                title: b.title.clone(),
                band: i as u8,
                oc_rx: b.oc_rx,
                oc_tx: b.oc_tx,
                alex_rx_antenna: b.alex_rx_antenna,
                alex_tx_antenna: b.alex_tx_antenna,
                alex_attenuation: b.alex_attenuation,
                disable_pa: b.disable_pa,
                current: b.stack.current as u8,
                gain: b.gain,
                pa_calibration: b.pa_calibration,
                frequency_min: b.frequency_min,
                frequency_max: b.frequency_max,
                frequency_lo: b.frequency_lo,
                error_lo: b.error_lo,
            });
            for (si, e) in b.stack.entries.iter().enumerate() {
                bandstack_data.push(messages::BandstackData {
                    band: i as u8,
                    stack: si as u8,
                    mode: e.mode as u8,
                    filter: e.filter as u8,
                    ctun: e.ctun,
                    ctcss_enabled: e.ctcss_enabled,
                    ctcss: e.ctcss,
                    deviation: e.deviation,
                    frequency: e.frequency,
                    ctun_frequency: e.ctun_frequency,
                });
            }
        }

        let mut memory_data = Vec::new();
        for (i, m) in memories.iter().enumerate() {
            memory_data.push(messages::MemoryData {
                index: i as u8,
                sat_mode: m.sat_mode,
                ctun: m.ctun,
                mode: m.mode as u8,
                filter: m.filter as u8,
                bd: m.band as u8,
                alt_ctun: m.alt_ctun,
                alt_mode: m.alt_mode as u8,
                alt_filter: m.alt_filter as u8,
                alt_bd: m.alt_band as u8,
                ctcss_enabled: m.ctcss_enabled,
                ctcss: m.ctcss,
                deviation: m.deviation,
                alt_deviation: m.alt_deviation,
                frequency: m.frequency,
                ctun_frequency: m.ctun_frequency,
                alt_frequency: m.alt_frequency,
                alt_ctun_frequency: m.alt_ctun_frequency,
            });
        }

        Snapshot {
            radio,
            adc: adc_data,
            dac: dac_data,
            var_filters,
            receivers,
            vfos: vfo_data,
            bands: band_data,
            bandstacks: bandstack_data,
            memories: memory_data,
            transmitter,
        }
    }
}

/// Everything a client needs to mirror the store, in send order.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Global radio data.
    pub radio: messages::RadioData,
    /// Both ADCs.
    pub adc: [messages::AdcData; 2],
    /// The DAC.
    pub dac: messages::DacData,
    /// (mode, filter slot, edges) for every Var filter.
    pub var_filters: Vec<(u8, u8, (i32, i32))>,
    /// All receivers, feedback tap included.
    pub receivers: Vec<messages::ReceiverData>,
    /// VFO A and B.
    pub vfos: [messages::VfoData; 2],
    /// Band table.
    pub bands: Vec<messages::BandData>,
    /// All bandstack entries.
    pub bandstacks: Vec<messages::BandstackData>,
    /// Memory slots.
    pub memories: Vec<messages::MemoryData>,
    /// The transmitter, if one exists.
    pub transmitter: Option<messages::TransmitterData>,
}

impl RxOutput for StateStore {
    fn radio_audio(&self, left: i16, right: i16) {
        if let Ok(g) = self.speaker.lock()
            && let Some(sp) = g.as_ref()
        {
            sp.audio_samples(left, right);
        }
    }

    fn remote_audio(&self, rx_id: usize, left: i16, right: i16) {
        if let Ok(g) = self.remote.lock()
            && let Some(r) = g.as_ref()
        {
            r.rx_audio(rx_id, left, right);
        }
    }

    fn capture(&self, sample: f64) {
        if let Ok(mut c) = self.capture.lock() {
            c.record(sample);
        }
    }

    fn spectrum_ready(&self, rx_id: usize) {
        if let Ok(g) = self.remote.lock()
            && let Some(r) = g.as_ref()
        {
            r.spectrum_ready(rx_id);
        }
        self.ui(UiEvent::Redraw(rx_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::band_id;
    use crate::discovery::DeviceKind;

    fn fake_radio(protocol: Protocol) -> Discovered {
        Discovered {
            protocol,
            device: DeviceKind::HERMES,
            name: "Hermes".to_string(),
            software_version: 33,
            status: 2,
            mac: [2, 0, 0, 0, 0, 1],
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

    #[test]
    fn p1_store_has_feedback_rx() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        assert_eq!(store.receivers.len(), 3);
        assert_eq!(store.receivers[2].id, PS_RX_FEEDBACK);
        assert_eq!(store.local_receivers, 2);
    }

    #[test]
    fn mode_change_rederives_filter() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        {
            let mut vfos = store.vfos.lock().unwrap();
            vfos[0].mode = Mode::Cwu;
            vfos[0].filter = 4; // 500 Hz
        }
        store.mode_changed(0).unwrap();
        let s = store.receivers[0].stream.lock().unwrap();
        assert_eq!(s.filter_low, 450);
        assert_eq!(s.filter_high, 950);
        assert_eq!(s.mode, Mode::Cwu);
    }

    #[test]
    fn p1_slaves_rx1_sample_rate() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        store.set_rx_sample_rate(0, 192_000).unwrap();
        assert_eq!(store.receivers[0].stream.lock().unwrap().sample_rate, 192_000);
        assert_eq!(store.receivers[1].stream.lock().unwrap().sample_rate, 192_000);
        // The feedback tap is not slaved.
        assert_eq!(store.receivers[2].stream.lock().unwrap().sample_rate, 48_000);
    }

    #[test]
    fn p1_sample_rate_cap() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        store.set_rx_sample_rate(0, 768_000).unwrap();
        assert_eq!(store.receivers[0].stream.lock().unwrap().sample_rate, 384_000);
    }

    #[test]
    fn band_select_copies_stack_entry() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        store.select_band(0, band_id::BAND_40).unwrap();
        let vfos = store.vfos.lock().unwrap();
        assert_eq!(vfos[0].band, band_id::BAND_40);
        assert_eq!(vfos[0].frequency, 7_001_000);
        assert_eq!(vfos[0].mode, Mode::Cwl);
    }

    #[test]
    fn memory_store_recall() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        store.select_band(0, band_id::BAND_20).unwrap();
        store.store_memory(2).unwrap();
        store.select_band(0, band_id::BAND_40).unwrap();
        store.recall_memory(2).unwrap();
        assert_eq!(store.vfos.lock().unwrap()[0].frequency, 14_010_000);
    }

    #[test]
    fn out_of_band_check() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        store.select_band(0, band_id::BAND_40).unwrap();
        assert!(store.check_tx_frequency(7_030_000).unwrap());
        assert!(!store.check_tx_frequency(7_700_000).unwrap());
        assert!(store.transmitter.as_ref().unwrap().is_out_of_band());
        {
            store.settings.lock().unwrap().tx_out_of_band_allowed = true;
        }
        assert!(store.check_tx_frequency(7_700_000).unwrap());
    }

    #[test]
    fn snapshot_shape() {
        let store = StateStore::new(fake_radio(Protocol::P1));
        let snap = store.snapshot();
        assert_eq!(snap.receivers.len(), 3);
        assert_eq!(snap.bands.len(), crate::band::BANDS + crate::band::XVTRS);
        assert_eq!(snap.memories.len(), NUM_MEMORYS);
        assert_eq!(snap.var_filters.len(), 2 * filter::MODES);
        assert!(snap.transmitter.is_some());
        assert_eq!(snap.radio.receivers, 2);
    }

    #[test]
    fn capture_lifecycle() {
        let mut c = Capture::default();
        c.start_recording();
        for i in 0..100 {
            c.record(f64::from(i));
        }
        c.state = CaptureState::RecordDone;
        c.start_replay();
        assert_eq!(c.replay_next(), Some(0.0));
        for _ in 0..99 {
            c.replay_next().unwrap();
        }
        assert_eq!(c.replay_next(), None);
        assert_eq!(c.state, CaptureState::ReplayDone);
    }
}
/* vim: textwidth=80
 */
