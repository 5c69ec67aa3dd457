/*! The transmit chain.

One transmitter exists per process. It consumes 16-bit mic samples at
48 kHz, runs them through the TX DSP and hands IQ to the wire engine.
In CW the DSP output is discarded and the RF is synthesized from a
ramp table applied to a zero-frequency carrier: `I(t) = ramp(t),
Q(t) = 0`, with a phase-continuous sidetone shaped by its own ramp.

The mic sample offered by the radio can be replaced by a local
microphone (summed instead when PTT comes from the radio), overridden
by an authenticated remote client, or substituted by capture replay.
*/
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::cw::{CwRing, KEY_DOWN_LIMIT, RampSet, ToneGen};
use crate::discovery::{DeviceKind, Protocol};
use crate::dsp::{BasicTxDsp, TxDsp};
use crate::filter::Mode;
use crate::Result;

/// Boost applied to mic samples in FMN: +15 dB, compensating the
/// pre-emphasis filter's low-frequency attenuation.
pub const FM_MIC_BOOST: f64 = 5.6234;

/// P2's output FIR attenuates a full-scale zero-frequency carrier to
/// this amplitude; CW pulses are pre-scaled to match.
pub const P2_CW_AMPLITUDE: f64 = 0.896;

/// Two-tone test frequencies, Hz.
pub const TWO_TONE_F1: f64 = 700.0;
/// Second two-tone frequency.
pub const TWO_TONE_F2: f64 = 1900.0;

/// Transmit lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxState {
    /// Receiving.
    #[default]
    Idle,
    /// Keyed, streaming IQ.
    Transmit,
    /// TX→RX edge done, waiting out the hardware tail.
    Quiet,
}

/// Where the IQ goes. The wire engines implement this; amplitudes are
/// normalized to ±1.0 and scaled to the wire format downstream.
pub trait TxOutput: Send + Sync {
    /// One IQ pair plus the synchronous sidetone sample (P1 couples
    /// them on the wire; others ignore it).
    fn iq_samples(&self, i: f64, q: f64, sidetone: f64);

    /// P2's dedicated CW sidetone audio path.
    fn cw_audio_samples(&self, left: f64, right: f64) {
        let _ = (left, right);
    }

    /// RX→TX (true) or TX→RX (false) edge, for FIFO padding rules.
    fn tx_edge(&self, transmitting: bool) {
        let _ = transmitting;
    }
}

/// An output that goes nowhere.
#[derive(Debug, Default)]
pub struct NullTxOutput;
impl TxOutput for NullTxOutput {
    fn iq_samples(&self, i: f64, q: f64, sidetone: f64) {
        let _ = (i, q, sidetone);
    }
}

/// Per-sample context from the state store.
pub struct TxEnv<'a> {
    /// TX mode, from the VFO that controls the transmitter.
    pub mode: Mode,
    /// Tune in progress.
    pub tune: bool,
    /// Radio is keyed.
    pub transmitting: bool,
    /// PTT asserted by the radio itself.
    pub radio_ptt: bool,
    /// Wire protocol in use.
    pub protocol: Protocol,
    /// Next local microphone sample, if a device is open.
    pub local_mic: Option<f64>,
    /// Next remote-client mic sample; present iff authenticated.
    pub remote_mic: Option<f64>,
    /// Next capture-replay sample, if replaying.
    pub capture_replay: Option<f64>,
    /// Sidetone pitch, Hz.
    pub cw_keyer_sidetone_frequency: f64,
    /// Sidetone level 0..127.
    pub cw_keyer_sidetone_volume: u8,
    /// CAT-originated CW is active (forces a minimum sidetone).
    pub cat_cw_active: bool,
    /// The radio keys itself; we only ship silence on the CW path.
    pub cw_keyer_internal: bool,
    /// Device kind, for per-hardware quirks.
    pub device: DeviceKind,
    /// IQ sink.
    pub output: &'a dyn TxOutput,
}

/// Stream-side state, under the tx mutex.
pub struct TxStream {
    /// Mic rate is fixed at 48 kHz; IQ leaves at `ratio` times that.
    pub ratio: usize,
    /// Mic buffer size in samples.
    pub buffer_size: usize,
    /// IQ samples out per buffer: `buffer_size × ratio`.
    pub output_samples: usize,
    /// DSP channel.
    pub dsp: Box<dyn TxDsp>,
    /// Drive 0..100.
    pub drive: f64,
    /// Separate drive while tuning.
    pub tune_drive: f64,
    /// Use `tune_drive` when tuning.
    pub tune_use_drive: bool,
    /// TX filter edges.
    pub filter_low: i32,
    /// Upper TX filter edge.
    pub filter_high: i32,
    /// Derive the TX filter from the active RX filter.
    pub use_rx_filter: bool,
    /// FM deviation, Hz.
    pub deviation: u16,
    /// CTCSS enabled.
    pub ctcss_enabled: bool,
    /// CTCSS tone index.
    pub ctcss: u8,
    /// PureSignal enabled.
    pub puresignal: bool,
    /// Feedback spectrum on the TX panadapter.
    pub ps_feedback: bool,
    /// PureSignal auto-calibrates attenuation.
    pub ps_auto_on: bool,
    /// Two-tone test running.
    pub twotone: bool,
    /// Forward power, after PA calibration.
    pub fwd: f64,
    /// Reverse power.
    pub rev: f64,
    /// VSWR moving average.
    pub swr: f64,
    /// SWR alarm threshold.
    pub swr_alarm: f64,
    /// Force drive to zero on sustained high SWR.
    pub swr_protection: bool,
    /// ALC reading.
    pub alc: f64,
    /// Lifecycle.
    pub state: TxState,
    mic_ring: Vec<f64>,
    iq_out: Vec<f64>,
    cw_sig_rf: Vec<f64>,
    samples: usize,
    keydown: bool,
    cw_delay_time: u32,
    sidetone_radio: ToneGen,
    sidetone_local: ToneGen,
    txflag: bool,
    pre_high_swr: bool,
}

impl std::fmt::Debug for TxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStream")
            .field("ratio", &self.ratio)
            .field("buffer_size", &self.buffer_size)
            .field("state", &self.state)
            .finish()
    }
}

/// Ramp tables and their positions, under their own mutex so a width
/// change mid-transmission inserts a hard zero instead of blocking
/// the sample clock.
#[derive(Debug)]
pub struct TxRamps {
    /// The tables.
    pub set: RampSet,
    rf_ptr: usize,
    audio_ptr: usize,
}

/// The transmitter.
pub struct Transmitter {
    /// Display id (the panadapter slot after the receivers).
    pub id: usize,
    /// Stream state.
    pub stream: Mutex<TxStream>,
    /// CW ramps.
    pub ramps: Mutex<TxRamps>,
    /// Key event ring, shared with CAT/MIDI/remote producers.
    pub cw_ring: Arc<CwRing>,
    /// High SWR latched; reported in INFO_DISPLAY.
    pub high_swr_seen: AtomicBool,
    /// Out-of-band warning, cleared by a one-shot timer.
    out_of_band: AtomicBool,
    oob_generation: AtomicU32,
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter").field("id", &self.id).finish()
    }
}

impl Transmitter {
    /// Create the transmitter. `ratio` is the IQ oversampling factor
    /// relative to the 48 kHz mic clock (1 for P1 at 48 k, 4 for P2).
    #[must_use]
    pub fn new(id: usize, buffer_size: usize, ratio: usize) -> Self {
        let output_samples = buffer_size * ratio;
        Self {
            id,
            stream: Mutex::new(TxStream {
                ratio,
                buffer_size,
                output_samples,
                dsp: Box::new(BasicTxDsp::new(48_000 * ratio as u32)),
                drive: 50.0,
                tune_drive: 10.0,
                tune_use_drive: false,
                filter_low: 150,
                filter_high: 2850,
                use_rx_filter: false,
                deviation: 2500,
                ctcss_enabled: false,
                ctcss: 0,
                puresignal: false,
                ps_feedback: false,
                ps_auto_on: false,
                twotone: false,
                fwd: 0.0,
                rev: 0.0,
                swr: 1.0,
                swr_alarm: 3.0,
                swr_protection: false,
                alc: 0.0,
                state: TxState::Idle,
                mic_ring: vec![0.0; 2 * buffer_size],
                iq_out: vec![0.0; 2 * output_samples],
                cw_sig_rf: vec![0.0; output_samples],
                samples: 0,
                keydown: false,
                cw_delay_time: 0,
                sidetone_radio: ToneGen::default(),
                sidetone_local: ToneGen::default(),
                txflag: false,
                pre_high_swr: false,
            }),
            ramps: Mutex::new(TxRamps {
                set: RampSet::new(7, ratio),
                rf_ptr: 0,
                audio_ptr: 0,
            }),
            cw_ring: Arc::new(CwRing::new()),
            high_swr_seen: AtomicBool::new(false),
            out_of_band: AtomicBool::new(false),
            oob_generation: AtomicU32::new(0),
        }
    }

    /// Regenerate both CW ramps for a new width (ms). Called on CW
    /// speed or ramp-width changes.
    pub fn set_ramps(&self, ramp_ms: u32) -> Result<()> {
        let ratio = self.stream.lock()?.ratio;
        let mut r = self.ramps.lock()?;
        r.set = RampSet::new(ramp_ms, ratio);
        r.rf_ptr = 0;
        r.audio_ptr = 0;
        Ok(())
    }

    /// Out-of-band warning flag.
    #[must_use]
    pub fn is_out_of_band(&self) -> bool {
        self.out_of_band.load(Ordering::Relaxed)
    }

    /// Raise the out-of-band warning and clear it after one second.
    pub fn set_out_of_band(self: &Arc<Self>) {
        self.out_of_band.store(true, Ordering::Relaxed);
        let generation = self.oob_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let me = Arc::clone(self);
        let r = std::thread::Builder::new()
            .name("oob timer".to_string())
            .spawn(move || {
                std::thread::sleep(Duration::from_secs(1));
                if me.oob_generation.load(Ordering::SeqCst) == generation {
                    me.out_of_band.store(false, Ordering::Relaxed);
                }
            });
        if let Err(e) = r {
            warn!("out-of-band timer: {e}");
            self.out_of_band.store(false, Ordering::Relaxed);
        }
    }

    /// One mic sample at 48 kHz. This is the TX engine's heartbeat:
    /// it advances the CW shaper and, every `buffer_size` samples,
    /// exchanges a full buffer.
    pub fn add_mic_sample(&self, next_mic_sample: i16, env: &TxEnv) {
        let Ok(mut s) = self.stream.lock() else {
            return;
        };

        let mut mic = f64::from(next_mic_sample) * 0.000_030_51; // /32768

        // Local mic replaces the radio's sample, except that PTT from
        // the radio means both are live and get summed.
        if let Some(local) = env.local_mic {
            if env.radio_ptt {
                mic += local;
            } else {
                mic = local;
            }
        }

        // An authenticated client wins over everything local.
        if let Some(remote) = env.remote_mic {
            mic = remote;
        }

        if let Some(replay) = env.capture_replay {
            mic = replay;
        }

        // Silence TX audio while tuning or doing CW; keeps VOX quiet.
        if env.tune || env.mode.is_cw() {
            mic = 0.0;
        }

        if s.cw_delay_time < 9_999_999 {
            s.cw_delay_time += 1;
        }

        if env.mode.is_cw() && env.transmitting {
            self.shape_cw(&mut s, env);
        } else {
            // Not doing CW (or not transmitting): reset the shaper and
            // swallow pending events.
            s.keydown = false;
            self.cw_ring.clear();
            if let Ok(mut r) = self.ramps.lock() {
                r.rf_ptr = 0;
                r.audio_ptr = 0;
            }
            let j = s.ratio * s.samples;
            let ratio = s.ratio;
            for i in 0..ratio {
                s.cw_sig_rf[j + i] = 0.0;
            }
        }

        let n = s.samples;
        s.mic_ring[2 * n] = mic;
        s.mic_ring[2 * n + 1] = 0.0;
        s.samples += 1;
        if s.samples == s.buffer_size {
            self.full_buffer(&mut s, env);
            s.samples = 0;
        }
    }

    /// Advance the CW pulse shaper by one mic sample: pop due key
    /// events, walk the ramp pointers, produce `ratio` RF envelope
    /// samples and one sidetone sample.
    fn shape_cw(&self, s: &mut TxStream, env: &TxEnv) {
        // Hardware protection: no key-down lasts longer than 20 s.
        if s.keydown && s.cw_delay_time > KEY_DOWN_LIMIT {
            s.keydown = false;
        }
        if let Some(down) = self.cw_ring.poll(s.cw_delay_time) {
            s.cw_delay_time = 0;
            s.keydown = down;
        }

        let j = s.ratio * s.samples;
        let ratio = s.ratio;
        let mut val = 0.0;
        match self.ramps.try_lock() {
            Ok(mut r) => {
                if s.keydown {
                    if r.audio_ptr < r.set.audio.len() - 1 {
                        r.audio_ptr += 1;
                    }
                    val = r.set.audio[r.audio_ptr];
                    for i in 0..ratio {
                        if r.rf_ptr < r.set.rf.len() - 1 {
                            r.rf_ptr += 1;
                        }
                        s.cw_sig_rf[j + i] = r.set.rf[r.rf_ptr];
                    }
                } else {
                    if r.audio_ptr > 0 {
                        r.audio_ptr -= 1;
                    }
                    val = r.set.audio[r.audio_ptr];
                    for i in 0..ratio {
                        if r.rf_ptr > 0 {
                            r.rf_ptr -= 1;
                        }
                        s.cw_sig_rf[j + i] = r.set.rf[r.rf_ptr];
                    }
                }
            }
            Err(_) => {
                // Ramp width being changed mid-key: insert a hard zero.
                for i in 0..ratio {
                    s.cw_sig_rf[j + i] = 0.0;
                }
            }
        }

        // Sidetone sample for this mic tick, 0.0 .. 0.25.
        let vol = if env.cw_keyer_sidetone_volume == 0 && env.cat_cw_active {
            12
        } else {
            env.cw_keyer_sidetone_volume
        };
        let tone = s
            .sidetone_local
            .next(env.cw_keyer_sidetone_frequency, 48_000.0);
        let cwsample = 0.00196 * f64::from(vol) * val * tone;

        // P2 needs a constant audio flow to the radio; silence when
        // the radio keys itself.
        if env.protocol == Protocol::P2 {
            let sample = if !env.cw_keyer_internal || env.cat_cw_active {
                cwsample * 4.0
            } else {
                0.0
            };
            env.output.cw_audio_samples(sample, sample);
        }
    }

    /// Exchange one full mic buffer for IQ and ship it.
    fn full_buffer(&self, s: &mut TxStream, env: &TxEnv) {
        // Query mode/tune once so both cwmode decisions agree.
        let cwmode = env.mode.is_cw() && !env.tune && !s.twotone;

        if cwmode {
            // The DSP is still called, to track slew state, but its
            // output is discarded; the RF comes from the ramp table.
            let TxStream {
                dsp,
                mic_ring,
                iq_out,
                ..
            } = s;
            dsp.exchange(mic_ring, iq_out);
            for j in 0..s.output_samples {
                s.iq_out[2 * j] = 0.0;
                s.iq_out[2 * j + 1] = s.cw_sig_rf[j];
            }
        } else {
            // FM pre-emphasis boost, after VOX would have sampled the
            // level and before the DSP call.
            if env.mode == Mode::Fmn && !env.tune {
                for i in 0..s.buffer_size {
                    s.mic_ring[2 * i] *= FM_MIC_BOOST;
                }
            }
            // Downward expander runs outside the DSP channel.
            let TxStream {
                dsp,
                mic_ring,
                iq_out,
                ..
            } = s;
            dsp.dexp(mic_ring);
            dsp.exchange(mic_ring, iq_out);
        }

        if !env.transmitting {
            if s.txflag {
                // Once per TX→RX edge.
                env.output.tx_edge(false);
            }
            s.txflag = false;
            return;
        }

        if !s.txflag {
            // Once per RX→TX edge, before the first sample.
            env.output.tx_edge(true);
        }
        s.txflag = true;

        if cwmode {
            let amplitude = match env.protocol {
                Protocol::P2 => P2_CW_AMPLITUDE,
                _ => 1.0,
            };
            let vol = if env.cw_keyer_sidetone_volume == 0 && env.cat_cw_active {
                12
            } else {
                env.cw_keyer_sidetone_volume
            };
            let sidevol = f64::from(vol) / 127.0;
            for j in 0..s.output_samples {
                let ramp = s.cw_sig_rf[j];
                let sidetone = if env.protocol == Protocol::P1 {
                    sidevol
                        * ramp
                        * s.sidetone_radio
                            .next(env.cw_keyer_sidetone_frequency, 48_000.0)
                } else {
                    0.0
                };
                match env.protocol {
                    // For a zero-frequency carrier the pulse amplitude
                    // sits in I; Soapy wants it in Q.
                    Protocol::Soapy => env.output.iq_samples(0.0, ramp, 0.0),
                    _ => env.output.iq_samples(amplitude * ramp, 0.0, sidetone),
                }
            }
        } else {
            for j in 0..s.output_samples {
                let i = s.iq_out[2 * j];
                let q = s.iq_out[2 * j + 1];
                env.output.iq_samples(i, q, 0.0);
            }
        }
    }

    /// Engage or release the two-tone test. While engaged with
    /// PureSignal auto-calibration, the caller runs the 100 ms
    /// calibration timer; on release, radios with a TX FIFO tail need
    /// 100 ms of silence before un-keying.
    pub fn set_twotone(&self, state: bool, env: &TxEnv) -> Result<()> {
        let mut s = self.stream.lock()?;
        if state == s.twotone {
            return Ok(());
        }
        s.twotone = state;
        if state {
            let (f1, f2) = match env.mode {
                Mode::Cwl | Mode::Lsb | Mode::Digl => (-TWO_TONE_F1, -TWO_TONE_F2),
                _ => (TWO_TONE_F1, TWO_TONE_F2),
            };
            s.dsp.set_two_tone(true, f1, f2);
        } else {
            s.dsp.set_two_tone(false, 0.0, 0.0);
            drop(s);
            if matches!(
                env.device,
                DeviceKind::HERMES_LITE
                    | DeviceKind::HERMES_LITE2
                    | DeviceKind::HERMES
                    | DeviceKind::STEMLAB
                    | DeviceKind::STEMLAB_Z20
            ) {
                // Fill the TX IQ FIFO with zeroes before un-keying.
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        Ok(())
    }

    /// Feed one forward/reverse power reading pair. Implements the
    /// SWR moving average and the protection rule: two consecutive
    /// readings at or above the alarm threshold, with protection on
    /// and not tuning, force drive to zero. Returns true if
    /// protection fired.
    pub fn update_swr(&self, fwd: f64, rev: f64, tuning: bool) -> bool {
        let Ok(mut s) = self.stream.lock() else {
            return false;
        };
        if fwd > 0.25 {
            let mut gamma = (rev / fwd).max(0.0).sqrt();
            // Keeps the moving average recoverable.
            if gamma > 0.95 {
                gamma = 0.95;
            }
            s.swr = 0.7 * (1.0 + gamma) / (1.0 - gamma) + 0.3 * s.swr;
        } else {
            // During RX, decay towards 1.0.
            s.swr = 0.7 + 0.3 * s.swr;
        }
        s.fwd = fwd;
        s.rev = rev;

        let mut fired = false;
        if s.swr >= s.swr_alarm {
            if s.pre_high_swr {
                if s.swr_protection && !tuning {
                    s.drive = 0.0;
                    fired = true;
                }
                self.high_swr_seen.store(true, Ordering::Relaxed);
            }
            s.pre_high_swr = true;
        } else {
            s.pre_high_swr = false;
        }
        fired
    }

    /// RX→TX / TX→RX transitions of the state machine. The `Quiet`
    /// phase belongs to the caller's timing (tail radios).
    pub fn set_transmit(&self, on: bool) -> Result<()> {
        let mut s = self.stream.lock()?;
        s.state = match (s.state, on) {
            (TxState::Idle, true) => TxState::Transmit,
            (TxState::Transmit, false) => TxState::Quiet,
            (TxState::Quiet, false) => TxState::Idle,
            (TxState::Quiet, true) => TxState::Transmit,
            (st, _) => st,
        };
        info!("tx: state {:?}", s.state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CollectOutput {
        iq: StdMutex<Vec<(f64, f64, f64)>>,
        edges: StdMutex<Vec<bool>>,
    }

    impl CollectOutput {
        fn new() -> Self {
            Self {
                iq: StdMutex::new(Vec::new()),
                edges: StdMutex::new(Vec::new()),
            }
        }
    }

    impl TxOutput for CollectOutput {
        fn iq_samples(&self, i: f64, q: f64, sidetone: f64) {
            self.iq.lock().unwrap().push((i, q, sidetone));
        }
        fn tx_edge(&self, transmitting: bool) {
            self.edges.lock().unwrap().push(transmitting);
        }
    }

    fn cw_env<'a>(output: &'a dyn TxOutput, transmitting: bool) -> TxEnv<'a> {
        TxEnv {
            mode: Mode::Cwu,
            tune: false,
            transmitting,
            radio_ptt: false,
            protocol: Protocol::P2,
            local_mic: None,
            remote_mic: None,
            capture_replay: None,
            cw_keyer_sidetone_frequency: 700.0,
            cw_keyer_sidetone_volume: 64,
            cat_cw_active: false,
            cw_keyer_internal: false,
            device: DeviceKind::NEW_SATURN,
            output,
        }
    }

    #[test]
    fn cw_envelope_matches_ramp_table() {
        // 7 ms ramp at ratio 4: the first and last 1344 IQ samples of
        // a 60 ms dot follow the table; the top is flat at 1.0.
        let tx = Transmitter::new(8, 480, 4);
        tx.set_ramps(7).unwrap();
        let out = CollectOutput::new();
        let env = cw_env(&out, true);

        tx.cw_ring.queue(true, 0);
        let dot_samples = 2880; // 60 ms of mic clock
        for _ in 0..dot_samples {
            tx.add_mic_sample(0, &env);
        }
        tx.cw_ring.queue(false, 0);
        for _ in 0..2880 {
            tx.add_mic_sample(0, &env);
        }

        let iq = out.iq.lock().unwrap();
        let ramp = crate::cw::rf_ramp(7 * 48 * 4);
        let rise: Vec<f64> = iq.iter().take(1344).map(|s| s.0).collect();
        for (k, v) in rise.iter().enumerate() {
            let want = P2_CW_AMPLITUDE * ramp[k + 1];
            assert!(
                (v - want).abs() < 1e-9,
                "rise sample {k}: {v} != {want}"
            );
        }
        // Flat top at the center of the dot.
        let center = iq[4 * 1440].0 / P2_CW_AMPLITUDE;
        assert!((center - 1.0).abs() < 1e-9, "flat top {center}");
        // Q stays zero through the pulse.
        assert!(iq.iter().all(|s| s.1 == 0.0));
        // The tail returns to zero.
        let last = iq.last().unwrap().0;
        assert!(last.abs() < 1e-9, "tail {last}");
    }

    #[test]
    fn key_down_forced_up_after_20s() {
        let tx = Transmitter::new(8, 48, 1);
        let out = CollectOutput::new();
        let env = cw_env(&out, true);
        tx.cw_ring.queue(true, 0);
        tx.add_mic_sample(0, &env);
        {
            let mut s = tx.stream.lock().unwrap();
            assert!(s.keydown);
            s.cw_delay_time = KEY_DOWN_LIMIT + 1;
        }
        tx.add_mic_sample(0, &env);
        assert!(!tx.stream.lock().unwrap().keydown);
    }

    #[test]
    fn tx_edges_fire_once_per_transition() {
        let tx = Transmitter::new(8, 16, 1);
        let out = CollectOutput::new();
        let mut env = cw_env(&out, true);
        env.mode = Mode::Usb;
        for _ in 0..32 {
            tx.add_mic_sample(100, &env);
        }
        env.transmitting = false;
        for _ in 0..32 {
            tx.add_mic_sample(100, &env);
        }
        env.transmitting = true;
        for _ in 0..16 {
            tx.add_mic_sample(100, &env);
        }
        assert_eq!(*out.edges.lock().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn swr_protection_two_consecutive_readings() {
        let tx = Transmitter::new(8, 16, 1);
        {
            let mut s = tx.stream.lock().unwrap();
            s.swr_protection = true;
            s.swr_alarm = 3.0;
            s.drive = 80.0;
            // Preload the moving average near the alarm.
            s.swr = 3.05;
        }
        // rev/fwd = 0.25 → gamma 0.5 → instant SWR 3.0.
        assert!(!tx.update_swr(40.0, 10.0, false), "first reading arms only");
        assert!(tx.update_swr(40.0, 10.0, false), "second reading fires");
        assert!(tx.high_swr_seen.load(Ordering::Relaxed));
        assert_eq!(tx.stream.lock().unwrap().drive, 0.0);
    }

    #[test]
    fn swr_protection_not_while_tuning() {
        let tx = Transmitter::new(8, 16, 1);
        {
            let mut s = tx.stream.lock().unwrap();
            s.swr_protection = true;
            s.swr = 3.5;
            s.drive = 80.0;
        }
        assert!(!tx.update_swr(40.0, 10.0, true));
        assert!(!tx.update_swr(40.0, 10.0, true));
        // The warning flag still latches.
        assert!(tx.high_swr_seen.load(Ordering::Relaxed));
        assert_eq!(tx.stream.lock().unwrap().drive, 80.0);
    }

    #[test]
    fn fm_mic_boost_applies() {
        let tx = Transmitter::new(8, 4, 1);
        let out = CollectOutput::new();
        let mut env = cw_env(&out, true);
        env.mode = Mode::Fmn;
        for _ in 0..4 {
            tx.add_mic_sample(1000, &env);
        }
        let iq = out.iq.lock().unwrap();
        let expect = 1000.0 * 0.000_030_51 * FM_MIC_BOOST;
        assert!((iq[0].0 - expect).abs() < 1e-9);
    }

    #[test]
    fn remote_mic_wins_over_local() {
        let tx = Transmitter::new(8, 4, 1);
        let out = CollectOutput::new();
        let mut env = cw_env(&out, true);
        env.mode = Mode::Usb;
        env.local_mic = Some(0.25);
        env.remote_mic = Some(0.5);
        for _ in 0..4 {
            tx.add_mic_sample(1000, &env);
        }
        let iq = out.iq.lock().unwrap();
        assert!((iq[0].0 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn radio_ptt_sums_local_mic() {
        let tx = Transmitter::new(8, 4, 1);
        let out = CollectOutput::new();
        let mut env = cw_env(&out, true);
        env.mode = Mode::Usb;
        env.local_mic = Some(0.25);
        env.radio_ptt = true;
        for _ in 0..4 {
            tx.add_mic_sample(16384, &env); // 0.5 from the radio
        }
        let iq = out.iq.lock().unwrap();
        assert!((iq[0].0 - (0.25 + 16384.0 * 0.000_030_51)).abs() < 1e-6);
    }

    #[test]
    fn out_of_band_clears_itself() {
        let tx = Arc::new(Transmitter::new(8, 16, 1));
        tx.set_out_of_band();
        assert!(tx.is_out_of_band());
        std::thread::sleep(Duration::from_millis(1300));
        assert!(!tx.is_out_of_band());
    }
}
/* vim: textwidth=80
 */
