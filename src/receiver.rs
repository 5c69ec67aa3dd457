/*! Receive chains.

Each receiver owns an input ring of `2 × buffer_size` doubles
(interleaved I,Q). The wire engine thread pushes samples in; every
time the ring fills, the whole buffer goes through the noise blanker,
the DSP exchange and the spectrum analyzer, and the resulting audio
fans out to the local sink, the radio speaker path, the remote client
stream and the capture buffer.

Two locks with distinct jobs: `stream` guards everything a
reconfiguration (sample rate, buffer size) touches, and producers take
it with try-lock, skipping a buffer on contention rather than stalling
the socket reader. `display` guards the analyzer against readers.
*/
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::info;

use crate::dsp::{AgcParams, BasicRxDsp, NoiseParams, RxDsp};
use crate::filter::Mode;
use crate::spectrum::Analyzer;
use crate::{Error, Result};

/// Receiver ids at or above the local receiver count are PureSignal
/// feedback taps; this is the conventional feedback id with two local
/// receivers.
pub const PS_RX_FEEDBACK: usize = 2;

/// Legal protocol-1 sample rates; the hard cap is 384 k.
pub const P1_MAX_SAMPLE_RATE: u32 = 384_000;

/// Lifecycle of a receive chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RxState {
    /// Allocated, not yet configured.
    #[default]
    Uninit,
    /// Configured, stream not running.
    Ready,
    /// Streaming.
    Running,
    /// Paused for reconfiguration.
    Paused,
    /// Tearing down.
    Closing,
}

/// Everything the stream lock guards.
pub struct RxStream {
    /// Lifecycle state.
    pub state: RxState,
    /// ADC this chain listens to.
    pub adc: u8,
    /// Input rate, a power-of-two multiple of 48 kHz.
    pub sample_rate: u32,
    /// Input buffer size in IQ pairs.
    pub buffer_size: usize,
    /// Audio samples out per buffer: `buffer_size / (rate / 48k)`.
    pub output_samples: usize,
    /// DSP channel.
    pub dsp: Box<dyn RxDsp>,
    /// Noise blanker selector (0 off, 1 NB, 2 NB2).
    pub nb: u8,
    /// Filter edges, Hz.
    pub filter_low: i32,
    /// Upper filter edge, Hz.
    pub filter_high: i32,
    /// Mode this chain demodulates.
    pub mode: Mode,
    /// AGC block.
    pub agc: AgcParams,
    /// Noise processor block.
    pub noise: NoiseParams,
    /// Audio volume, dB.
    pub volume: f64,
    /// Mute the HPSDR speaker stream only.
    pub mute_radio: bool,
    /// Zeros to substitute after a TX→RX edge (0 disables).
    pub txrxmax: u32,
    txrxcount: u32,
    pub(crate) ring: Vec<f64>,
    samples: usize,
    audio: Vec<f64>,
}

impl std::fmt::Debug for RxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxStream")
            .field("state", &self.state)
            .field("sample_rate", &self.sample_rate)
            .field("buffer_size", &self.buffer_size)
            .field("output_samples", &self.output_samples)
            .finish()
    }
}

/// Everything the display lock guards.
#[derive(Debug)]
pub struct RxDisplay {
    /// Screen width in pixels.
    pub width: usize,
    /// Zoom factor 1..8.
    pub zoom: usize,
    /// Total analyzer pixels: `width × zoom`.
    pub pixels: usize,
    /// Pan offset into the pixel row.
    pub pan: usize,
    /// S-meter level, dBm.
    pub meter: f64,
    /// Panadapter Y range, dB.
    pub panadapter_low: i32,
    /// Upper edge of the panadapter Y range.
    pub panadapter_high: i32,
    /// Waterfall Y range, dB.
    pub waterfall_low: i32,
    /// Upper edge of the waterfall Y range.
    pub waterfall_high: i32,
    /// Frames per second the analyzer aims for.
    pub fps: u16,
    /// The analyzer, re-created on zoom/width/rate changes.
    pub analyzer: Analyzer,
}

/// Per-buffer context the producer hands to the fan-out: the global
/// flags snapshot plus the sinks.
pub struct RxEnv<'a> {
    /// Radio is transmitting (mox or tune).
    pub transmitting: bool,
    /// Duplex: keep receiving while transmitting.
    pub duplex: bool,
    /// Mute RX audio during TX even in duplex.
    pub mute_rx_while_transmitting: bool,
    /// This chain is the active receiver.
    pub active: bool,
    /// Capture is recording.
    pub capture_recording: bool,
    /// Where the audio goes.
    pub output: &'a dyn RxOutput,
}

/// Audio and spectrum fan-out. One composite implementation (the
/// state store) routes to local audio, the wire engine, the remote
/// server and the capture buffer.
pub trait RxOutput: Send + Sync {
    /// Local audio sink.
    fn audio(&self, rx_id: usize, left: f64, right: f64) {
        let _ = (rx_id, left, right);
    }

    /// HPSDR speaker path.
    fn radio_audio(&self, left: i16, right: i16) {
        let _ = (left, right);
    }

    /// Remote client audio stream.
    fn remote_audio(&self, rx_id: usize, left: i16, right: i16) {
        let _ = (rx_id, left, right);
    }

    /// Capture buffer, pre-mixed mono.
    fn capture(&self, sample: f64) {
        let _ = sample;
    }

    /// The analyzer produced a fresh pixel row.
    fn spectrum_ready(&self, rx_id: usize) {
        let _ = rx_id;
    }
}

/// A fan-out that goes nowhere.
#[derive(Debug, Default)]
pub struct NullOutput;
impl RxOutput for NullOutput {}

/// One receive chain.
pub struct Receiver {
    /// 0-based id; ids at or above the local count are feedback taps.
    pub id: usize,
    /// Stream state, reconfiguration guard.
    pub stream: Mutex<RxStream>,
    /// Display state, spectrum readers vs writer.
    pub display: Mutex<RxDisplay>,
    /// Analyzer runs only while something displays this chain.
    pub displaying: AtomicBool,
    /// Buffers skipped because the stream lock was contended.
    pub skipped_buffers: AtomicU32,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").field("id", &self.id).finish()
    }
}

fn output_samples_for(buffer_size: usize, sample_rate: u32) -> usize {
    buffer_size / (sample_rate as usize / 48_000)
}

impl Receiver {
    /// Create a chain in `Ready` state.
    #[must_use]
    pub fn new(id: usize, sample_rate: u32, buffer_size: usize, width: usize) -> Self {
        let output_samples = output_samples_for(buffer_size, sample_rate);
        let zoom = 1;
        let pixels = width * zoom;
        Self {
            id,
            stream: Mutex::new(RxStream {
                state: RxState::Ready,
                adc: 0,
                sample_rate,
                buffer_size,
                output_samples,
                dsp: Box::new(BasicRxDsp::new(sample_rate)),
                nb: 0,
                filter_low: 150,
                filter_high: 2850,
                mode: Mode::Usb,
                agc: AgcParams::default(),
                noise: NoiseParams::default(),
                volume: 0.0,
                mute_radio: false,
                txrxmax: 0,
                txrxcount: 0,
                ring: vec![0.0; 2 * buffer_size],
                samples: 0,
                audio: vec![0.0; 2 * output_samples],
            }),
            display: Mutex::new(RxDisplay {
                width,
                zoom,
                pixels,
                pan: 0,
                meter: -130.0,
                panadapter_low: -140,
                panadapter_high: -40,
                waterfall_low: -140,
                waterfall_high: -40,
                fps: 10,
                analyzer: Analyzer::new(pixels),
            }),
            displaying: AtomicBool::new(false),
            skipped_buffers: AtomicU32::new(0),
        }
    }

    /// `hz_per_pixel = sample_rate / pixels`.
    #[must_use]
    pub fn hz_per_pixel(&self) -> f64 {
        let rate = self.stream.lock().map(|s| s.sample_rate).unwrap_or(48_000);
        let pixels = self.display.lock().map(|d| d.pixels).unwrap_or(1);
        f64::from(rate) / pixels as f64
    }

    /// Arm the TX→RX tail suppression: the next `txrxmax` input
    /// samples are zeroed.
    pub fn arm_txrx_silence(&self) {
        if let Ok(mut s) = self.stream.lock() {
            s.txrxcount = 0;
        }
    }

    /// Producer entry: one IQ sample. Try-locks the stream and drops
    /// the sample during a reconfiguration.
    pub fn add_iq_samples(&self, i: f64, q: f64, env: &RxEnv) {
        let Ok(mut s) = self.stream.try_lock() else {
            self.skipped_buffers.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if s.state != RxState::Running {
            return;
        }
        self.push_sample(&mut s, i, q, env);
    }

    /// Producer entry for diversity mixing on two-ADC radios: the
    /// second channel is rotated by the diversity gain/phase pair and
    /// summed onto the first.
    pub fn add_div_iq_samples(
        &self,
        i0: f64,
        q0: f64,
        i1: f64,
        q1: f64,
        div_cos: f64,
        div_sin: f64,
        env: &RxEnv,
    ) {
        let i = i0 + (div_cos * i1 - div_sin * q1);
        let q = q0 + (div_sin * i1 + div_cos * q1);
        self.add_iq_samples(i, q, env);
    }

    fn push_sample(&self, s: &mut MutexGuard<RxStream>, mut i: f64, mut q: f64, env: &RxEnv) {
        if s.txrxcount < s.txrxmax {
            i = 0.0;
            q = 0.0;
            s.txrxcount += 1;
        }
        let n = s.samples;
        s.ring[2 * n] = i;
        s.ring[2 * n + 1] = q;
        s.samples += 1;
        if s.samples >= s.buffer_size {
            self.full_buffer(s, env);
            s.samples = 0;
        }
    }

    fn full_buffer(&self, s: &mut MutexGuard<RxStream>, env: &RxEnv) {
        let st = &mut **s;
        if st.nb != 0 {
            let nb = st.nb;
            st.dsp.noise_blanker(nb, &mut st.ring);
        }
        st.dsp.exchange(&st.ring, &mut st.audio);

        // Feed the analyzer under the display lock, but fire the
        // frame-ready callback after releasing it: the remote server
        // takes the same lock to read the pixels out.
        let mut produced = false;
        if self.displaying.load(Ordering::Relaxed)
            && let Ok(mut d) = self.display.lock()
        {
            produced = d.analyzer.feed(&st.ring);
            if produced {
                d.meter = meter_from_pixels(d.analyzer.pixel_samples());
            }
        }
        if produced {
            env.output.spectrum_ready(self.id);
        }

        self.process_buffer(st, env);
    }

    /// Audio fan-out for one exchanged buffer.
    fn process_buffer(&self, st: &mut RxStream, env: &RxEnv) {
        for o in 0..st.output_samples {
            let (left, right) = if env.transmitting
                && (!env.duplex || env.mute_rx_while_transmitting)
            {
                (0.0, 0.0)
            } else {
                (st.audio[2 * o], st.audio[2 * o + 1])
            };
            let left_i = (left * 32767.0) as i16;
            let right_i = (right * 32767.0) as i16;

            env.output.audio(self.id, left, right);
            env.output.remote_audio(self.id, left_i, right_i);

            if env.active && env.capture_recording {
                // Normalize: with AGC on, a strong signal sits near
                // 0.8, and volume has not been applied yet.
                let scale = 0.6 * 10f64.powf(-0.05 * st.volume);
                env.output.capture(scale * (left + right));
            }

            if env.active && !env.transmitting {
                if st.mute_radio {
                    env.output.radio_audio(0, 0);
                } else {
                    env.output.radio_audio(left_i, right_i);
                }
            }
        }
    }

    /// Start streaming.
    pub fn start(&self) -> Result<()> {
        let mut s = self.stream.lock()?;
        match s.state {
            RxState::Ready | RxState::Paused => {
                s.state = RxState::Running;
                Ok(())
            }
            other => Err(Error::OutOfRange(format!(
                "rx{} cannot start from {other:?}",
                self.id
            ))),
        }
    }

    /// Pause for reconfiguration; drains the partial ring.
    pub fn pause(&self) -> Result<()> {
        let mut s = self.stream.lock()?;
        s.state = RxState::Paused;
        s.samples = 0;
        Ok(())
    }

    /// Shut the chain down for good.
    pub fn close(&self) {
        if let Ok(mut s) = self.stream.lock() {
            s.state = RxState::Closing;
            s.samples = 0;
        }
    }

    /// Change the input sample rate. Only legal while Ready or
    /// Paused; rates that are no power-of-two multiple of 48 kHz are
    /// rejected.
    pub fn set_sample_rate(&self, rate: u32) -> Result<()> {
        if rate % 48_000 != 0 || !(rate / 48_000).is_power_of_two() {
            return Err(Error::OutOfRange(format!("sample rate {rate}")));
        }
        let mut s = self.stream.lock()?;
        if !matches!(s.state, RxState::Ready | RxState::Paused) {
            return Err(Error::OutOfRange(format!(
                "rx{} sample-rate change in {:?}",
                self.id, s.state
            )));
        }
        s.sample_rate = rate;
        s.samples = 0;
        s.txrxcount = 0;
        s.output_samples = output_samples_for(s.buffer_size, rate);
        s.audio = vec![0.0; 2 * s.output_samples];
        s.dsp.set_sample_rate(rate);
        drop(s);
        if let Ok(mut d) = self.display.lock() {
            let pixels = d.pixels;
            d.analyzer = Analyzer::new(pixels);
        }
        info!("rx{}: sample rate {rate}", self.id);
        Ok(())
    }

    /// Atomically change rate from a running state: pause, change,
    /// resume.
    pub fn change_sample_rate(&self, rate: u32) -> Result<()> {
        self.pause()?;
        self.set_sample_rate(rate)?;
        self.start()
    }

    /// Recompute pixels/pan after a zoom or width change, keeping the
    /// CTUN center visible, and re-create the analyzer.
    ///
    /// `ctun_offset` is `Some(offset)` when the owning VFO runs CTUN.
    pub fn update_zoom(&self, width: usize, zoom: usize, ctun_offset: Option<i64>) -> Result<()> {
        let zoom = zoom.clamp(1, 8);
        let sample_rate = self.stream.lock()?.sample_rate;
        let mut d = self.display.lock()?;
        d.width = width;
        d.zoom = zoom;
        d.pixels = width * zoom;
        let hz_per_pixel = f64::from(sample_rate) / d.pixels as f64;
        if zoom == 1 {
            d.pan = 0;
        } else {
            match ctun_offset {
                Some(offset) => {
                    // Keep the listening frequency inside the window.
                    let center = (f64::from(sample_rate) / 2.0 + offset as f64) / hz_per_pixel;
                    let pan = center as i64 - (width as i64) / 2;
                    d.pan = pan.clamp(0, (d.pixels - d.width) as i64) as usize;
                }
                None => d.pan = d.pixels / 2 - d.width / 2,
            }
        }
        let pixels = d.pixels;
        d.analyzer = Analyzer::new(pixels);
        Ok(())
    }
}

/// Crude S-meter: mean of the pixel row.
fn meter_from_pixels(px: &[f32]) -> f64 {
    if px.is_empty() {
        return -130.0;
    }
    f64::from(px.iter().sum::<f32>()) / px.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(output: &dyn RxOutput) -> RxEnv {
        RxEnv {
            transmitting: false,
            duplex: false,
            mute_rx_while_transmitting: false,
            active: true,
            capture_recording: false,
            output,
        }
    }

    #[test]
    fn pixel_invariants() {
        let rx = Receiver::new(0, 96_000, 1024, 800);
        rx.update_zoom(800, 2, None).unwrap();
        let d = rx.display.lock().unwrap();
        assert_eq!(d.pixels, d.width * d.zoom);
        drop(d);
        let hpp = rx.hz_per_pixel();
        assert!((hpp * 1600.0 - 96_000.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_one_resets_pan() {
        let rx = Receiver::new(0, 48_000, 1024, 800);
        rx.update_zoom(800, 4, None).unwrap();
        assert_eq!(rx.display.lock().unwrap().pan, 1200);
        rx.update_zoom(800, 1, None).unwrap();
        assert_eq!(rx.display.lock().unwrap().pan, 0);
    }

    #[test]
    fn ctun_pan_is_clamped() {
        let rx = Receiver::new(0, 48_000, 1024, 800);
        // Offset far beyond the right edge clamps to pixels-width.
        rx.update_zoom(800, 2, Some(1_000_000)).unwrap();
        let d = rx.display.lock().unwrap();
        assert_eq!(d.pan, d.pixels - d.width);
        drop(d);
        rx.update_zoom(800, 2, Some(-1_000_000)).unwrap();
        assert_eq!(rx.display.lock().unwrap().pan, 0);
    }

    #[test]
    fn sample_rate_change_recomputes_output() {
        let rx = Receiver::new(0, 48_000, 1024, 800);
        assert_eq!(rx.stream.lock().unwrap().output_samples, 1024);
        rx.set_sample_rate(384_000).unwrap();
        assert_eq!(rx.stream.lock().unwrap().output_samples, 128);
        assert!(rx.set_sample_rate(144_000).is_err());
        rx.start().unwrap();
        assert!(rx.set_sample_rate(96_000).is_err(), "running chain must pause first");
        rx.change_sample_rate(96_000).unwrap();
        assert_eq!(rx.stream.lock().unwrap().output_samples, 512);
    }

    #[test]
    fn txrx_tail_suppression() {
        let rx = Receiver::new(0, 48_000, 4, 16);
        rx.stream.lock().unwrap().txrxmax = 6;
        rx.start().unwrap();
        let out = NullOutput;
        let e = env(&out);
        // First 6 samples are zeroed; capture what the DSP sees via
        // the ring after two buffers.
        for _ in 0..3 {
            rx.add_iq_samples(1.0, 1.0, &e);
        }
        {
            let s = rx.stream.lock().unwrap();
            assert_eq!(&s.ring[..6], &[0.0; 6]);
        }
        for _ in 0..5 {
            rx.add_iq_samples(1.0, 1.0, &e);
        }
        let s = rx.stream.lock().unwrap();
        // Samples 4,5 of the second buffer (ring idx 0,1) were still
        // suppressed, the rest passed.
        assert_eq!(s.ring[0..4], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(s.ring[4..8], [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn diversity_rotation() {
        let rx = Receiver::new(0, 48_000, 2, 16);
        rx.start().unwrap();
        let out = NullOutput;
        let e = env(&out);
        // gain/phase as unit rotation by 90°: cos=0, sin=1.
        rx.add_div_iq_samples(1.0, 2.0, 0.5, 0.25, 0.0, 1.0, &e);
        let s = rx.stream.lock().unwrap();
        // i = i0 - q1 = 0.75, q = q0 + i1 = 2.5
        assert!((s.ring[0] - 0.75).abs() < 1e-12);
        assert!((s.ring[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn producer_skips_on_contention() {
        let rx = Receiver::new(0, 48_000, 4, 16);
        rx.start().unwrap();
        let out = NullOutput;
        let e = env(&out);
        let _guard = rx.stream.lock().unwrap();
        rx.add_iq_samples(1.0, 1.0, &e);
        assert_eq!(rx.skipped_buffers.load(Ordering::Relaxed), 1);
    }

    struct CountingOutput(std::sync::atomic::AtomicUsize);
    impl RxOutput for CountingOutput {
        fn radio_audio(&self, _l: i16, _r: i16) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn no_radio_audio_while_transmitting() {
        let rx = Receiver::new(0, 48_000, 4, 16);
        rx.start().unwrap();
        let out = CountingOutput(std::sync::atomic::AtomicUsize::new(0));
        let mut e = env(&out);
        e.transmitting = true;
        for _ in 0..4 {
            rx.add_iq_samples(0.5, 0.5, &e);
        }
        assert_eq!(out.0.load(Ordering::Relaxed), 0);
        e.transmitting = false;
        for _ in 0..4 {
            rx.add_iq_samples(0.5, 0.5, &e);
        }
        assert_eq!(out.0.load(Ordering::Relaxed), 4);
    }
}
/* vim: textwidth=80
 */
