/*! DSP capability surface.

The heavy signal processing (filtering, AGC, noise reduction, the
PureSignal math) lives in an external library behind these traits; one
DSP instance per receiver or transmitter, each owning its own channel
state. Samples move through borrowed slices, interleaved I,Q (or L,R),
never through globals.

[`BasicDsp`] is a self-contained stand-in: a boxcar decimator with
unity passband and none of the adaptive machinery. It keeps the
engines, the tests and headless operation honest without the external
library.
*/
use crate::filter::Mode;

/// AGC parameter block for one receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AgcParams {
    /// AGC mode: 0 off, 1 long, 2 slow, 3 medium, 4 fast.
    pub mode: u8,
    /// Gain in dB.
    pub gain: f64,
    /// Hang time, ms.
    pub hang: f64,
    /// Threshold.
    pub thresh: f64,
    /// Hang threshold.
    pub hang_thresh: f64,
}

/// Noise processor parameter block (NB, NR, ANF, SNB).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NoiseParams {
    pub nb: u8,
    pub nr: u8,
    pub anf: bool,
    pub snb: bool,
    pub nb2_mode: u8,
    pub nb_tau: f64,
    pub nb_hang: f64,
    pub nb_advtime: f64,
    pub nb_thresh: f64,
}

/// Per-receiver DSP channel.
pub trait RxDsp: Send {
    /// Run the noise-blanker pre-processor in place over interleaved
    /// IQ at the input rate. Called only when a blanker is selected.
    fn noise_blanker(&mut self, mode: u8, iq: &mut [f64]) {
        let _ = (mode, iq);
    }

    /// Exchange one input buffer for output audio. `iq` holds
    /// `2 × buffer_size` interleaved doubles, `audio` receives
    /// `2 × output_samples` interleaved stereo doubles.
    fn exchange(&mut self, iq: &[f64], audio: &mut [f64]);

    /// Input sample rate changed.
    fn set_sample_rate(&mut self, rate: u32);

    /// Passband edges in Hz, relative to carrier.
    fn set_filter(&mut self, low: f64, high: f64);

    /// Demodulation mode.
    fn set_mode(&mut self, mode: Mode);

    /// AGC parameters.
    fn set_agc(&mut self, agc: AgcParams);

    /// Noise processors.
    fn set_noise(&mut self, noise: NoiseParams);

    /// Audio equalizer.
    fn set_equalizer(&mut self, enable: bool, freq: &[f64], gain: &[f64]);

    /// FM deviation in Hz.
    fn set_deviation(&mut self, hz: f64);

    /// Squelch.
    fn set_squelch(&mut self, enable: bool, level: f64);
}

/// The transmitter's DSP channel.
pub trait TxDsp: Send {
    /// Exchange one mic buffer for IQ. `mic` holds `2 × buffer_size`
    /// interleaved doubles (right channel zero), `iq` receives
    /// `2 × output_samples`.
    fn exchange(&mut self, mic: &[f64], iq: &mut [f64]);

    /// Downward expander, running *outside* the DSP channel, on the
    /// mic buffer in place.
    fn dexp(&mut self, mic: &mut [f64]) {
        let _ = mic;
    }

    /// TX passband edges in Hz.
    fn set_filter(&mut self, low: f64, high: f64);

    /// Modulation mode.
    fn set_mode(&mut self, mode: Mode);

    /// FM deviation in Hz.
    fn set_deviation(&mut self, hz: f64);

    /// CTCSS sub-audible tone.
    fn set_ctcss(&mut self, enabled: bool, freq: f64);

    /// Speech compressor level; CESSB overshoot control rides along
    /// with the classical compressor only.
    fn set_compressor(&mut self, enabled: bool, level: f64);

    /// Mic equalizer.
    fn set_equalizer(&mut self, enable: bool, freq: &[f64], gain: &[f64]);

    /// Two-tone test generator.
    fn set_two_tone(&mut self, on: bool, f1: f64, f2: f64);

    /// Feed one PureSignal feedback pair (TX sample, RX-feedback
    /// sample), both interleaved IQ.
    fn ps_feedback(&mut self, tx_iq: &[f64], rx_iq: &[f64]) {
        let _ = (tx_iq, rx_iq);
    }

    /// PureSignal correction on/off.
    fn ps_run(&mut self, on: bool) {
        let _ = on;
    }

    /// Reset the PureSignal correction state.
    fn ps_reset(&mut self) {}

    /// Resume after a reset.
    fn ps_resume(&mut self) {}

    /// Current PureSignal status words (16 entries).
    fn ps_info(&self) -> [i32; 16] {
        [0; 16]
    }

    /// Current feedback peak.
    fn ps_getpk(&self) -> f64 {
        0.0
    }

    /// Maximum of the correction table.
    fn ps_getmx(&self) -> f64 {
        0.0
    }
}

/// Stand-in receiver DSP: boxcar-decimate IQ magnitude to audio.
#[derive(Debug)]
pub struct BasicRxDsp {
    sample_rate: u32,
    volume_scale: f64,
}

impl BasicRxDsp {
    /// New channel at the given input rate.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            volume_scale: 1.0,
        }
    }
}

impl RxDsp for BasicRxDsp {
    fn exchange(&mut self, iq: &[f64], audio: &mut [f64]) {
        let nin = iq.len() / 2;
        let nout = audio.len() / 2;
        if nout == 0 {
            return;
        }
        // Boxcar decimation of the I channel. No demodulation worth
        // the name, but amplitude-faithful, which the level tests and
        // the audio fan-out need.
        let ratio = std::cmp::max(1, nin / nout);
        for o in 0..nout {
            let start = o * ratio;
            let end = std::cmp::min(nin, start + ratio);
            let mut acc = 0.0;
            for i in start..end {
                acc += iq[2 * i];
            }
            let v = self.volume_scale * acc / (end - start).max(1) as f64;
            audio[2 * o] = v;
            audio[2 * o + 1] = v;
        }
    }

    fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
    }

    fn set_filter(&mut self, _low: f64, _high: f64) {}
    fn set_mode(&mut self, _mode: Mode) {}
    fn set_agc(&mut self, _agc: AgcParams) {}
    fn set_noise(&mut self, _noise: NoiseParams) {}
    fn set_equalizer(&mut self, _enable: bool, _freq: &[f64], _gain: &[f64]) {}
    fn set_deviation(&mut self, _hz: f64) {}

    fn set_squelch(&mut self, enable: bool, level: f64) {
        // Abuse volume_scale as a crude open/closed gate.
        self.volume_scale = if enable && level <= -160.0 { 0.0 } else { 1.0 };
    }
}

/// Stand-in transmitter DSP: interpolate mic onto the I rail.
#[derive(Debug)]
pub struct BasicTxDsp {
    two_tone: Option<(f64, f64)>,
    phase1: f64,
    phase2: f64,
    iq_rate: f64,
}

impl BasicTxDsp {
    /// New channel producing IQ at the given rate.
    #[must_use]
    pub fn new(iq_rate: u32) -> Self {
        Self {
            two_tone: None,
            phase1: 0.0,
            phase2: 0.0,
            iq_rate: f64::from(iq_rate),
        }
    }
}

impl TxDsp for BasicTxDsp {
    fn exchange(&mut self, mic: &[f64], iq: &mut [f64]) {
        let nin = mic.len() / 2;
        let nout = iq.len() / 2;
        if nin == 0 || nout == 0 {
            return;
        }
        if let Some((f1, f2)) = self.two_tone {
            let w1 = 2.0 * std::f64::consts::PI * f1 / self.iq_rate;
            let w2 = 2.0 * std::f64::consts::PI * f2 / self.iq_rate;
            for o in 0..nout {
                iq[2 * o] = 0.49999 * (self.phase1.cos() + self.phase2.cos());
                iq[2 * o + 1] = 0.49999 * (self.phase1.sin() + self.phase2.sin());
                self.phase1 = (self.phase1 + w1) % std::f64::consts::TAU;
                self.phase2 = (self.phase2 + w2) % std::f64::consts::TAU;
            }
            return;
        }
        // Zero-order hold interpolation, mic onto I.
        for o in 0..nout {
            let i = o * nin / nout;
            iq[2 * o] = mic[2 * i];
            iq[2 * o + 1] = 0.0;
        }
    }

    fn set_filter(&mut self, _low: f64, _high: f64) {}
    fn set_mode(&mut self, _mode: Mode) {}
    fn set_deviation(&mut self, _hz: f64) {}
    fn set_ctcss(&mut self, _enabled: bool, _freq: f64) {}
    fn set_compressor(&mut self, _enabled: bool, _level: f64) {}
    fn set_equalizer(&mut self, _enable: bool, _freq: &[f64], _gain: &[f64]) {}

    fn set_two_tone(&mut self, on: bool, f1: f64, f2: f64) {
        self.two_tone = if on { Some((f1, f2)) } else { None };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_decimates_four_to_one() {
        let mut dsp = BasicRxDsp::new(192000);
        let iq: Vec<f64> = (0..2048).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let mut audio = vec![0.0; 512];
        dsp.exchange(&iq, &mut audio);
        crate::tests::assert_almost_equal(&audio[..4], &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn tx_two_tone_levels() {
        let mut dsp = BasicTxDsp::new(192000);
        dsp.set_two_tone(true, 700.0, 1900.0);
        let mic = vec![0.0; 2048];
        let mut iq = vec![0.0; 8192];
        dsp.exchange(&mic, &mut iq);
        let peak = iq.iter().cloned().fold(0.0, f64::max);
        assert!(peak <= 1.0, "two-tone must not clip: {peak}");
        assert!(peak > 0.5, "two-tone should approach full scale: {peak}");
    }
}
/* vim: textwidth=80
 */
