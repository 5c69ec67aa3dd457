/*! Panadapter spectrum analyzer.

Accumulates IQ at the receiver's input rate, windows it, runs an FFT
sized to the pixel count and folds the shifted magnitude spectrum into
a pixel row with exponential averaging. The pixel row is what the
display and the remote spectrum stream read.
*/
use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

use crate::Complex;

/// Detector applied when several bins land on one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Detector {
    /// Highest bin wins.
    #[default]
    Peak,
    /// Bin average.
    Average,
    /// First bin (cheap sample detector).
    Sample,
}

/// Averaging across frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Averaging {
    /// No averaging.
    #[default]
    None,
    /// Exponential moving average, "recursive" in analyzer speak.
    Recursive,
}

/// One analyzer, owned by a receiver (or the transmitter) and
/// re-created whenever pixels or sample rate change.
pub struct Analyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    pixels: usize,
    window: Vec<f32>,
    acc: Vec<Complex>,
    filled: usize,
    out: Vec<f32>,
    have_frame: bool,
    /// Detector mode.
    pub detector: Detector,
    /// Averaging mode.
    pub averaging: Averaging,
    /// EMA factor for recursive averaging, 0..1.
    pub average_factor: f32,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("fft_size", &self.fft_size)
            .field("pixels", &self.pixels)
            .finish()
    }
}

fn fft_size_for(pixels: usize) -> usize {
    let mut n = 1;
    while n < pixels {
        n <<= 1;
    }
    n
}

/// Blackman-Harris window, periodic form.
fn blackman_harris(m: usize) -> Vec<f32> {
    const A0: f32 = 0.35875;
    const A1: f32 = 0.48829;
    const A2: f32 = 0.14128;
    const A3: f32 = 0.01168;
    const PI: f32 = std::f32::consts::PI;
    (0..m)
        .map(|n| {
            let x = n as f32 / m as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos() - A3 * (6.0 * PI * x).cos()
        })
        .collect()
}

impl Analyzer {
    /// Create an analyzer for the given pixel row width.
    #[must_use]
    pub fn new(pixels: usize) -> Self {
        let fft_size = fft_size_for(pixels);
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            pixels,
            window: blackman_harris(fft_size),
            acc: Vec::with_capacity(fft_size),
            filled: 0,
            out: vec![-200.0; pixels],
            have_frame: false,
            detector: Detector::Peak,
            averaging: Averaging::Recursive,
            average_factor: 0.33,
        }
    }

    /// Pixel row width.
    #[must_use]
    pub fn pixels(&self) -> usize {
        self.pixels
    }

    /// The current pixel row, dBFS-ish.
    #[must_use]
    pub fn pixel_samples(&self) -> &[f32] {
        &self.out
    }

    /// Feed interleaved IQ doubles. Returns true each time a new
    /// frame of pixels was produced.
    pub fn feed(&mut self, iq: &[f64]) -> bool {
        let mut produced = false;
        for pair in iq.chunks_exact(2) {
            self.acc.push(Complex::new(pair[0] as f32, pair[1] as f32));
            self.filled += 1;
            if self.filled == self.fft_size {
                self.run_fft();
                self.acc.clear();
                self.filled = 0;
                produced = true;
            }
        }
        produced
    }

    fn run_fft(&mut self) {
        let mut buf: Vec<Complex> = self
            .acc
            .iter()
            .zip(&self.window)
            .map(|(s, w)| s * w)
            .collect();
        self.fft.process(&mut buf);
        let n = self.fft_size;
        let norm = 1.0 / n as f32;
        let db = |c: &Complex| 10.0 * (c.norm_sqr() * norm * norm).max(1e-20).log10();

        let bins_per_pixel = n as f32 / self.pixels as f32;
        for p in 0..self.pixels {
            let b0 = (p as f32 * bins_per_pixel) as usize;
            let b1 = (((p + 1) as f32 * bins_per_pixel) as usize).clamp(b0 + 1, n);
            // fftshift: pixel 0 is the most negative frequency.
            let shifted = |b: usize| (b + n / 2) % n;
            let v = match self.detector {
                Detector::Peak => (b0..b1)
                    .map(|b| db(&buf[shifted(b)]))
                    .fold(f32::MIN, f32::max),
                Detector::Average => {
                    (b0..b1).map(|b| db(&buf[shifted(b)])).sum::<f32>() / (b1 - b0) as f32
                }
                Detector::Sample => db(&buf[shifted(b0)]),
            };
            self.out[p] = match self.averaging {
                Averaging::None => v,
                Averaging::Recursive if self.have_frame => {
                    self.average_factor * v + (1.0 - self.average_factor) * self.out[p]
                }
                Averaging::Recursive => v,
            };
        }
        self.have_frame = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_frames_at_fft_size() {
        let mut a = Analyzer::new(800);
        assert_eq!(a.pixels(), 800);
        // 800 pixels round up to a 1024-point FFT.
        let iq = vec![0.0; 2 * 1000];
        assert!(!a.feed(&iq[..2 * 1000]));
        assert!(a.feed(&iq[..2 * 24]));
    }

    #[test]
    fn tone_lands_on_the_right_pixel() {
        let pixels = 1024;
        let mut a = Analyzer::new(pixels);
        a.averaging = Averaging::None;
        // Tone at +1/8 of the sample rate: bin 128 of 1024, which
        // after the shift is pixel 512 + 128 = 640.
        let n = 1024;
        let mut iq = Vec::with_capacity(2 * n);
        for i in 0..n {
            let ph = 2.0 * std::f64::consts::PI * (i as f64) * 128.0 / (n as f64);
            iq.push(ph.cos());
            iq.push(ph.sin());
        }
        assert!(a.feed(&iq));
        let px = a.pixel_samples();
        let peak = px
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 640);
    }
}
/* vim: textwidth=80
 */
