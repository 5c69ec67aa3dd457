/*! CW keying: the event ring, envelope ramps and the sidetone
generator.

Key events arrive from CAT, MIDI/GPIO bindings or the remote client
and are consumed by the TX engine one mic-sample tick at a time. The
ring is single-producer/single-consumer and lock free; head and tail
updates are ordered by release/acquire pairs.

The RF envelope is a blended sine-series ramp (the integrated
Blackman-Harris family) whose width follows keyer speed; the sidetone
uses a 5 ms raised cosine.
*/
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use log::error;

/// Ring capacity. Power of two.
pub const CW_RING_SIZE: usize = 1024;

/// Keep at least this much slack: if fewer slots remain, key-down
/// events degrade to key-up so a flooded ring can never latch the
/// transmitter on.
pub const CW_RING_GUARD: usize = 16;

/// Forced key-up after 20 s of continuous key-down (at 48 kHz).
pub const KEY_DOWN_LIMIT: u32 = 960_000;

/// Sidetone ramp length in samples: 5 ms at 48 kHz.
pub const AUDIO_RAMP_LEN: usize = 240;

/// One slot: key state plus the wait (in 48 kHz samples) since the
/// previous event.
#[derive(Debug)]
struct Slot {
    down: AtomicU32,
    wait: AtomicU32,
}

/// Lock-free SPSC ring of key events.
#[derive(Debug)]
pub struct CwRing {
    slots: Vec<Slot>,
    inpt: AtomicUsize,
    outpt: AtomicUsize,
}

impl Default for CwRing {
    fn default() -> Self {
        Self::new()
    }
}

impl CwRing {
    /// New empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (0..CW_RING_SIZE)
                .map(|_| Slot {
                    down: AtomicU32::new(0),
                    wait: AtomicU32::new(0),
                })
                .collect(),
            inpt: AtomicUsize::new(0),
            outpt: AtomicUsize::new(0),
        }
    }

    /// Events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        let inpt = self.inpt.load(Ordering::Acquire);
        let outpt = self.outpt.load(Ordering::Acquire);
        (inpt + CW_RING_SIZE - outpt) % CW_RING_SIZE
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side: queue a key event. Near a full ring, key-down
    /// turns into key-up; on a literally full ring even key-up is
    /// dropped, with an error logged. Returns whether the event was
    /// accepted.
    pub fn queue(&self, mut down: bool, wait: u32) -> bool {
        let inpt = self.inpt.load(Ordering::Relaxed);
        let outpt = self.outpt.load(Ordering::Acquire);
        let num = (inpt + CW_RING_SIZE - outpt) % CW_RING_SIZE;

        if num + CW_RING_GUARD >= CW_RING_SIZE {
            down = false;
        }

        let newpt = (inpt + 1) % CW_RING_SIZE;
        if newpt == outpt {
            error!("CW ring buffer full, event dropped");
            return false;
        }
        self.slots[inpt].down.store(u32::from(down), Ordering::Relaxed);
        self.slots[inpt].wait.store(wait, Ordering::Relaxed);
        self.inpt.store(newpt, Ordering::Release);
        true
    }

    /// Consumer side: if an event is ready after `delay` samples of
    /// waiting, pop and return its key state.
    #[must_use]
    pub fn poll(&self, delay: u32) -> Option<bool> {
        let inpt = self.inpt.load(Ordering::Acquire);
        let outpt = self.outpt.load(Ordering::Relaxed);
        if inpt == outpt {
            return None;
        }
        if delay < self.slots[outpt].wait.load(Ordering::Relaxed) {
            return None;
        }
        let down = self.slots[outpt].down.load(Ordering::Relaxed) != 0;
        self.outpt.store((outpt + 1) % CW_RING_SIZE, Ordering::Release);
        Some(down)
    }

    /// Drop everything (leaving TX, session teardown).
    pub fn clear(&self) {
        self.outpt
            .store(self.inpt.load(Ordering::Acquire), Ordering::Release);
    }
}

/// RF ramp width in milliseconds for a keyer speed.
///
/// The widths were tuned against the spectral pollution of a dot
/// string: 7 ms up to 15 WPM, 8 ms to 32 WPM, 9 ms above.
#[must_use]
pub fn ramp_width_ms(wpm: u32) -> u32 {
    match wpm {
        0..=15 => 7,
        16..=32 => 8,
        _ => 9,
    }
}

/// Blended sine-series RF ramp with `width + 1` points growing
/// smoothly from 0 to 1.
///
/// The coefficients push the key-click energy below -60 dBc beyond
/// 338 Hz and below -120 dBc beyond 1.2 kHz carrier offset.
#[must_use]
pub fn rf_ramp(width: usize) -> Vec<f64> {
    let mut ramp = Vec::with_capacity(width + 1);
    for i in 0..=width {
        let y = i as f64 / width as f64;
        let y2 = y * std::f64::consts::TAU;
        let y4 = y2 + y2;
        let y6 = y4 + y2;
        let y8 = y4 + y4;
        let y10 = y4 + y6;
        ramp.push(
            y - 0.121_828_653_611_716_12 * y2.sin()
                - 0.018_557_469_249_199_286 * y4.sin()
                - 0.000_937_878_324_542_850_6 * y6.sin()
                + 0.000_856_757_151_940_322_8 * y8.sin()
                + 0.000_187_069_124_314_724_42 * y10.sin(),
        );
    }
    ramp
}

/// Raised-cosine sidetone ramp with `width + 1` points.
#[must_use]
pub fn audio_ramp(width: usize) -> Vec<f64> {
    (0..=width)
        .map(|i| {
            let y = i as f64 * std::f64::consts::PI / width as f64;
            0.5 * (1.0 - y.cos())
        })
        .collect()
}

/// Both CW ramps, regenerated together on speed or width changes.
#[derive(Debug)]
pub struct RampSet {
    /// RF pulse envelope, `rf_len + 1` points.
    pub rf: Vec<f64>,
    /// Sidetone envelope, `AUDIO_RAMP_LEN + 1` points.
    pub audio: Vec<f64>,
}

impl RampSet {
    /// Build ramps for the given width (ms) and the TX oversampling
    /// ratio. The RF ramp is tied to the 48 kHz mic clock times the
    /// ratio.
    #[must_use]
    pub fn new(ramp_ms: u32, ratio: usize) -> Self {
        let rf_len = 48 * ratio * ramp_ms as usize;
        Self {
            rf: rf_ramp(rf_len),
            audio: audio_ramp(AUDIO_RAMP_LEN),
        }
    }
}

/// Phase-continuous sine generator for the sidetone.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToneGen {
    phase: f64,
}

impl ToneGen {
    /// Next sample of a `freq` Hz tone at `rate` samples/s.
    pub fn next(&mut self, freq: f64, rate: f64) -> f64 {
        self.phase = (self.phase + std::f64::consts::TAU * freq / rate) % std::f64::consts::TAU;
        self.phase.sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_orders_events() {
        let r = CwRing::new();
        assert!(r.queue(true, 0));
        assert!(r.queue(false, 100));
        assert_eq!(r.poll(0), Some(true));
        // Second event needs 100 samples of delay.
        assert_eq!(r.poll(99), None);
        assert_eq!(r.poll(100), Some(false));
        assert!(r.is_empty());
    }

    #[test]
    fn nearly_full_ring_drops_key_down_keeps_key_up() {
        let r = CwRing::new();
        for _ in 0..CW_RING_SIZE - CW_RING_GUARD {
            assert!(r.queue(true, 1));
        }
        // Inside the guard zone: key-down is demoted to key-up but
        // still queued.
        assert!(r.queue(true, 1));
        let mut last = None;
        for _ in 0..r.len() {
            last = r.poll(u32::MAX);
        }
        assert_eq!(last, Some(false));
    }

    #[test]
    fn literally_full_ring_drops_everything() {
        let r = CwRing::new();
        for _ in 0..CW_RING_SIZE - 1 {
            assert!(r.queue(false, 1));
        }
        assert!(!r.queue(false, 1));
        assert!(!r.queue(true, 1));
    }

    #[test]
    fn ramp_widths_by_speed() {
        assert_eq!(ramp_width_ms(5), 7);
        assert_eq!(ramp_width_ms(15), 7);
        assert_eq!(ramp_width_ms(16), 8);
        assert_eq!(ramp_width_ms(32), 8);
        assert_eq!(ramp_width_ms(33), 9);
    }

    #[test]
    fn rf_ramp_is_monotone_zero_to_one() {
        let ramp = rf_ramp(7 * 48 * 4);
        assert_eq!(ramp.len(), 1345);
        assert!(ramp[0].abs() < 1e-12);
        assert!((ramp[ramp.len() - 1] - 1.0).abs() < 1e-9);
        for w in ramp.windows(2) {
            assert!(w[1] >= w[0] - 1e-9, "ramp must not overshoot backwards");
        }
    }

    #[test]
    fn audio_ramp_endpoints() {
        let ramp = audio_ramp(AUDIO_RAMP_LEN);
        assert_eq!(ramp.len(), AUDIO_RAMP_LEN + 1);
        assert!(ramp[0].abs() < 1e-12);
        assert!((ramp[AUDIO_RAMP_LEN] - 1.0).abs() < 1e-12);
        assert!((ramp[AUDIO_RAMP_LEN / 2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tone_gen_is_phase_continuous() {
        let mut g = ToneGen::default();
        let mut prev = g.next(700.0, 48000.0);
        for _ in 0..480 {
            let s = g.next(700.0, 48000.0);
            // 700 Hz at 48 kHz never jumps more than ~0.1 per sample.
            assert!((s - prev).abs() < 0.12);
            prev = s;
        }
    }
}
/* vim: textwidth=80
 */
