/*! Memory (store/recall) slots.

A handful of user-savable slots holding a complete pair of VFO setups,
so recall restores both the active and the alternate VFO.
*/
use crate::filter::Mode;
use crate::vfo::Vfo;

/// Number of memory slots.
pub const NUM_MEMORYS: usize = 5;

/// One memory slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySlot {
    /// SAT mode in force when stored.
    pub sat_mode: u8,
    /// Band of the stored frequency.
    pub band: usize,
    /// CTUN flag.
    pub ctun: bool,
    /// Dial frequency, Hz.
    pub frequency: i64,
    /// CTUN frequency, Hz.
    pub ctun_frequency: i64,
    /// Mode.
    pub mode: Mode,
    /// Filter slot.
    pub filter: usize,
    /// FM deviation, Hz.
    pub deviation: u16,
    /// CTCSS enabled.
    pub ctcss_enabled: bool,
    /// CTCSS tone index.
    pub ctcss: u8,
    /// Alternate-VFO band.
    pub alt_band: usize,
    /// Alternate-VFO CTUN flag.
    pub alt_ctun: bool,
    /// Alternate-VFO frequency.
    pub alt_frequency: i64,
    /// Alternate-VFO CTUN frequency.
    pub alt_ctun_frequency: i64,
    /// Alternate-VFO mode.
    pub alt_mode: Mode,
    /// Alternate-VFO filter.
    pub alt_filter: usize,
    /// Alternate-VFO deviation.
    pub alt_deviation: u16,
}

impl MemorySlot {
    /// Capture both VFOs into this slot.
    pub fn store(&mut self, active: &Vfo, alt: &Vfo, sat_mode: u8, ctcss_enabled: bool, ctcss: u8) {
        self.sat_mode = sat_mode;
        self.band = active.band;
        self.ctun = active.ctun;
        self.frequency = active.frequency;
        self.ctun_frequency = active.ctun_frequency;
        self.mode = active.mode;
        self.filter = active.filter;
        self.deviation = active.deviation;
        self.ctcss_enabled = ctcss_enabled;
        self.ctcss = ctcss;
        self.alt_band = alt.band;
        self.alt_ctun = alt.ctun;
        self.alt_frequency = alt.frequency;
        self.alt_ctun_frequency = alt.ctun_frequency;
        self.alt_mode = alt.mode;
        self.alt_filter = alt.filter;
        self.alt_deviation = alt.deviation;
    }

    /// Write this slot back into both VFOs.
    pub fn recall(&self, active: &mut Vfo, alt: &mut Vfo) {
        active.band = self.band;
        active.ctun = self.ctun;
        active.frequency = self.frequency;
        active.ctun_frequency = self.ctun_frequency;
        active.offset = if self.ctun {
            self.ctun_frequency - self.frequency
        } else {
            0
        };
        active.mode = self.mode;
        active.filter = self.filter;
        active.deviation = self.deviation;
        alt.band = self.alt_band;
        alt.ctun = self.alt_ctun;
        alt.frequency = self.alt_frequency;
        alt.ctun_frequency = self.alt_ctun_frequency;
        alt.mode = self.alt_mode;
        alt.filter = self.alt_filter;
        alt.deviation = self.alt_deviation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_recall_roundtrip() {
        let mut a = Vfo {
            frequency: 7_030_000,
            mode: Mode::Cwl,
            filter: 4,
            ..Vfo::default()
        };
        a.set_ctun(true);
        a.move_hz(1500, false);
        let b = Vfo::default();

        let mut slot = MemorySlot::default();
        slot.store(&a, &b, 0, true, 12);

        let mut a2 = Vfo::default();
        let mut b2 = Vfo::default();
        slot.recall(&mut a2, &mut b2);
        assert_eq!(a2.frequency, a.frequency);
        assert_eq!(a2.ctun_frequency, a.ctun_frequency);
        assert_eq!(a2.offset, 1500);
        assert_eq!(a2.mode, Mode::Cwl);
        assert_eq!(b2.frequency, b.frequency);
    }
}
/* vim: textwidth=80
 */
