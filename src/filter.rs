/*! Modes and the mode/filter tables.

Each mode family has a fixed table of filter widths plus the two
variable filters (Var1, Var2) whose edges the user, or a remote
client, can move. Selecting a mode on a VFO re-derives the receiver
passband from these tables.
*/

/// Number of filter slots per mode, Var1/Var2 included.
pub const FILTERS: usize = 12;

/// Index of the first variable filter.
pub const FILTER_VAR1: usize = 10;

/// Index of the second variable filter.
pub const FILTER_VAR2: usize = 11;

/// Demodulation/modulation modes, wire-numbered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Lower sideband.
    #[default]
    Lsb = 0,
    /// Upper sideband.
    Usb,
    /// Double sideband.
    Dsb,
    /// CW, lower sideband.
    Cwl,
    /// CW, upper sideband.
    Cwu,
    /// Narrow FM.
    Fmn,
    /// Amplitude modulation.
    Am,
    /// Digital, upper sideband.
    Digu,
    /// Spectrum mode.
    Spec,
    /// Digital, lower sideband.
    Digl,
    /// Synchronous AM.
    Sam,
    /// DRM.
    Drm,
}

/// Total number of modes.
pub const MODES: usize = 12;

impl Mode {
    /// Decode a wire byte, clamping garbage to LSB.
    #[must_use]
    pub fn from_u8(v: u8) -> Mode {
        use Mode::*;
        match v {
            0 => Lsb,
            1 => Usb,
            2 => Dsb,
            3 => Cwl,
            4 => Cwu,
            5 => Fmn,
            6 => Am,
            7 => Digu,
            8 => Spec,
            9 => Digl,
            10 => Sam,
            11 => Drm,
            _ => Lsb,
        }
    }

    /// True for CWL/CWU.
    #[must_use]
    pub fn is_cw(self) -> bool {
        matches!(self, Mode::Cwl | Mode::Cwu)
    }

    /// True for the modes that put the carrier below the passband.
    #[must_use]
    pub fn is_lower(self) -> bool {
        matches!(self, Mode::Lsb | Mode::Cwl | Mode::Digl)
    }

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        use Mode::*;
        match self {
            Lsb => "LSB",
            Usb => "USB",
            Dsb => "DSB",
            Cwl => "CWL",
            Cwu => "CWU",
            Fmn => "FMN",
            Am => "AM",
            Digu => "DIGU",
            Spec => "SPEC",
            Digl => "DIGL",
            Sam => "SAM",
            Drm => "DRM",
        }
    }
}

/// One filter: passband edges relative to the carrier, Hz, plus a
/// label. For CW modes `low`/`high` hold the width only; the actual
/// edges center on the sidetone pitch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterEdges {
    /// Lower edge (or, for CW, unused).
    pub low: i32,
    /// Upper edge (or, for CW, the width).
    pub high: i32,
    /// Short label.
    pub title: &'static str,
}

const fn f(low: i32, high: i32, title: &'static str) -> FilterEdges {
    FilterEdges { low, high, title }
}

static FILTER_USB: [FilterEdges; FILTERS] = [
    f(150, 5150, "5.0k"),
    f(150, 4550, "4.4k"),
    f(150, 3950, "3.8k"),
    f(150, 3450, "3.3k"),
    f(150, 3050, "2.9k"),
    f(150, 2850, "2.7k"),
    f(150, 2550, "2.4k"),
    f(150, 2250, "2.1k"),
    f(150, 1950, "1.8k"),
    f(150, 1150, "1.0k"),
    f(150, 2850, "Var1"),
    f(150, 2850, "Var2"),
];

// CW tables carry widths; the edges land around the sidetone.
static FILTER_CW: [FilterEdges; FILTERS] = [
    f(0, 1000, "1.0k"),
    f(0, 800, "800"),
    f(0, 750, "750"),
    f(0, 600, "600"),
    f(0, 500, "500"),
    f(0, 400, "400"),
    f(0, 250, "250"),
    f(0, 100, "100"),
    f(0, 50, "50"),
    f(0, 25, "25"),
    f(0, 500, "Var1"),
    f(0, 500, "Var2"),
];

static FILTER_AM: [FilterEdges; FILTERS] = [
    f(-8000, 8000, "16k"),
    f(-6000, 6000, "12k"),
    f(-5000, 5000, "10k"),
    f(-4000, 4000, "8k"),
    f(-3300, 3300, "6.6k"),
    f(-2600, 2600, "5.2k"),
    f(-2000, 2000, "4.0k"),
    f(-1550, 1550, "3.1k"),
    f(-1450, 1450, "2.9k"),
    f(-1200, 1200, "2.4k"),
    f(-3300, 3300, "Var1"),
    f(-3300, 3300, "Var2"),
];

static FILTER_DIGU: [FilterEdges; FILTERS] = [
    f(150, 5150, "5.0k"),
    f(150, 3150, "3.0k"),
    f(150, 2650, "2.5k"),
    f(150, 2250, "2.1k"),
    f(150, 1950, "1.8k"),
    f(150, 1150, "1.0k"),
    f(150, 900, "750"),
    f(150, 650, "500"),
    f(150, 400, "250"),
    f(150, 250, "100"),
    f(150, 3150, "Var1"),
    f(150, 3150, "Var2"),
];

fn mirror(t: &FilterEdges) -> FilterEdges {
    FilterEdges {
        low: -t.high,
        high: -t.low,
        title: t.title,
    }
}

/// Variable filter edges, per mode, adjustable at run time.
#[derive(Clone, Debug)]
pub struct VarFilters {
    /// Var1 per mode.
    pub var1: [(i32, i32); MODES],
    /// Var2 per mode.
    pub var2: [(i32, i32); MODES],
}

impl Default for VarFilters {
    fn default() -> Self {
        let mut var1 = [(0, 0); MODES];
        let mut var2 = [(0, 0); MODES];
        for m in 0..MODES {
            let mode = Mode::from_u8(m as u8);
            let t1 = filter_edges(mode, FILTER_VAR1, 800, 2500, None);
            let t2 = filter_edges(mode, FILTER_VAR2, 800, 2500, None);
            var1[m] = (t1.0, t1.1);
            var2[m] = (t2.0, t2.1);
        }
        Self { var1, var2 }
    }
}

/// Label of a filter slot for a given mode.
#[must_use]
pub fn filter_title(mode: Mode, index: usize) -> &'static str {
    let index = index.min(FILTERS - 1);
    match mode {
        Mode::Cwl | Mode::Cwu => FILTER_CW[index].title,
        Mode::Lsb | Mode::Usb => FILTER_USB[index].title,
        Mode::Digl | Mode::Digu => FILTER_DIGU[index].title,
        _ => FILTER_AM[index].title,
    }
}

/// Resolve a (mode, filter index) pair into receiver passband edges.
///
/// `sidetone` is the CW pitch in Hz, `deviation` the FM deviation.
/// When `var` is given, Var1/Var2 read the live adjustable edges
/// instead of the table defaults.
#[must_use]
pub fn filter_edges(
    mode: Mode,
    index: usize,
    sidetone: i32,
    deviation: i32,
    var: Option<&VarFilters>,
) -> (i32, i32) {
    let index = index.min(FILTERS - 1);
    if let Some(v) = var
        && (index == FILTER_VAR1 || index == FILTER_VAR2)
        && !mode.is_cw()
    {
        let t = if index == FILTER_VAR1 {
            v.var1[mode as usize]
        } else {
            v.var2[mode as usize]
        };
        return t;
    }
    match mode {
        Mode::Cwl => {
            let w = FILTER_CW[index].high;
            (-sidetone - w / 2, -sidetone + w / 2)
        }
        Mode::Cwu => {
            let w = FILTER_CW[index].high;
            (sidetone - w / 2, sidetone + w / 2)
        }
        Mode::Usb | Mode::Digu => {
            let t = if mode == Mode::Usb {
                &FILTER_USB[index]
            } else {
                &FILTER_DIGU[index]
            };
            (t.low, t.high)
        }
        Mode::Lsb => {
            let t = mirror(&FILTER_USB[index]);
            (t.low, t.high)
        }
        Mode::Digl => {
            let t = mirror(&FILTER_DIGU[index]);
            (t.low, t.high)
        }
        Mode::Fmn => {
            // Carson-ish: deviation plus the audio bandwidth.
            if deviation <= 2500 {
                (-5500, 5500)
            } else {
                (-8000, 8000)
            }
        }
        _ => {
            let t = &FILTER_AM[index];
            (t.low, t.high)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsb_mirrors_usb() {
        let (ul, uh) = filter_edges(Mode::Usb, 5, 800, 2500, None);
        let (ll, lh) = filter_edges(Mode::Lsb, 5, 800, 2500, None);
        assert_eq!((ll, lh), (-uh, -ul));
    }

    #[test]
    fn cw_filters_center_on_sidetone() {
        let (lo, hi) = filter_edges(Mode::Cwu, 4, 700, 2500, None);
        assert_eq!((lo, hi), (450, 950));
        let (lo, hi) = filter_edges(Mode::Cwl, 4, 700, 2500, None);
        assert_eq!((lo, hi), (-950, -450));
    }

    #[test]
    fn fm_tracks_deviation() {
        assert_eq!(filter_edges(Mode::Fmn, 0, 0, 2500, None), (-5500, 5500));
        assert_eq!(filter_edges(Mode::Fmn, 0, 0, 5000, None), (-8000, 8000));
    }

    #[test]
    fn var_filters_read_live_edges() {
        let mut v = VarFilters::default();
        v.var1[Mode::Usb as usize] = (100, 1800);
        assert_eq!(
            filter_edges(Mode::Usb, FILTER_VAR1, 800, 2500, Some(&v)),
            (100, 1800)
        );
    }

    #[test]
    fn mode_wire_bytes() {
        for m in 0..MODES {
            assert_eq!(Mode::from_u8(m as u8) as u8, m as u8);
        }
        assert_eq!(Mode::from_u8(200), Mode::Lsb);
    }
}
/* vim: textwidth=80
 */
