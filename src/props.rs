/*! Persisted state: a plain key/value properties file.

One line per scalar, `key=value`; array elements use bracketed
indices (`pa_trim[3]=30.0`). The file is read once at startup and
rewritten on save. Absent keys take their documented defaults, so a
file from an older version loads cleanly.
*/
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use log::warn;

use crate::Result;

/// An ordered key/value bag with typed accessors.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    map: BTreeMap<String, String>,
}

impl Properties {
    /// New empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the one-line-per-scalar format. Unparseable lines are
    /// skipped with a warning, not fatal: a damaged file should not
    /// keep the radio from starting.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut map = BTreeMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((k, v)) => {
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
                None => warn!("properties: skipping malformed line {}: {line}", lineno + 1),
            }
        }
        Self { map }
    }

    /// Load from a file; a missing file yields an empty bag.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the bag back out, sorted by key.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut f = std::fs::File::create(path)?;
        for (k, v) in &self.map {
            writeln!(f, "{k}={v}")?;
        }
        Ok(())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Set any displayable value.
    pub fn set<V: std::fmt::Display>(&mut self, key: &str, value: V) {
        self.map.insert(key.to_string(), value.to_string());
    }

    /// Set one array element.
    pub fn set_indexed<V: std::fmt::Display>(&mut self, key: &str, index: usize, value: V) {
        self.map.insert(format!("{key}[{index}]"), value.to_string());
    }

    /// Raw string access.
    #[must_use]
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.map
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer access with default.
    #[must_use]
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.map
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Float access with default.
    #[must_use]
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.map
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean access: stored as 0/1.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_i64(key, i64::from(default)) != 0
    }

    /// Array-element access with default.
    #[must_use]
    pub fn get_indexed_f64(&self, key: &str, index: usize, default: f64) -> f64 {
        self.get_f64(&format!("{key}[{index}]"), default)
    }
}

/// Save the interesting parts of a state store.
pub fn save_state(store: &crate::radio::StateStore, path: &Path) -> Result<()> {
    let mut p = Properties::new();
    {
        let vfos = store.vfos.lock()?;
        for (i, v) in vfos.iter().enumerate() {
            p.set(&format!("vfo.{i}.band"), v.band);
            p.set(&format!("vfo.{i}.frequency"), v.frequency);
            p.set(&format!("vfo.{i}.ctun"), u8::from(v.ctun));
            p.set(&format!("vfo.{i}.ctun_frequency"), v.ctun_frequency);
            p.set(&format!("vfo.{i}.mode"), v.mode as u8);
            p.set(&format!("vfo.{i}.filter"), v.filter);
            p.set(&format!("vfo.{i}.step"), v.step);
            p.set(&format!("vfo.{i}.rit"), v.rit);
            p.set(&format!("vfo.{i}.xit"), v.xit);
            p.set(&format!("vfo.{i}.deviation"), v.deviation);
        }
    }
    {
        let settings = store.settings.lock()?;
        p.set("cw_keyer_speed", settings.cw_keyer_speed);
        p.set(
            "cw_keyer_sidetone_frequency",
            settings.cw_keyer_sidetone_frequency,
        );
        p.set("cw_keyer_sidetone_volume", settings.cw_keyer_sidetone_volume);
        p.set("display_width", settings.display_width);
        p.set("region", settings.region);
        p.set("pa_enabled", u8::from(settings.pa_enabled));
        p.set("pa_power", settings.pa_power);
        for (i, t) in settings.pa_trim.iter().enumerate() {
            p.set_indexed("pa_trim", i, t);
        }
        p.set(
            "tx_out_of_band_allowed",
            u8::from(settings.tx_out_of_band_allowed),
        );
    }
    {
        let bands = store.bands.lock()?;
        for (i, b) in bands.iter().enumerate() {
            p.set(&format!("band.{i}.pa_calibration"), b.pa_calibration);
            p.set(&format!("band.{i}.oc_rx"), b.oc_rx);
            p.set(&format!("band.{i}.oc_tx"), b.oc_tx);
            p.set(&format!("band.{i}.alex_attenuation"), b.alex_attenuation);
            p.set(&format!("band.{i}.stack"), b.stack.current);
        }
    }
    for rx in &store.receivers {
        let s = rx.stream.lock()?;
        let i = rx.id;
        p.set(&format!("receiver.{i}.sample_rate"), s.sample_rate);
        p.set(&format!("receiver.{i}.volume"), s.volume);
        p.set(&format!("receiver.{i}.agc"), s.agc.mode);
        p.set(&format!("receiver.{i}.agc_gain"), s.agc.gain);
    }
    if let Some(tx) = &store.transmitter {
        let s = tx.stream.lock()?;
        p.set("transmitter.drive", s.drive);
        p.set("transmitter.tune_drive", s.tune_drive);
        p.set("transmitter.swr_protection", u8::from(s.swr_protection));
        p.set("transmitter.swr_alarm", s.swr_alarm);
    }
    p.save(path)
}

/// Restore what [`save_state`] wrote. Unknown radios start from
/// defaults; fields absent from the file keep their current value.
pub fn restore_state(store: &crate::radio::StateStore, path: &Path) -> Result<()> {
    let p = Properties::load(path)?;
    if p.is_empty() {
        return Ok(());
    }
    {
        let mut vfos = store.vfos.lock()?;
        for (i, v) in vfos.iter_mut().enumerate() {
            v.band = p.get_i64(&format!("vfo.{i}.band"), v.band as i64) as usize;
            v.frequency = p.get_i64(&format!("vfo.{i}.frequency"), v.frequency);
            v.ctun = p.get_bool(&format!("vfo.{i}.ctun"), v.ctun);
            v.ctun_frequency = p.get_i64(&format!("vfo.{i}.ctun_frequency"), v.ctun_frequency);
            v.mode =
                crate::filter::Mode::from_u8(p.get_i64(&format!("vfo.{i}.mode"), 0) as u8);
            v.filter = p.get_i64(&format!("vfo.{i}.filter"), v.filter as i64) as usize;
            v.step = p.get_i64(&format!("vfo.{i}.step"), v.step);
            v.rit = p.get_i64(&format!("vfo.{i}.rit"), v.rit);
            v.xit = p.get_i64(&format!("vfo.{i}.xit"), v.xit);
            v.deviation = p.get_i64(&format!("vfo.{i}.deviation"), 2500) as u16;
        }
    }
    {
        let mut settings = store.settings.lock()?;
        settings.cw_keyer_speed = p.get_i64("cw_keyer_speed", 20) as u32;
        settings.cw_keyer_sidetone_frequency =
            p.get_i64("cw_keyer_sidetone_frequency", 700) as u16;
        settings.cw_keyer_sidetone_volume = p.get_i64("cw_keyer_sidetone_volume", 64) as u8;
        settings.display_width = p.get_i64("display_width", 800) as u16;
        settings.region = p.get_i64("region", 0) as u8;
        settings.pa_enabled = p.get_bool("pa_enabled", true);
        settings.pa_power = p.get_i64("pa_power", 0) as u16;
        for i in 0..settings.pa_trim.len() {
            settings.pa_trim[i] = p.get_indexed_f64("pa_trim", i, settings.pa_trim[i]);
        }
        settings.tx_out_of_band_allowed = p.get_bool("tx_out_of_band_allowed", false);
    }
    {
        let mut bands = store.bands.lock()?;
        for (i, b) in bands.iter_mut().enumerate() {
            b.pa_calibration = p.get_f64(&format!("band.{i}.pa_calibration"), b.pa_calibration);
            b.oc_rx = p.get_i64(&format!("band.{i}.oc_rx"), b.oc_rx as i64) as u8;
            b.oc_tx = p.get_i64(&format!("band.{i}.oc_tx"), b.oc_tx as i64) as u8;
            b.alex_attenuation =
                p.get_i64(&format!("band.{i}.alex_attenuation"), b.alex_attenuation as i64) as u8;
            let cur = p.get_i64(&format!("band.{i}.stack"), b.stack.current as i64) as usize;
            b.stack.current = cur.min(b.stack.entries.len() - 1);
        }
    }
    for rx in &store.receivers {
        let i = rx.id;
        let rate = p.get_i64(&format!("receiver.{i}.sample_rate"), 0);
        if rate > 0 {
            if let Err(e) = rx.set_sample_rate(rate as u32) {
                warn!("receiver {i}: saved sample rate rejected: {e}");
            }
        }
        let mut s = rx.stream.lock()?;
        s.volume = p.get_f64(&format!("receiver.{i}.volume"), s.volume);
        s.agc.mode = p.get_i64(&format!("receiver.{i}.agc"), s.agc.mode as i64) as u8;
        s.agc.gain = p.get_f64(&format!("receiver.{i}.agc_gain"), s.agc.gain);
    }
    if let Some(tx) = &store.transmitter {
        let mut s = tx.stream.lock()?;
        s.drive = p.get_f64("transmitter.drive", s.drive);
        s.tune_drive = p.get_f64("transmitter.tune_drive", s.tune_drive);
        s.swr_protection = p.get_bool("transmitter.swr_protection", s.swr_protection);
        s.swr_alarm = p.get_f64("transmitter.swr_alarm", s.swr_alarm);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_garbage() {
        let p = Properties::parse("a=1\n\n# comment\nbroken line\nb = x y\n");
        assert_eq!(p.len(), 2);
        assert_eq!(p.get_i64("a", 0), 1);
        assert_eq!(p.get_str("b", ""), "x y");
    }

    #[test]
    fn typed_defaults() {
        let p = Properties::parse("f=2.5\nflag=1\n");
        assert_eq!(p.get_f64("f", 0.0), 2.5);
        assert!(p.get_bool("flag", false));
        assert!(!p.get_bool("missing", false));
        assert_eq!(p.get_i64("missing", 42), 42);
    }

    #[test]
    fn indexed_keys() {
        let mut p = Properties::new();
        p.set_indexed("pa_trim", 3, 30.5);
        assert_eq!(p.get_indexed_f64("pa_trim", 3, 0.0), 30.5);
        assert_eq!(p.get_indexed_f64("pa_trim", 4, -1.0), -1.0);
    }

    #[test]
    fn file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("rusthpsdr-props-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("radio.props");
        let mut p = Properties::new();
        p.set("vfo.0.frequency", 7_030_000);
        p.set("transmitter.drive", 37.5);
        p.save(&path).unwrap();
        let q = Properties::load(&path).unwrap();
        assert_eq!(q.get_i64("vfo.0.frequency", 0), 7_030_000);
        assert_eq!(q.get_f64("transmitter.drive", 0.0), 37.5);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
/* vim: textwidth=80
 */
