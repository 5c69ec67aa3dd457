/*! SoapySDR adapter.

Plays the wire-engine role for SoapySDR-class devices: same sink and
source shape as the HPSDR engines, no PureSignal feedback channels.
Antennas and gain elements are enumerated into the state store so the
UI and the remote client can present them.
*/
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::CancellationToken;
use crate::discovery::{DeviceKind, Discovered, Protocol};
use crate::radio::{SpeakerPath, StateStore, WireSchedule};
use crate::transmitter::TxOutput;
use crate::{Error, Result};

/// Preferred RX rate when the device supports it.
pub const PREFERRED_RATE: f64 = 768_000.0;

/// Enumerate Soapy devices as discovery results.
pub fn discover_soapy() -> Vec<Discovered> {
    let mut out = Vec::new();
    let devs = match soapysdr::enumerate("") {
        Ok(d) => d,
        Err(e) => {
            warn!("soapy: enumerate failed: {e}");
            return out;
        }
    };
    for args in devs {
        let driver = args.get("driver").unwrap_or("unknown").to_string();
        let label = args.get("label").unwrap_or(&driver).to_string();
        info!("soapy: found {label} (driver {driver})");
        out.push(Discovered {
            protocol: Protocol::Soapy,
            device: DeviceKind(2000),
            name: label,
            software_version: 0,
            status: 2,
            mac: [0; 6],
            address: "0.0.0.0:0".parse().unwrap(),
            interface_name: driver,
            interface_addr: std::net::Ipv4Addr::UNSPECIFIED,
            interface_netmask: std::net::Ipv4Addr::UNSPECIFIED,
            use_tcp: false,
            use_routing: true,
            supported_receivers: 1,
            frequency_min: 10_000.0,
            frequency_max: 6_000_000_000.0,
        });
    }
    out
}

/// Pick the RX sample rate for a driver: 768 kHz when supported,
/// 48 kHz for Radioberry-class hardware, 1536 kHz for RTL-SDR.
#[must_use]
pub fn pick_sample_rate(driver: &str, supported: &[f64]) -> f64 {
    if driver.contains("radioberry") {
        return 48_000.0;
    }
    if driver.contains("rtlsdr") {
        return 1_536_000.0;
    }
    if supported.iter().any(|&r| (r - PREFERRED_RATE).abs() < 1.0) {
        return PREFERRED_RATE;
    }
    supported.first().copied().unwrap_or(PREFERRED_RATE)
}

/// The adapter.
pub struct SoapyAdapter {
    store: Arc<StateStore>,
    dev: soapysdr::Device,
    cancel: CancellationToken,
    running: AtomicBool,
    sample_rate: f64,
    tx_stream: std::sync::Mutex<Option<soapysdr::TxStream<num_complex::Complex<f32>>>>,
    tx_buf: std::sync::Mutex<Vec<num_complex::Complex<f32>>>,
}

impl SoapyAdapter {
    /// Open the device described by `args` and surface its antennas
    /// and gain elements into the store.
    pub fn new(store: Arc<StateStore>, args: &str) -> Result<Arc<Self>> {
        let dev = soapysdr::Device::new(args)
            .map_err(|e| Error::transport(format!("soapy open: {e}")))?;
        debug!(
            "soapy: driver {} hardware {}",
            dev.driver_key().unwrap_or_default(),
            dev.hardware_key().unwrap_or_default()
        );
        let driver = dev.driver_key().unwrap_or_default();
        let rates: Vec<f64> = dev
            .get_sample_rate_range(soapysdr::Direction::Rx, 0)
            .map(|rr| rr.iter().map(|r| r.maximum).collect())
            .unwrap_or_default();
        let sample_rate = pick_sample_rate(&driver, &rates);
        dev.set_sample_rate(soapysdr::Direction::Rx, 0, sample_rate)
            .map_err(|e| Error::transport(format!("soapy rate: {e}")))?;
        info!("soapy: RX rate {sample_rate}");

        {
            let mut caps = store.soapy.lock()?;
            caps.rx_antennas = dev
                .antennas(soapysdr::Direction::Rx, 0)
                .unwrap_or_default();
            caps.tx_antennas = dev
                .antennas(soapysdr::Direction::Tx, 0)
                .unwrap_or_default();
            caps.rx_gains = dev
                .list_gains(soapysdr::Direction::Rx, 0)
                .unwrap_or_default();
            caps.tx_gains = dev
                .list_gains(soapysdr::Direction::Tx, 0)
                .unwrap_or_default();
            debug!(
                "soapy: {} RX antennas, {} RX gain elements",
                caps.rx_antennas.len(),
                caps.rx_gains.len()
            );
        }

        Ok(Arc::new(Self {
            store,
            dev,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            sample_rate,
            tx_stream: std::sync::Mutex::new(None),
            tx_buf: std::sync::Mutex::new(Vec::new()),
        }))
    }

    /// Start the RX stream thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.dev.num_channels(soapysdr::Direction::Tx).unwrap_or(0) > 0
            && let Ok(mut ts) = self.dev.tx_stream::<num_complex::Complex<f32>>(&[0])
        {
            if let Err(e) = ts.activate(None) {
                warn!("soapy: TX activate failed: {e}");
            } else if let Ok(mut g) = self.tx_stream.lock() {
                *g = Some(ts);
            }
        }
        let me = Arc::clone(self);
        let token = self.cancel.clone();
        std::thread::Builder::new()
            .name("soapy reader".to_string())
            .spawn(move || {
                if let Err(e) = me.reader_loop(token) {
                    warn!("soapy: reader ended: {e}");
                }
            })?;
        Ok(())
    }

    /// Stop streaming.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn reader_loop(self: &Arc<Self>, token: CancellationToken) -> Result<()> {
        let mut stream = self
            .dev
            .rx_stream::<num_complex::Complex<f32>>(&[0])
            .map_err(|e| Error::transport(format!("soapy stream: {e}")))?;
        stream
            .activate(None)
            .map_err(|e| Error::transport(format!("soapy activate: {e}")))?;
        let mut buf = vec![num_complex::Complex::new(0.0f32, 0.0f32); 8192];
        let rx = &self.store.receivers[0];
        while !token.is_cancelled() {
            let n = match stream.read(&mut [&mut buf], 100_000) {
                Ok(n) => n,
                Err(e) if e.code == soapysdr::ErrorCode::Timeout => continue,
                Err(e) => return Err(Error::transport(format!("soapy read: {e}"))),
            };
            let env = self.store.rx_env(rx.id);
            for s in &buf[..n] {
                rx.add_iq_samples(f64::from(s.re), f64::from(s.im), &env);
            }
        }
        let _ = stream.deactivate(None);
        Ok(())
    }

    /// The rate the device actually runs at.
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl TxOutput for SoapyAdapter {
    fn iq_samples(&self, i: f64, q: f64, _sidetone: f64) {
        let Ok(mut buf) = self.tx_buf.lock() else {
            return;
        };
        buf.push(num_complex::Complex::new(i as f32, q as f32));
        if buf.len() < 1024 {
            return;
        }
        let chunk = std::mem::take(&mut *buf);
        drop(buf);
        if let Ok(mut g) = self.tx_stream.lock()
            && let Some(ts) = g.as_mut()
            && let Err(e) = ts.write_all(&[&chunk], None, false, 100_000)
        {
            warn!("soapy: TX write failed: {e}");
        }
    }
}

impl SpeakerPath for SoapyAdapter {
    fn audio_samples(&self, _left: i16, _right: i16) {
        // No radio-side audio codec on Soapy devices.
    }
}

impl WireSchedule for SoapyAdapter {}
/* vim: textwidth=80
 */
