#![warn(missing_docs)]
/*! Control, wire protocols and remote operation for HPSDR software
defined radios.

This crate talks to HPSDR-family transceivers (Metis, Hermes, Angelia,
Orion, HermesLite, Saturn/G2) over Protocol 1 or Protocol 2, and to
SoapySDR-class devices, streaming IQ both ways and keeping the whole
radio state (VFOs, bands, filters, PureSignal, CW keying) in one place.

On top of that sits a remote-operation facility: a server runs next to
the radio and a client drives it over TCP, with a framed, typed command
protocol, SHA-256 challenge/response authentication and live spectrum
and audio streaming.

# Architecture overview

```text
              radio (UDP/TCP)
                    ↕
     [ protocol1 / protocol2 / soapy ]
                    ↕
        [ receiver ]    [ transmitter + cw ]
              ↕               ↕
            [ dsp / spectrum  ]
                    ↕
           [ radio state store ]
                    ↕
          [ server ] ⇆ [ client ]
                (TCP, framed)
```

Discovery ([`discovery`]) enumerates radios on the LAN first; the state
store ([`radio`]) owns every entity and hands out indices, never
references; the engines run on their own named threads with a
[`CancellationToken`] each.
 */
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod audio;
pub mod band;
pub mod client;
pub mod codec;
pub mod cw;
pub mod discovery;
pub mod dsp;
pub mod filter;
pub mod frame;
pub mod messages;
pub mod props;
pub mod protocol1;
pub mod protocol2;
pub mod radio;
pub mod receiver;
pub mod server;
pub mod spectrum;
pub mod store;
pub mod transmitter;
pub mod vfo;

#[cfg(feature = "soapysdr")]
pub mod soapy;

/// Complex (I/Q) data used by the spectrum analyzer.
pub type Complex = num_complex::Complex<f32>;

/// Crate error type.
///
/// Engine threads never abort the process on a peer error; they surface
/// one of these and return their loop to idle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on a socket or file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Short read/write, sync loss or other transport trouble. Maps to
    /// "session end" at the layer where it happens.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer took too long.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Host name or address did not resolve.
    #[error("bad host: {0}")]
    BadHost(String),

    /// The SHA-256 challenge response did not match.
    #[error("wrong password")]
    WrongPassword,

    /// A request outside the legal range. The caller usually clamps and
    /// logs instead of propagating this.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Inconsistent internal state that cannot be recovered, e.g. a
    /// spectrum payload above the hard cap.
    #[error("FATAL: {0}")]
    Fatal(String),
}

impl Error {
    /// Shorthand for a transport error with a formatted message.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Transport(format!("poisoned lock: {e}"))
    }
}

/// Crate result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Cancellation token for engine threads.
///
/// Clone freely; `cancel()` is sticky.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as cancelled.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub mod tests {
    //! Test helper functions.
    use super::*;

    /// For testing, assert that two slices are almost equal.
    ///
    /// Floating point numbers are almost never exactly equal.
    pub fn assert_almost_equal(left: &[f64], right: &[f64]) {
        assert_eq!(
            left.len(),
            right.len(),
            "\nleft: {:?}\nright: {:?}",
            left,
            right
        );
        for i in 0..left.len() {
            let dist = (left[i] - right[i]).abs();
            if dist > 1e-9 {
                assert_eq!(
                    left[i], right[i],
                    "\nElement {i}:\nleft: {:?}\nright: {:?}",
                    left, right
                );
            }
        }
    }

    #[test]
    fn cancellation() {
        let t = CancellationToken::new();
        let t2 = t.clone();
        assert!(!t.is_cancelled());
        t2.cancel();
        assert!(t.is_cancelled());
    }
}
/* vim: textwidth=80
 */
