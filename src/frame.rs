/*! Framed transport for the client/server link.

Every message starts with the four sync bytes `FA FA AF AF` followed by
a ten byte header: message type (u16), two spare bytes and two spare
shorts that small commands use as their entire payload. Fixed-size
bodies follow the header directly; variable-size bodies (spectrum,
audio) carry their payload length in `s1`.

Getting out of sync is a very rare event over TCP, so the reader first
grabs a whole header in one shot and only falls back to a byte-wise
scan for the sync pattern when the fast path fails.
*/
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use log::{error, info, warn};

use crate::{Error, Result};

/// The four bytes that open every message.
pub const SYNC: [u8; 4] = [0xFA, 0xFA, 0xAF, 0xAF];

/// Total header size on the wire, sync included.
pub const HEADER_SIZE: usize = 14;

/// How often the server side emits an empty heartbeat message.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1500);

/// Read timeout on a session socket. The peer heartbeats far more
/// often than this; hitting the timeout means the peer is gone.
pub const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Message header. `b1`, `b2`, `s1`, `s2` carry per-opcode payload for
/// commands small enough to need nothing else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Raw message type. See [`crate::messages::MessageType`].
    pub kind: u16,
    /// First spare byte.
    pub b1: u8,
    /// Second spare byte.
    pub b2: u8,
    /// First spare short (payload length for variable messages).
    pub s1: u16,
    /// Second spare short.
    pub s2: u16,
}

impl Header {
    /// Header with just a type, spares zeroed.
    #[must_use]
    pub fn new(kind: u16) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Serialize, sync bytes included.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[0..4].copy_from_slice(&SYNC);
        b[4..6].copy_from_slice(&self.kind.to_be_bytes());
        b[6] = self.b1;
        b[7] = self.b2;
        b[8..10].copy_from_slice(&self.s1.to_be_bytes());
        b[10..12].copy_from_slice(&self.s2.to_be_bytes());
        // Bytes 12..14 are reserved and stay zero; they pad the header
        // to a fixed 14 bytes on the wire.
        b
    }

    /// Parse the ten post-sync bytes.
    #[must_use]
    pub fn from_body(b: &[u8]) -> Self {
        Self {
            kind: u16::from_be_bytes([b[0], b[1]]),
            b1: b[2],
            b2: b[3],
            s1: u16::from_be_bytes([b[4], b[5]]),
            s2: u16::from_be_bytes([b[6], b[7]]),
        }
    }
}

/// Read exactly `buf.len()` bytes. A clean EOF or an error marks the
/// peer dead; the caller tears the session down.
pub fn read_exact(stream: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    let mut done = 0;
    while done < buf.len() {
        match stream.read(&mut buf[done..]) {
            Ok(0) => {
                return Err(Error::transport(format!(
                    "read {done} bytes, but expected {}: peer closed",
                    buf.len()
                )));
            }
            Ok(n) => done += n,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

/// Read one header, resynchronizing on a bad sync pattern.
pub fn read_header(stream: &mut impl Read) -> Result<Header> {
    let mut buf = [0u8; HEADER_SIZE];
    read_exact(stream, &mut buf)?;

    if buf[0..4] != SYNC {
        error!(
            "header sync mismatch: {:02x} {:02x} {:02x} {:02x}",
            buf[0], buf[1], buf[2], buf[3]
        );
        // Scan one byte at a time for the full sync pattern.
        let mut syncs = 0;
        while syncs != SYNC.len() {
            let mut c = [0u8; 1];
            read_exact(stream, &mut c)?;
            if c[0] == SYNC[syncs] {
                syncs += 1;
            } else {
                syncs = 0;
            }
        }
        let mut rest = [0u8; HEADER_SIZE - 4];
        read_exact(stream, &mut rest)?;
        info!("re-sync successful");
        return Ok(Header::from_body(&rest));
    }

    Ok(Header::from_body(&buf[4..]))
}

/// Serializing writer for one session socket.
///
/// All bytes of one message go out inside a single critical section so
/// that audio from a DSP callback cannot interleave with a command
/// from the UI thread.
#[derive(Debug)]
pub struct FrameWriter<W> {
    stream: Mutex<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a stream.
    pub fn new(stream: W) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    /// Send one complete, already-serialized message.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        debug_assert!(msg.len() >= HEADER_SIZE && msg[0..4] == SYNC);
        let mut s = self.stream.lock()?;
        if let Err(e) = s.write_all(msg) {
            warn!("send of {} bytes failed: {e}", msg.len());
            return Err(Error::Io(e));
        }
        Ok(())
    }

    /// Send a header-only message.
    pub fn send_header(&self, h: &Header) -> Result<()> {
        self.send(&h.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_roundtrip() {
        let h = Header {
            kind: 77,
            b1: 1,
            b2: 2,
            s1: 800,
            s2: 0xFFFF,
        };
        let bytes = h.to_bytes();
        assert_eq!(bytes[0..4], SYNC);
        let mut c = Cursor::new(bytes.to_vec());
        let got = read_header(&mut c).unwrap();
        assert_eq!(got, h);
    }

    #[test]
    fn resync_skips_garbage() {
        let h = Header::new(5);
        let mut wire = vec![0x00, 0xFA, 0x12, 0xFA, 0xFA, 0x00, 0x33, 0x99, 0x11, 0x22, 0x12, 0x01, 0x02, 0x55];
        wire.extend_from_slice(&h.to_bytes());
        let mut c = Cursor::new(wire);
        let got = read_header(&mut c).unwrap();
        assert_eq!(got, h);
    }

    #[test]
    fn resync_handles_partial_sync_prefix() {
        // A false start of the pattern must not eat the real one.
        let h = Header::new(9);
        let mut wire = vec![0u8; HEADER_SIZE]; // garbage header
        wire.extend_from_slice(&[0xFA, 0xFA, 0x00]); // partial sync
        wire.extend_from_slice(&h.to_bytes());
        let mut c = Cursor::new(wire);
        let got = read_header(&mut c).unwrap();
        assert_eq!(got, h);
    }

    #[test]
    fn eof_is_transport_error() {
        let mut c = Cursor::new(vec![0xFA, 0xFA]);
        assert!(read_header(&mut c).is_err());
    }

    #[test]
    fn writer_serializes_whole_messages() {
        let w = FrameWriter::new(Vec::new());
        let h = Header::new(1);
        w.send_header(&h).unwrap();
        w.send_header(&Header::new(2)).unwrap();
        let buf = w.stream.into_inner().unwrap();
        assert_eq!(buf.len(), 2 * HEADER_SIZE);
        assert_eq!(buf[0..4], SYNC);
        assert_eq!(buf[HEADER_SIZE..HEADER_SIZE + 4], SYNC);
    }
}
/* vim: textwidth=80
 */
