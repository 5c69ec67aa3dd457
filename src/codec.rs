/*! Fixed-endian scalar conversions for everything that goes on a wire.

All multi-byte integers are big-endian. Doubles travel as 64-bit
unsigned integers computed as `(x + 9.0e8) * 1.0e10`; this keeps the
full HF frequency range plus plenty of negative headroom in an integer
that byte-swaps cleanly. Short integers wrap by bit-cast, so an `i32`
of -1 arrives as -1 and an `i32` of 70000 arrives as whatever the low
16 bits say, same as the C implementations on both ends of the link.

This layer has no state.
*/

/// Pack a double into its on-wire u64 form (not yet byte-swapped).
#[must_use]
pub fn pack_double(x: f64) -> u64 {
    ((x + 9.0e8) * 1.0e10) as u64
}

/// Invert [`pack_double`].
#[must_use]
pub fn unpack_double(u: u64) -> f64 {
    1.0e-10 * (u as f64) - 9.0e8
}

/// Pack an i32 into a wrapping signed 16-bit wire value.
#[must_use]
pub fn pack_short(x: i32) -> u16 {
    x as i16 as u16
}

/// Invert [`pack_short`], sign-extending.
#[must_use]
pub fn unpack_short(u: u16) -> i32 {
    u as i16 as i32
}

/// Byte writer for message bodies. Appends big-endian.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// New empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New writer with a capacity hint.
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    /// Take the accumulated bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one byte.
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a bool as one byte.
    pub fn flag(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Append a big-endian u16.
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append an i32 as a wrapping signed short.
    pub fn short(&mut self, v: i32) {
        self.u16(pack_short(v));
    }

    /// Append a big-endian u32.
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a big-endian u64.
    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append an i64 bit-cast to a big-endian u64.
    pub fn i64(&mut self, v: i64) {
        self.u64(v as u64);
    }

    /// Append a double in wire form.
    pub fn double(&mut self, v: f64) {
        self.u64(pack_double(v));
    }

    /// Append raw bytes.
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Append a string NUL-padded to a fixed width. Longer input is
    /// truncated one byte short of the width so the NUL survives.
    pub fn str(&mut self, v: &str, width: usize) {
        let b = v.as_bytes();
        let n = std::cmp::min(b.len(), width - 1);
        self.buf.extend_from_slice(&b[..n]);
        self.buf.extend(std::iter::repeat_n(0u8, width - n));
    }
}

/// Byte reader over a message body. Reads big-endian, panics never:
/// running off the end yields zeros, which matches how the peer treats
/// short optional tails.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Wrap a byte slice.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        static ZERO: [u8; 8] = [0u8; 8];
        if self.remaining() < n {
            self.pos = self.buf.len();
            return &ZERO[..n.min(8)];
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        s
    }

    /// Read one byte.
    pub fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    /// Read a bool byte.
    pub fn flag(&mut self) -> bool {
        self.u8() != 0
    }

    /// Read a big-endian u16.
    pub fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.take(2).try_into().unwrap())
    }

    /// Read a wrapping signed short as i32.
    pub fn short(&mut self) -> i32 {
        unpack_short(self.u16())
    }

    /// Read a big-endian u32.
    pub fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take(4).try_into().unwrap())
    }

    /// Read a big-endian u64.
    pub fn u64(&mut self) -> u64 {
        u64::from_be_bytes(self.take(8).try_into().unwrap())
    }

    /// Read a big-endian u64 bit-cast to i64.
    pub fn i64(&mut self) -> i64 {
        self.u64() as i64
    }

    /// Read a wire-form double.
    pub fn double(&mut self) -> f64 {
        unpack_double(self.u64())
    }

    /// Read raw bytes.
    pub fn bytes(&mut self, n: usize) -> Vec<u8> {
        if self.remaining() < n {
            let mut v = self.buf[self.pos..].to_vec();
            v.resize(n, 0);
            self.pos = self.buf.len();
            return v;
        }
        self.take(n).to_vec()
    }

    /// Read a fixed-width NUL-padded string.
    pub fn str(&mut self, width: usize) -> String {
        let b = self.bytes(width);
        let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        String::from_utf8_lossy(&b[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_roundtrip() {
        // The packed form lives near 1e19, so one ulp of f64 is worth
        // about 1e-7 after unpacking. That is still a millionth of a Hz.
        for x in [
            0.0, 1.0, -1.0, 0.5, -0.5, 3.14159265, 14_250_000.0, -9.0e8, 9.0e8, 1e-3,
        ] {
            let got = unpack_double(pack_double(x));
            assert!(
                (got - x).abs() < 1e-6,
                "roundtrip {x} gave {got} (err {})",
                (got - x).abs()
            );
        }
    }

    #[test]
    fn double_known_value() {
        // Zero maps to exactly 9.0e18.
        assert_eq!(pack_double(0.0), 9_000_000_000_000_000_000);
    }

    #[test]
    fn short_roundtrip() {
        for x in [0, 1, -1, 32767, -32768, 12345, -12345] {
            assert_eq!(unpack_short(pack_short(x)), x);
        }
        // Wrap, not clamp.
        assert_eq!(unpack_short(pack_short(65536 + 7)), 7);
    }

    #[test]
    fn writer_reader_roundtrip() {
        let mut w = WireWriter::new();
        w.u8(0x42);
        w.flag(true);
        w.u16(0xBEEF);
        w.short(-2);
        w.u32(0xDEAD_BEEF);
        w.i64(-123_456_789);
        w.double(7_030_000.5);
        w.str("Hermes", 16);
        let buf = w.into_bytes();
        assert_eq!(buf.len(), 1 + 1 + 2 + 2 + 4 + 8 + 8 + 16);

        let mut r = WireReader::new(&buf);
        assert_eq!(r.u8(), 0x42);
        assert!(r.flag());
        assert_eq!(r.u16(), 0xBEEF);
        assert_eq!(r.short(), -2);
        assert_eq!(r.u32(), 0xDEAD_BEEF);
        assert_eq!(r.i64(), -123_456_789);
        assert!((r.double() - 7_030_000.5).abs() < 1e-6);
        assert_eq!(r.str(16), "Hermes");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn reader_short_input_yields_zeros() {
        let mut r = WireReader::new(&[0xAB]);
        assert_eq!(r.u8(), 0xAB);
        assert_eq!(r.u64(), 0);
        assert_eq!(r.u16(), 0);
    }
}
/* vim: textwidth=80
 */
