//! Length bounded trace output for graph evaluation.
//!
//! A trace is written into a caller owned byte buffer: the address
//! header first, one record per comparison and move, and a final
//! `result=` line. Writes past the end of the buffer are dropped and the
//! last byte is reserved so the buffer can always be NUL terminated.

use std::fmt::{self, Write};

use crate::bits;
use crate::types::{IpAddress, IpType};

//------------ TraceBuffer ---------------------------------------------------

/// Builds an evaluation trace in a caller owned buffer.
pub(crate) struct TraceBuffer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> TraceBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        TraceBuffer { buf, len: 0 }
    }

    /// Writes the NUL terminator, truncating if the buffer is full.
    pub fn finish(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let at = self.len.min(self.buf.len() - 1);
        self.buf[at] = 0;
    }

    pub fn newline(&mut self) {
        let _ = self.write_str("\r\n");
    }

    /// A tab indented label record.
    pub fn label(&mut self, label: &str) {
        let _ = write!(self, "\t{}", label);
        self.newline();
    }

    /// A tab indented `method=bool` record.
    pub fn flag(&mut self, method: &str, value: bool) {
        let _ = write!(self, "\t{}={}", method, value);
        self.newline();
    }

    /// The `IP:` header with the address bytes in dotted form.
    pub fn ip_header(&mut self, ip: &IpAddress) {
        self.newline();
        let _ = self.write_str("IP:");
        let length = match ip.ip_type() {
            IpType::V4 => 4,
            IpType::V6 => 16,
            IpType::Invalid => 0,
        };
        for (i, byte) in ip.value()[..length].iter().enumerate() {
            if i > 0 {
                let _ = self.write_char('.');
            }
            let _ = write!(self, "{}", byte);
        }
    }

    /// One comparison record: the bit position, the outcome and the
    /// compared values with the cluster, span and cursor indices.
    #[allow(clippy::too_many_arguments)]
    pub fn compare(
        &mut self,
        bit_index: u16,
        label: &str,
        ip_value: &[u8],
        ip_bits: usize,
        span_low: &[u8],
        low_bits: usize,
        span_high: &[u8],
        high_bits: usize,
        cluster_index: u32,
        span_index: u32,
        index: u32,
    ) {
        let _ = write!(self, "[{}]={} IP:", bit_index, label);
        self.binary(ip_value, ip_bits);
        let _ = self.write_str(" LV:");
        self.binary(span_low, low_bits);
        let _ = self.write_str(" HV:");
        self.binary(span_high, high_bits);
        let _ = write!(
            self,
            " CLI:{} SI:{} CI:{}",
            cluster_index, span_index, index
        );
        self.newline();
    }

    /// The final `result=` line.
    pub fn result(&mut self, value: u32) {
        self.newline();
        let _ = write!(self, "result={}", value);
        self.newline();
    }

    fn binary(&mut self, bytes: &[u8], count: usize) {
        let _ = self.write_str(&bits::format(bytes, count));
    }
}

impl fmt::Write for TraceBuffer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // The last byte belongs to the terminator.
        let reserved = self.buf.len().saturating_sub(1);
        let room = reserved.saturating_sub(self.len);
        let take = s.len().min(room);
        self.buf[self.len..self.len + take]
            .copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}
