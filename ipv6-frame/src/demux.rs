//! Stateful byte-stream parser that carves complete IPv6 datagrams out of a
//! single growing buffer, resynchronizing on the version nibble.

use bytes::{Buf, Bytes, BytesMut};

const IPV6_HEADER_LEN: usize = 40;
const IPV6_VERSION: u8 = 6;

/// Peer→interface byte-stream demultiplexer. One instance per tunnel
/// direction; not shared across directions.
pub struct Demultiplexer {
    buf: BytesMut,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Appends `bytes` and returns every complete datagram now extractable,
    /// in order. Trailing, not-yet-complete bytes are retained for the next
    /// call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(bytes);

        let mut datagrams = Vec::new();
        let mut offset = 0usize;

        while self.buf.len() - offset >= IPV6_HEADER_LEN {
            let header = &self.buf[offset..offset + IPV6_HEADER_LEN];

            if (header[0] >> 4) & 0x0F != IPV6_VERSION {
                offset += 1;
                continue;
            }

            let payload_len = u16::from_be_bytes([header[4], header[5]]) as usize;
            let required = IPV6_HEADER_LEN + payload_len;

            if self.buf.len() - offset < required {
                break;
            }

            datagrams.push(Bytes::copy_from_slice(&self.buf[offset..offset + required]));
            offset += required;
        }

        self.buf.advance(offset);
        datagrams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv6_datagram(next_header: u8, payload: &[u8]) -> Vec<u8> {
        let mut datagram = vec![0u8; IPV6_HEADER_LEN];
        datagram[0] = 0x60; // version 6, traffic class high nibble 0
        let len = payload.len() as u16;
        datagram[4..6].copy_from_slice(&len.to_be_bytes());
        datagram[6] = next_header;
        datagram[7] = 64; // hop limit
        datagram.extend_from_slice(payload);
        datagram
    }

    #[test]
    fn emits_single_datagram_fed_whole() {
        let datagram = ipv6_datagram(17, &[1, 2, 3, 4]);
        let mut demux = Demultiplexer::new();
        let out = demux.feed(&datagram);
        assert_eq!(out, vec![Bytes::from(datagram)]);
    }

    #[test]
    fn resynchronizes_past_garbage_bytes() {
        let datagram = ipv6_datagram(17, &[9, 9]);
        let mut garbage = vec![0xFFu8; 5];
        garbage.extend_from_slice(&datagram);

        let mut demux = Demultiplexer::new();
        let out = demux.feed(&garbage);
        assert_eq!(out, vec![Bytes::from(datagram)]);
    }

    #[test]
    fn chunked_delivery_produces_one_event_after_last_chunk() {
        let datagram = ipv6_datagram(17, &[0x04, 0xD2, 0x16, 0x2E, 0x00, 0x08, 0x00, 0x00]);
        let mut demux = Demultiplexer::new();

        let mut produced = Vec::new();
        for chunk in datagram.chunks(12) {
            produced.extend(demux.feed(chunk));
        }

        assert_eq!(produced, vec![Bytes::from(datagram)]);
    }

    #[test]
    fn holds_partial_datagram_until_complete() {
        let datagram = ipv6_datagram(6, &[1; 30]);
        let mut demux = Demultiplexer::new();

        assert!(demux.feed(&datagram[..20]).is_empty());
        let out = demux.feed(&datagram[20..]);
        assert_eq!(out, vec![Bytes::from(datagram)]);
    }

    #[test]
    fn two_back_to_back_datagrams_in_one_feed() {
        let a = ipv6_datagram(17, &[1, 2]);
        let b = ipv6_datagram(6, &[3; 20]);
        let mut combined = a.clone();
        combined.extend_from_slice(&b);

        let mut demux = Demultiplexer::new();
        let out = demux.feed(&combined);
        assert_eq!(out, vec![Bytes::from(a), Bytes::from(b)]);
    }
}
