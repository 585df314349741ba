//! IPv4 frame inspection.
//!
//! The pipeline only ever reads the source and destination addresses, at
//! fixed offsets. Frames are assumed to be IPv4 without options; no
//! checksum verification happens here.

use std::net::Ipv4Addr;

use bytes::Bytes;
use thiserror::Error;

/// Minimum bytes required to read both addresses.
pub const IPV4_HEADER_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short for an IPv4 header: {0} bytes")]
    TooShort(usize),
}

/// Source (bytes 12..16) and destination (bytes 16..20) of a frame.
pub fn extract_ips(frame: &[u8]) -> Result<(Ipv4Addr, Ipv4Addr), FrameError> {
    if frame.len() < IPV4_HEADER_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }
    let src = Ipv4Addr::new(frame[12], frame[13], frame[14], frame[15]);
    let dst = Ipv4Addr::new(frame[16], frame[17], frame[18], frame[19]);
    Ok((src, dst))
}

/// Build a minimal IPv4 frame of `total_len` bytes carrying the given
/// addresses. Used by tests and the loopback demo; everything outside the
/// version/length/address fields is left zeroed.
pub fn build_frame(src: Ipv4Addr, dst: Ipv4Addr, total_len: usize) -> Bytes {
    let len = total_len.max(IPV4_HEADER_LEN);
    let mut buf = vec![0u8; len];
    buf[0] = 0x45; // version 4, IHL 5
    buf[2] = (len >> 8) as u8;
    buf[3] = (len & 0xff) as u8;
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_addresses() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(8, 8, 8, 8);
        let frame = build_frame(src, dst, 1024);
        assert_eq!(frame.len(), 1024);
        assert_eq!(extract_ips(&frame).unwrap(), (src, dst));
    }

    #[test]
    fn rejects_short_frames() {
        assert_eq!(extract_ips(&[0u8; 19]), Err(FrameError::TooShort(19)));
        assert_eq!(extract_ips(&[]), Err(FrameError::TooShort(0)));
        assert!(extract_ips(&[0u8; 20]).is_ok());
    }

    #[test]
    fn short_requests_are_padded_to_a_header() {
        let frame = build_frame(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, 4);
        assert_eq!(frame.len(), IPV4_HEADER_LEN);
    }
}
