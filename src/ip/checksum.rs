//! Internet checksum (RFC 1071).

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

const fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

/// One's-complement sum of `data` as big-endian 16-bit words, without the
/// final complement. An odd trailing byte is padded with zero.
pub fn data(mut data: &[u8]) -> u16 {
    let mut accum: u32 = 0;
    while data.len() >= 2 {
        accum += u32::from(NetworkEndian::read_u16(data));
        // fold early so long buffers cannot overflow the accumulator
        if accum > 0xffff_0000 {
            accum = u32::from(propagate_carries(accum));
        }
        data = &data[2..];
    }
    if let Some(&value) = data.first() {
        accum += u32::from(value) << 8;
    }
    propagate_carries(accum)
}

/// Combine several partial sums.
pub fn combine(checksums: &[u16]) -> u16 {
    let accum = checksums.iter().copied().map(u32::from).sum();
    propagate_carries(accum)
}

/// Partial sum of the transport pseudo-header.
pub fn pseudo_header(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, length: u16) -> u16 {
    let mut proto_len = [0u8; 4];
    proto_len[1] = protocol;
    NetworkEndian::write_u16(&mut proto_len[2..4], length);

    combine(&[data(&src.octets()), data(&dst.octets()), data(&proto_len)])
}

/// Complemented checksum, ready to be written into a header whose checksum
/// field was zero while summing.
pub fn internet(bytes: &[u8]) -> u16 {
    !data(bytes)
}

/// True when `bytes` (checksum field included) sums to all ones.
pub fn verify(bytes: &[u8]) -> bool {
    data(bytes) == 0xffff
}
