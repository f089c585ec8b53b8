//! TCP 头（固定 20 字节，不带选项）

use std::net::Ipv4Addr;

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use crate::error::WireError;
use crate::ip::{checksum, PROTO_TCP};

pub const HEADER_LEN: usize = 20;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u16 {
        const FIN = 0x001;
        const SYN = 0x002;
        const RST = 0x004;
        const PSH = 0x008;
        const ACK = 0x010;
        const URG = 0x020;
    }
}

mod field {
    use std::ops::Range;

    pub const SRC_PORT: Range<usize> = 0..2;
    pub const DST_PORT: Range<usize> = 2..4;
    pub const SEQ_NUM: Range<usize> = 4..8;
    pub const ACK_NUM: Range<usize> = 8..12;
    pub const FLAGS: Range<usize> = 12..14;
    pub const WIN_SIZE: Range<usize> = 14..16;
    pub const CHECKSUM: Range<usize> = 16..18;
    pub const URGENT: Range<usize> = 18..20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// 以 32 位字为单位。
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: TcpFlags) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset: (HEADER_LEN / 4) as u8,
            flags,
            window: u16::MAX,
            checksum: 0,
            urgent: 0,
        }
    }

    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// 解析头部，返回头部与载荷（按 data offset 跳过选项）。
    pub fn parse(segment: &[u8]) -> Result<(TcpHeader, &[u8]), WireError> {
        if segment.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                what: "TCP header",
                needed: HEADER_LEN,
                got: segment.len(),
            });
        }
        let off_flags = NetworkEndian::read_u16(&segment[field::FLAGS]);
        let data_offset = (off_flags >> 12) as u8;
        let hdr_bytes = usize::from(data_offset) * 4;
        if hdr_bytes < HEADER_LEN || hdr_bytes > segment.len() {
            return Err(WireError::BadHeaderLen(data_offset));
        }
        let header = TcpHeader {
            src_port: NetworkEndian::read_u16(&segment[field::SRC_PORT]),
            dst_port: NetworkEndian::read_u16(&segment[field::DST_PORT]),
            seq: NetworkEndian::read_u32(&segment[field::SEQ_NUM]),
            ack: NetworkEndian::read_u32(&segment[field::ACK_NUM]),
            data_offset,
            flags: TcpFlags::from_bits_truncate(off_flags & 0x0fff),
            window: NetworkEndian::read_u16(&segment[field::WIN_SIZE]),
            checksum: NetworkEndian::read_u16(&segment[field::CHECKSUM]),
            urgent: NetworkEndian::read_u16(&segment[field::URGENT]),
        };
        Ok((header, &segment[hdr_bytes..]))
    }

    /// 序列化头部并附上载荷，校验和覆盖伪首部、头部和载荷。
    pub fn emit_segment(&self, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
        let mut seg = vec![0u8; HEADER_LEN + payload.len()];
        NetworkEndian::write_u16(&mut seg[field::SRC_PORT], self.src_port);
        NetworkEndian::write_u16(&mut seg[field::DST_PORT], self.dst_port);
        NetworkEndian::write_u32(&mut seg[field::SEQ_NUM], self.seq);
        NetworkEndian::write_u32(&mut seg[field::ACK_NUM], self.ack);
        NetworkEndian::write_u16(
            &mut seg[field::FLAGS],
            ((HEADER_LEN as u16 / 4) << 12) | self.flags.bits(),
        );
        NetworkEndian::write_u16(&mut seg[field::WIN_SIZE], self.window);
        NetworkEndian::write_u16(&mut seg[field::URGENT], self.urgent);
        seg[HEADER_LEN..].copy_from_slice(payload);

        let sum = !checksum::combine(&[
            checksum::pseudo_header(src, dst, PROTO_TCP, seg.len() as u16),
            checksum::data(&seg),
        ]);
        NetworkEndian::write_u16(&mut seg[field::CHECKSUM], sum);
        seg
    }
}

/// 校验整段（含伪首部）的校验和。
pub fn verify_segment(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> bool {
    let sum = checksum::combine(&[
        checksum::pseudo_header(src, dst, PROTO_TCP, segment.len() as u16),
        checksum::data(segment),
    ]);
    sum == 0xffff
}
