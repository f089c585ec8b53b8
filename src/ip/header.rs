//! IPv4 头（固定 20 字节，不带选项）

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::checksum;
use crate::error::WireError;

/// 本栈发送的头部长度；接收时按 IHL 字段跳过选项。
pub const HEADER_LEN: usize = 20;

/// total length 字段能表示的最大数据报。
pub const MAX_TOTAL_LEN: usize = u16::MAX as usize;

mod field {
    use std::ops::Range;

    pub const VER_IHL: usize = 0;
    pub const DSCP_ECN: usize = 1;
    pub const LENGTH: Range<usize> = 2..4;
    pub const IDENT: Range<usize> = 4..6;
    pub const FLG_OFF: Range<usize> = 6..8;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Range<usize> = 10..12;
    pub const SRC_ADDR: Range<usize> = 12..16;
    pub const DST_ADDR: Range<usize> = 16..20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// 以 32 位字为单位。
    pub header_len: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub total_len: u16,
    pub ident: u16,
    /// 3 位标志。
    pub flags: u8,
    /// 13 位片偏移。
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// 主机发出的新头部：version 4、IHL 5、标识/标志/片偏移为 0。
    /// 调用方保证 `HEADER_LEN + payload_len` 不超过 `MAX_TOTAL_LEN`。
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ttl: u8, payload_len: usize) -> Self {
        Self {
            version: 4,
            header_len: (HEADER_LEN / 4) as u8,
            dscp: 0,
            ecn: 0,
            total_len: (HEADER_LEN + payload_len).min(MAX_TOTAL_LEN) as u16,
            ident: 0,
            flags: 0,
            frag_offset: 0,
            ttl,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    /// 解析头部，返回头部和载荷。载荷以 total length 为界：链路上多出的字节被忽略，
    /// 不足 total length 的数据报按截断报错。
    pub fn parse(bytes: &[u8]) -> Result<(Ipv4Header, &[u8]), WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                what: "IPv4 header",
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let version = bytes[field::VER_IHL] >> 4;
        if version != 4 {
            return Err(WireError::BadVersion(version));
        }
        let header_len = bytes[field::VER_IHL] & 0x0f;
        let hdr_bytes = usize::from(header_len) * 4;
        if hdr_bytes < HEADER_LEN || hdr_bytes > bytes.len() {
            return Err(WireError::BadHeaderLen(header_len));
        }
        let total_len = NetworkEndian::read_u16(&bytes[field::LENGTH]);
        let end = usize::from(total_len);
        if end < hdr_bytes {
            return Err(WireError::BadTotalLen(total_len));
        }
        if end > bytes.len() {
            return Err(WireError::Truncated {
                what: "IPv4 datagram",
                needed: end,
                got: bytes.len(),
            });
        }
        let flg_off = NetworkEndian::read_u16(&bytes[field::FLG_OFF]);

        let header = Ipv4Header {
            version,
            header_len,
            dscp: bytes[field::DSCP_ECN] >> 2,
            ecn: bytes[field::DSCP_ECN] & 0x03,
            total_len,
            ident: NetworkEndian::read_u16(&bytes[field::IDENT]),
            flags: (flg_off >> 13) as u8,
            frag_offset: flg_off & 0x1fff,
            ttl: bytes[field::TTL],
            protocol: bytes[field::PROTOCOL],
            checksum: NetworkEndian::read_u16(&bytes[field::CHECKSUM]),
            src: ipv4(&bytes[field::SRC_ADDR]),
            dst: ipv4(&bytes[field::DST_ADDR]),
        };
        Ok((header, &bytes[hdr_bytes..end]))
    }

    /// 序列化为 20 字节（选项不保留），校验和字段先置零再回填。
    pub fn emit(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[field::VER_IHL] = (self.version << 4) | (HEADER_LEN / 4) as u8;
        buf[field::DSCP_ECN] = (self.dscp << 2) | (self.ecn & 0x03);
        NetworkEndian::write_u16(&mut buf[field::LENGTH], self.total_len);
        NetworkEndian::write_u16(&mut buf[field::IDENT], self.ident);
        NetworkEndian::write_u16(
            &mut buf[field::FLG_OFF],
            (u16::from(self.flags) << 13) | (self.frag_offset & 0x1fff),
        );
        buf[field::TTL] = self.ttl;
        buf[field::PROTOCOL] = self.protocol;
        buf[field::SRC_ADDR].copy_from_slice(&self.src.octets());
        buf[field::DST_ADDR].copy_from_slice(&self.dst.octets());
        let sum = checksum::internet(&buf);
        NetworkEndian::write_u16(&mut buf[field::CHECKSUM], sum);
        buf
    }

    /// 路由器转发用的头部：TTL 减一，保留标识、标志、片偏移和 DSCP/ECN，
    /// 长度按实际转发的载荷重新计算。
    pub fn forwarded(&self, payload_len: usize) -> Self {
        Self {
            header_len: (HEADER_LEN / 4) as u8,
            total_len: (HEADER_LEN + payload_len).min(MAX_TOTAL_LEN) as u16,
            ttl: self.ttl.saturating_sub(1),
            checksum: 0,
            ..*self
        }
    }

    /// 头部 + 载荷拼成完整数据报。
    pub fn with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&self.emit());
        out.extend_from_slice(payload);
        out
    }
}

fn ipv4(b: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(b[0], b[1], b[2], b[3])
}
