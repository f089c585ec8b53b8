//! ICMP 超时通知（type 11 / code 0）

use byteorder::{ByteOrder, NetworkEndian};

use super::checksum;

pub const TYPE_TIME_EXCEEDED: u8 = 11;
pub const CODE_TTL_EXCEEDED: u8 = 0;

/// 通知中附带的原数据报前缀长度：IP 头 + 8 字节传输层头。
pub const QUOTED_LEN: usize = 28;

/// 构造 ICMP 超时报文：8 字节头部 + 原数据报前 28 字节。
pub fn time_exceeded(original: &[u8]) -> Vec<u8> {
    let quoted = &original[..original.len().min(QUOTED_LEN)];
    let mut msg = Vec::with_capacity(8 + quoted.len());
    msg.push(TYPE_TIME_EXCEEDED);
    msg.push(CODE_TTL_EXCEEDED);
    msg.extend_from_slice(&[0; 6]);
    msg.extend_from_slice(quoted);
    let sum = checksum::internet(&msg);
    NetworkEndian::write_u16(&mut msg[2..4], sum);
    msg
}

/// 解析 ICMP 报文头，返回 (type, code)；长度不足时返回 `None`。
pub fn kind(msg: &[u8]) -> Option<(u8, u8)> {
    if msg.len() < 8 {
        return None;
    }
    Some((msg[0], msg[1]))
}
