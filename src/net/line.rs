//! 串口线
//!
//! 单向、先进先出：一块字节要等前一块发完（`busy_until`）才开始串行化，
//! 到达时间 = 发送完成时间 + 传播时延。

use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;

use super::id::{LineId, NodeId};
use crate::link::SerialLine;
use crate::sim::SimTime;

#[derive(Debug)]
pub struct Line {
    pub from: NodeId,
    pub to: NodeId,
    /// 接收端用来识别这条线的邻居地址（即发送端节点的地址）
    pub from_addr: Ipv4Addr,
    pub latency: SimTime,
    pub bits_per_sec: u64,
    pub busy_until: SimTime,
    /// 丢弃接下来的 N 块字节（用于制造丢包）
    pub drop_next: u32,
}

impl Line {
    pub fn new(from: NodeId, to: NodeId, from_addr: Ipv4Addr, latency: SimTime, bits_per_sec: u64) -> Self {
        Self {
            from,
            to,
            from_addr,
            latency,
            bits_per_sec,
            busy_until: SimTime::ZERO,
            drop_next: 0,
        }
    }

    /// 串行化 `bytes` 字节所需时间（向上取整到纳秒）。
    pub(crate) fn tx_time(&self, bytes: usize) -> SimTime {
        if self.bits_per_sec == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128) + (self.bits_per_sec as u128 - 1))
            / self.bits_per_sec as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}

/// 一次写入：哪条线、哪些字节。
#[derive(Debug)]
pub(crate) struct Transmit {
    pub line: LineId,
    pub bytes: Vec<u8>,
}

/// 节点一侧的线路端点；写入的字节经通道交给 `Network` 调度投递。
#[derive(Debug, Clone)]
pub struct SimPort {
    line: LineId,
    tx: Sender<Transmit>,
}

impl SimPort {
    pub(crate) fn new(line: LineId, tx: Sender<Transmit>) -> Self {
        Self { line, tx }
    }
}

impl SerialLine for SimPort {
    fn send(&mut self, bytes: &[u8]) {
        // 接收端只会随 Network 一起销毁，发送失败说明网络已拆除，直接丢弃
        let _ = self.tx.send(Transmit {
            line: self.line,
            bytes: bytes.to_vec(),
        });
    }
}
