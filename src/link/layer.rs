//! 多邻居链路层

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, trace, warn};

use super::framer::{encode, FrameDecoder};

/// 字节流端点（例如一条串口线）。只负责把字节原样送出。
pub trait SerialLine: fmt::Debug + Send {
    fn send(&mut self, bytes: &[u8]);
}

#[derive(Debug)]
struct Neighbor {
    line: Box<dyn SerialLine>,
    decoder: FrameDecoder,
}

/// 以邻居地址为键的链路集合，在构造时从固定的邻居表建立，此后不再增减。
#[derive(Debug, Default)]
pub struct LinkLayer {
    neighbors: BTreeMap<Ipv4Addr, Neighbor>,
}

impl LinkLayer {
    pub fn new(lines: impl IntoIterator<Item = (Ipv4Addr, Box<dyn SerialLine>)>) -> Self {
        let neighbors = lines
            .into_iter()
            .map(|(addr, line)| {
                (
                    addr,
                    Neighbor {
                        line,
                        decoder: FrameDecoder::new(),
                    },
                )
            })
            .collect();
        Self { neighbors }
    }

    pub fn has_neighbor(&self, addr: Ipv4Addr) -> bool {
        self.neighbors.contains_key(&addr)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.neighbors.keys().copied()
    }

    /// 把一帧发往 `next_hop` 所在的线路。
    ///
    /// # Panics
    /// `next_hop` 不是已配置的邻居时 panic：这是配置错误，而不是“无路由”。
    pub fn send(&mut self, frame: &[u8], next_hop: Ipv4Addr) {
        let nb = self
            .neighbors
            .get_mut(&next_hop)
            .unwrap_or_else(|| panic!("no serial line to next hop {next_hop}"));
        debug!(%next_hop, len = frame.len(), "发送帧");
        nb.line.send(&encode(frame));
    }

    /// 处理从 `from` 线路收到的字节，每解出一帧调用一次 `on_frame`。
    pub fn receive(&mut self, from: Ipv4Addr, bytes: &[u8], on_frame: impl FnMut(Vec<u8>)) {
        let Some(nb) = self.neighbors.get_mut(&from) else {
            warn!(%from, "收到未知线路的字节，已丢弃");
            return;
        };
        trace!(%from, len = bytes.len(), "收到字节");
        nb.decoder.feed(bytes, on_frame);
    }

    /// 所有线路上累计丢弃的非法转义序列数。
    pub fn malformed(&self) -> u64 {
        self.neighbors.values().map(|n| n.decoder.malformed()).sum()
    }
}
