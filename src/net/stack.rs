//! 一个节点上的完整协议栈
//!
//! 接收：字节 -> 链路层成帧 -> 网络层 -> （本机）传输层 -> 应用回调。
//! 发送方向由各层自己向下调用。

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use super::id::NodeId;
use crate::ip::{Delivery, IpLayer, PROTO_TCP};
use crate::sim::Simulator;
use crate::tcp::{ConnId, TcpConfig, TcpServer};

/// 收件箱默认容量；满了以后丢弃最旧的一条。
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Stack {
    pub ip: IpLayer,
    pub tcp: Option<TcpServer>,
    /// 交付给本机但没有人认领的数据报（ICMP 通知、没有监听端点时的 TCP 段）。
    /// 由使用者通过 `take_inbox` 取走，超出容量时最旧的被丢弃。
    inbox: VecDeque<Delivery>,
    inbox_capacity: usize,
    inbox_dropped: u64,
}

impl Stack {
    pub fn new(ip: IpLayer) -> Self {
        Self {
            ip,
            tcp: None,
            inbox: VecDeque::new(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            inbox_dropped: 0,
        }
    }

    /// 容量至少为 1；缩小时立即丢弃多出的旧条目。
    pub fn set_inbox_capacity(&mut self, capacity: usize) {
        self.inbox_capacity = capacity.max(1);
        while self.inbox.len() > self.inbox_capacity {
            self.inbox.pop_front();
            self.inbox_dropped += 1;
        }
    }

    /// 因收件箱已满而丢弃的条目数。
    pub fn inbox_dropped(&self) -> u64 {
        self.inbox_dropped
    }

    /// 在 `port` 上打开监听端点；已有的端点被拆除并替换。
    pub fn listen(&mut self, node: NodeId, port: u16, cfg: TcpConfig) -> &mut TcpServer {
        if let Some(old) = self.tcp.as_mut() {
            old.shutdown();
        }
        self.tcp.insert(TcpServer::new(node, port, cfg))
    }

    pub fn inbox(&self) -> &VecDeque<Delivery> {
        &self.inbox
    }

    pub fn take_inbox(&mut self) -> Vec<Delivery> {
        self.inbox.drain(..).collect()
    }

    /// 处理从邻居 `from` 的线路上收到的字节。
    pub fn on_bytes(&mut self, from: Ipv4Addr, bytes: &[u8], sim: &mut Simulator) {
        let mut frames = Vec::new();
        self.ip.link_mut().receive(from, bytes, |f| frames.push(f));
        for frame in frames {
            if let Some(delivery) = self.ip.on_datagram(&frame) {
                self.dispatch(delivery, sim);
            }
        }
    }

    fn dispatch(&mut self, delivery: Delivery, sim: &mut Simulator) {
        if delivery.protocol == PROTO_TCP {
            if let Some(tcp) = self.tcp.as_mut() {
                tcp.on_segment(delivery.src, delivery.dst, &delivery.payload, sim, &mut self.ip);
                return;
            }
        }
        if self.inbox.len() >= self.inbox_capacity {
            if let Some(old) = self.inbox.pop_front() {
                self.inbox_dropped += 1;
                debug!(src = %old.src, protocol = old.protocol, "收件箱已满，丢弃最旧的一条");
            }
        }
        debug!(src = %delivery.src, protocol = delivery.protocol, "放入收件箱");
        self.inbox.push_back(delivery);
    }

    pub fn on_retransmit_timeout(&mut self, conn: ConnId, generation: u64, sim: &mut Simulator) {
        match self.tcp.as_mut() {
            Some(tcp) => tcp.on_timeout(conn, generation, sim, &mut self.ip),
            None => trace!(%conn, "没有监听端点，忽略定时器"),
        }
    }
}
