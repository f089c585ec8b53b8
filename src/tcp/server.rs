//! 监听端点
//!
//! 独占连接表：连接只在这里的接收处理或关闭完成路径上被插入和移除。

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use super::conn::{AcceptHandler, ConnId, Connection, Outcome, Socket};
use super::header::{verify_segment, TcpFlags, TcpHeader};
use super::TcpConfig;
use crate::ip::IpSend;
use crate::net::NodeId;
use crate::sim::Simulator;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TcpStats {
    pub accepted: u64,
    pub closed: u64,
    pub bad_segment: u64,
    pub bad_checksum: u64,
    pub unknown_conn: u64,
    pub wrong_port: u64,
    /// 已移除连接的重传次数之和
    pub retransmits: u64,
}

pub struct TcpServer {
    node: NodeId,
    port: u16,
    cfg: TcpConfig,
    conns: BTreeMap<ConnId, Connection>,
    on_accept: Option<AcceptHandler>,
    rng: StdRng,
    pub stats: TcpStats,
}

impl fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServer")
            .field("node", &self.node)
            .field("port", &self.port)
            .field("conns", &self.conns.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl TcpServer {
    pub fn new(node: NodeId, port: u16, cfg: TcpConfig) -> Self {
        let rng = match cfg.isn_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            node,
            port,
            cfg,
            conns: BTreeMap::new(),
            on_accept: None,
            rng,
            stats: TcpStats::default(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn config(&self) -> &TcpConfig {
        &self.cfg
    }

    /// 注册新连接回调；应在回调里为连接设置数据回调。
    pub fn on_accept(&mut self, handler: impl FnMut(&mut Socket<'_>) + Send + 'static) {
        self.on_accept = Some(Box::new(handler));
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.conns.values()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// 包括已移除连接在内的重传总次数。
    pub fn total_retransmits(&self) -> u64 {
        self.stats.retransmits + self.conns.values().map(Connection::retransmits).sum::<u64>()
    }

    /// 处理网络层交付的一个段。
    #[tracing::instrument(skip(self, segment, sim, ip), fields(port = self.port, len = segment.len()))]
    pub fn on_segment(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        segment: &[u8],
        sim: &mut Simulator,
        ip: &mut dyn IpSend,
    ) {
        let (header, payload) = match TcpHeader::parse(segment) {
            Ok(v) => v,
            Err(err) => {
                self.stats.bad_segment += 1;
                warn!(%src, %err, "无法解析 TCP 头，丢弃");
                return;
            }
        };
        if header.dst_port != self.port {
            self.stats.wrong_port += 1;
            trace!(dst_port = header.dst_port, "不是本端口的段，忽略");
            return;
        }
        if !ip.ignore_checksum() && !verify_segment(segment, src, dst) {
            self.stats.bad_checksum += 1;
            warn!(%src, src_port = header.src_port, "TCP 校验和错误，丢弃");
            return;
        }

        let id = ConnId {
            peer_addr: src,
            peer_port: header.src_port,
            local_addr: dst,
            local_port: header.dst_port,
        };

        if header.flags.contains(TcpFlags::SYN) {
            self.accept(id, header.seq, sim, ip);
            return;
        }

        let Some(conn) = self.conns.get_mut(&id) else {
            self.stats.unknown_conn += 1;
            debug!(conn = %id, "未知连接的段，丢弃");
            return;
        };
        if conn.on_segment(&header, payload, sim, ip) == Outcome::Closed {
            self.remove(id);
        }
    }

    fn accept(&mut self, id: ConnId, peer_seq: u32, sim: &mut Simulator, ip: &mut dyn IpSend) {
        if let Some(mut old) = self.conns.remove(&id) {
            // 重复的 SYN（例如 SYN+ACK 丢失后对端重发）：以新的打开请求为准
            old.teardown();
            self.stats.retransmits += old.retransmits();
            warn!(conn = %id, "收到已有连接的 SYN，重建连接");
        }
        let isn: u32 = self.rng.r#gen();
        let conn = Connection::accept(id, self.node, peer_seq, isn, self.cfg.clone(), ip);
        self.stats.accepted += 1;
        info!(conn = %id, isn, "🤝 接受新连接");
        let conn = self.conns.entry(id).or_insert(conn);

        if let Some(mut cb) = self.on_accept.take() {
            cb(&mut Socket::new(conn, sim, ip));
            if self.on_accept.is_none() {
                self.on_accept = Some(cb);
            }
        }
    }

    /// 重传定时器到期。连接已不存在时忽略。
    pub fn on_timeout(&mut self, id: ConnId, generation: u64, sim: &mut Simulator, ip: &mut dyn IpSend) {
        match self.conns.get_mut(&id) {
            Some(conn) => conn.on_timeout(generation, sim, ip),
            None => trace!(conn = %id, "连接已移除，忽略定时器"),
        }
    }

    /// 在回调之外访问某个连接；连接不存在时返回 `None`。
    pub fn with_socket<R>(
        &mut self,
        id: ConnId,
        sim: &mut Simulator,
        ip: &mut dyn IpSend,
        f: impl FnOnce(&mut Socket<'_>) -> R,
    ) -> Option<R> {
        let conn = self.conns.get_mut(&id)?;
        Some(f(&mut Socket::new(conn, sim, ip)))
    }

    pub fn send(&mut self, id: ConnId, data: &[u8], sim: &mut Simulator, ip: &mut dyn IpSend) -> bool {
        self.with_socket(id, sim, ip, |s| s.send(data)).is_some()
    }

    /// FIN 在该连接的待发队列排空后才发出。
    pub fn close(&mut self, id: ConnId, sim: &mut Simulator, ip: &mut dyn IpSend) -> bool {
        self.with_socket(id, sim, ip, |s| s.close()).is_some()
    }

    /// 拆除端点：取消所有定时器并清空连接表。
    pub fn shutdown(&mut self) {
        for conn in self.conns.values_mut() {
            conn.teardown();
            self.stats.retransmits += conn.retransmits();
        }
        info!(port = self.port, conns = self.conns.len(), "关闭监听端点");
        self.conns.clear();
    }

    fn remove(&mut self, id: ConnId) {
        if let Some(mut conn) = self.conns.remove(&id) {
            conn.teardown();
            self.stats.closed += 1;
            self.stats.retransmits += conn.retransmits();
        }
    }
}
