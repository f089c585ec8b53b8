//! 网络：节点、串口线与字节投递
//!
//! 每个节点持有一个 `Stack`。节点写入线路的字节先进入通道，
//! 每个处理函数返回后由 `flush` 统一换算到达时间并调度 `DeliverBytes`。

use std::net::Ipv4Addr;
use std::sync::mpsc::{self, Receiver};

use tracing::{debug, info, trace};

use super::deliver_bytes::DeliverBytes;
use super::id::{LineId, NodeId};
use super::line::{Line, SimPort, Transmit};
use super::stack::Stack;
use super::stats::Stats;
use crate::config::StackConfig;
use crate::ip::IpLayer;
use crate::link::{LinkLayer, SerialLine};
use crate::sim::{SimTime, Simulator};
use crate::tcp::ConnId;

#[derive(Debug)]
struct NodeSlot {
    name: String,
    addr: Ipv4Addr,
    stack: Stack,
}

#[derive(Debug)]
pub struct Network {
    nodes: Vec<NodeSlot>,
    lines: Vec<Line>,
    rx: Receiver<Transmit>,
    pub stats: Stats,
}

/// 先登记节点和线路，再一次性创建各节点的协议栈（邻居表在创建后固定）。
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    nodes: Vec<(String, Ipv4Addr, StackConfig)>,
    links: Vec<(NodeId, NodeId, SimTime, u64)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记节点；`addr` 是邻居用来称呼它的地址（即对端链路层的下一跳键）。
    pub fn add_node(&mut self, name: impl Into<String>, addr: Ipv4Addr, cfg: StackConfig) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push((name.into(), addr, cfg));
        id
    }

    /// 用一对单向线路连接两个节点。
    pub fn connect(&mut self, a: NodeId, b: NodeId, latency: SimTime, bits_per_sec: u64) {
        self.links.push((a, b, latency, bits_per_sec));
    }

    pub fn build(self) -> Network {
        let (tx, rx) = mpsc::channel();
        let addrs: Vec<Ipv4Addr> = self.nodes.iter().map(|(_, addr, _)| *addr).collect();

        let mut lines = Vec::with_capacity(self.links.len() * 2);
        for &(a, b, latency, bps) in &self.links {
            lines.push(Line::new(a, b, addrs[a.0], latency, bps));
            lines.push(Line::new(b, a, addrs[b.0], latency, bps));
        }

        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(idx, (name, addr, cfg))| {
                let node = NodeId(idx);
                let ports: Vec<(Ipv4Addr, Box<dyn SerialLine>)> = lines
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| l.from == node)
                    .map(|(j, l)| {
                        let peer_addr = addrs[l.to.0];
                        let port: Box<dyn SerialLine> = Box::new(SimPort::new(LineId(j), tx.clone()));
                        (peer_addr, port)
                    })
                    .collect();

                let mut ip = IpLayer::new(LinkLayer::new(ports), cfg.local_addr);
                ip.set_forwarding_table(cfg.routes.iter().copied());
                ip.set_ignore_checksum(cfg.ignore_checksum);
                let mut stack = Stack::new(ip);
                if let Some((port, tcp_cfg)) = cfg.listen {
                    stack.listen(node, port, tcp_cfg);
                }
                let role = if cfg.local_addr.is_some() { "host" } else { "router" };
                debug!(%name, %addr, role, "创建节点");
                NodeSlot { name, addr, stack }
            })
            .collect();

        Network {
            nodes,
            lines,
            rx,
            stats: Stats::default(),
        }
    }
}

impl Network {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn addr(&self, node: NodeId) -> Ipv4Addr {
        self.nodes[node.0].addr
    }

    pub fn stack(&self, node: NodeId) -> &Stack {
        &self.nodes[node.0].stack
    }

    pub fn stack_mut(&mut self, node: NodeId) -> &mut Stack {
        &mut self.nodes[node.0].stack
    }

    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.0]
    }

    pub fn line_between(&self, from: NodeId, to: NodeId) -> Option<LineId> {
        self.lines
            .iter()
            .position(|l| l.from == from && l.to == to)
            .map(LineId)
    }

    /// 丢弃 `from -> to` 线路上接下来的 `n` 块字节。线路不存在时返回 false。
    pub fn set_line_loss(&mut self, from: NodeId, to: NodeId, n: u32) -> bool {
        let Some(id) = self.line_between(from, to) else {
            return false;
        };
        self.lines[id.0].drop_next = n;
        true
    }

    /// 把一块字节交给节点处理。
    #[tracing::instrument(skip(self, bytes, sim), fields(to = ?to, from = %from, len = bytes.len()))]
    pub fn deliver(&mut self, to: NodeId, from: Ipv4Addr, bytes: &[u8], sim: &mut Simulator) {
        self.stats.chunks_delivered += 1;
        self.stats.bytes_delivered += bytes.len() as u64;
        self.nodes[to.0].stack.on_bytes(from, bytes, sim);
        self.flush(sim);
    }

    pub fn on_retransmit_timeout(&mut self, node: NodeId, conn: ConnId, generation: u64, sim: &mut Simulator) {
        self.nodes[node.0]
            .stack
            .on_retransmit_timeout(conn, generation, sim);
        self.flush(sim);
    }

    /// 在事件之外操作某个节点的协议栈（例如应用主动发送）；结束后投递产生的字节。
    pub fn with_stack<R>(
        &mut self,
        node: NodeId,
        sim: &mut Simulator,
        f: impl FnOnce(&mut Stack, &mut Simulator) -> R,
    ) -> R {
        let result = f(&mut self.nodes[node.0].stack, sim);
        self.flush(sim);
        result
    }

    /// 从节点直接发出一个传输层段（绕过本机的监听端点）。
    pub fn send_raw(&mut self, node: NodeId, segment: &[u8], dst: Ipv4Addr, protocol: u8, sim: &mut Simulator) {
        self.with_stack(node, sim, |stack, _| stack.ip.send(segment, dst, protocol));
    }

    pub fn tcp_send(&mut self, node: NodeId, conn: ConnId, data: &[u8], sim: &mut Simulator) -> bool {
        self.with_stack(node, sim, |stack, sim| match stack.tcp.as_mut() {
            Some(tcp) => tcp.send(conn, data, sim, &mut stack.ip),
            None => false,
        })
    }

    pub fn tcp_close(&mut self, node: NodeId, conn: ConnId, sim: &mut Simulator) -> bool {
        self.with_stack(node, sim, |stack, sim| match stack.tcp.as_mut() {
            Some(tcp) => tcp.close(conn, sim, &mut stack.ip),
            None => false,
        })
    }

    /// 拆除所有监听端点（取消全部定时器）。
    pub fn shutdown(&mut self) {
        for slot in &mut self.nodes {
            if let Some(tcp) = slot.stack.tcp.as_mut() {
                tcp.shutdown();
            }
        }
        info!("网络已拆除所有监听端点");
    }

    /// 把通道里积累的写入换算成到达事件。
    fn flush(&mut self, sim: &mut Simulator) {
        while let Ok(Transmit { line, bytes }) = self.rx.try_recv() {
            let l = &mut self.lines[line.0];
            self.stats.chunks_sent += 1;
            self.stats.bytes_sent += bytes.len() as u64;

            if l.drop_next > 0 {
                l.drop_next -= 1;
                self.stats.chunks_dropped += 1;
                info!(from = ?l.from, to = ?l.to, len = bytes.len(), "🗑️  注入丢包");
                continue;
            }

            let now = sim.now();
            let start = now.max(l.busy_until);
            let depart = start.saturating_add(l.tx_time(bytes.len()));
            l.busy_until = depart;
            let arrive = depart.saturating_add(l.latency);
            trace!(?line, ?start, ?depart, ?arrive, "调度字节到达");

            sim.schedule(
                arrive,
                DeliverBytes {
                    to: l.to,
                    from: l.from_addr,
                    bytes,
                },
            );
        }
    }
}
