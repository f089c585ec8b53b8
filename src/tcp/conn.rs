//! 单个连接
//!
//! 发送侧：待发队列 -> 在途缓冲（已发未确认）-> 按确认丢弃前缀；
//! 接收侧只接受恰好等于期望序号的数据段，乱序段直接忽略。

use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, info, trace, warn};

use super::header::{TcpFlags, TcpHeader};
use super::rtt::RttEstimator;
use super::timer::RetransmitTimer;
use super::{seq_gt, TcpConfig};
use crate::ip::{IpSend, PROTO_TCP};
use crate::net::NodeId;
use crate::sim::{SimTime, Simulator};

/// 连接四元组，从本机视角记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId {
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.peer_addr, self.peer_port, self.local_addr, self.local_port
        )
    }
}

/// 数据回调；空载荷表示对端已关闭发送方向。
pub type DataHandler = Box<dyn FnMut(&mut Socket<'_>, &[u8]) + Send>;
/// 新连接回调。
pub type AcceptHandler = Box<dyn FnMut(&mut Socket<'_>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Open,
    Closed,
}

pub struct Connection {
    id: ConnId,
    node: NodeId,
    cfg: TcpConfig,
    isn: u32,

    // sender
    snd_nxt: u32,
    snd_una: u32,
    in_flight: VecDeque<u8>,
    pending: VecDeque<u8>,
    cwnd: u32,
    timer: RetransmitTimer,
    rtt: RttEstimator,
    sample_start: Option<SimTime>,
    close_requested: bool,
    fin_seq: Option<u32>,
    retransmits: u64,

    // receiver
    rcv_nxt: u32,
    handler: Option<DataHandler>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("snd_una", &self.snd_una)
            .field("snd_nxt", &self.snd_nxt)
            .field("rcv_nxt", &self.rcv_nxt)
            .field("in_flight", &self.in_flight.len())
            .field("pending", &self.pending.len())
            .field("cwnd", &self.cwnd)
            .field("fin_seq", &self.fin_seq)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// 被动打开：记录对端序号并立即回复 SYN+ACK。
    pub(crate) fn accept(
        id: ConnId,
        node: NodeId,
        peer_seq: u32,
        isn: u32,
        cfg: TcpConfig,
        ip: &mut dyn IpSend,
    ) -> Self {
        let rtt = RttEstimator::new(cfg.init_rto);
        let cwnd = cfg.init_cwnd.max(1);
        let mut conn = Self {
            id,
            node,
            cfg,
            isn,
            snd_nxt: isn,
            snd_una: isn,
            in_flight: VecDeque::new(),
            pending: VecDeque::new(),
            cwnd,
            timer: RetransmitTimer::default(),
            rtt,
            sample_start: None,
            close_requested: false,
            fin_seq: None,
            retransmits: 0,
            rcv_nxt: peer_seq.wrapping_add(1),
            handler: None,
        };
        conn.emit(isn, TcpFlags::SYN | TcpFlags::ACK, &[], ip);
        // SYN 占用一个序号
        conn.snd_nxt = isn.wrapping_add(1);
        conn.snd_una = conn.snd_nxt;
        conn
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn isn(&self) -> u32 {
        self.isn
    }

    pub fn snd_nxt(&self) -> u32 {
        self.snd_nxt
    }

    pub fn snd_una(&self) -> u32 {
        self.snd_una
    }

    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    /// 拥塞窗口（段数）。
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    /// 应用已请求关闭（FIN 可能还在等待待发队列排空）。
    pub fn is_closing(&self) -> bool {
        self.close_requested
    }

    /// 已发出的 FIN 的序号。
    pub fn fin_seq(&self) -> Option<u32> {
        self.fin_seq
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn set_handler(&mut self, handler: DataHandler) {
        self.handler = Some(handler);
    }

    /// 追加应用数据并尝试发送。
    pub fn send(&mut self, data: &[u8], sim: &mut Simulator, ip: &mut dyn IpSend) {
        if self.close_requested {
            warn!(conn = %self.id, len = data.len(), "连接已请求关闭，丢弃新数据");
            return;
        }
        self.pending.extend(data);
        self.transmit(sim, ip);
    }

    /// 主动关闭。连接在对端确认 FIN 后才从表中移除。
    ///
    /// 待发队列非空时本调用不会立即发出 FIN：FIN 排在最后一个数据段之后，
    /// 队列排空时才发送。
    pub fn close(&mut self, sim: &mut Simulator, ip: &mut dyn IpSend) {
        if self.close_requested {
            return;
        }
        info!(conn = %self.id, pending = self.pending.len(), "请求关闭连接");
        self.close_requested = true;
        self.maybe_send_fin(sim, ip);
    }

    pub(crate) fn on_segment(
        &mut self,
        header: &TcpHeader,
        payload: &[u8],
        sim: &mut Simulator,
        ip: &mut dyn IpSend,
    ) -> Outcome {
        if header.seq == self.rcv_nxt && !payload.is_empty() {
            self.rcv_nxt = self.rcv_nxt.wrapping_add(payload.len() as u32);
            trace!(conn = %self.id, len = payload.len(), rcv_nxt = self.rcv_nxt, "顺序数据");
            self.deliver(payload, sim, ip);
            self.emit(self.snd_nxt, TcpFlags::ACK, &[], ip);
        } else if header.flags.contains(TcpFlags::FIN) {
            self.rcv_nxt = header.seq.wrapping_add(1);
            debug!(conn = %self.id, "对端关闭发送方向");
            self.deliver(&[], sim, ip);
            self.emit(self.snd_nxt, TcpFlags::ACK, &[], ip);
        } else if header.flags.contains(TcpFlags::ACK) {
            if self.fin_seq.is_some_and(|fin| header.ack == fin.wrapping_add(1)) {
                self.timer.cancel();
                info!(conn = %self.id, "FIN 已被确认，连接关闭");
                return Outcome::Closed;
            }
            if seq_gt(header.ack, self.snd_una) {
                if seq_gt(header.ack, self.snd_nxt) {
                    warn!(conn = %self.id, ack = header.ack, snd_nxt = self.snd_nxt, "确认了尚未发送的数据，忽略");
                } else {
                    self.on_ack(header.ack, sim, ip);
                }
            }
        } else {
            trace!(conn = %self.id, seq = header.seq, expected = self.rcv_nxt, "忽略乱序段");
        }
        Outcome::Open
    }

    fn on_ack(&mut self, ack: u32, sim: &mut Simulator, ip: &mut dyn IpSend) {
        self.timer.cancel();
        if let Some(start) = self.sample_start.take() {
            self.rtt.sample(sim.now().saturating_sub(start));
            self.cwnd = self.cwnd.saturating_add(1);
        }

        let acked = ack.wrapping_sub(self.snd_una) as usize;
        let n = acked.min(self.in_flight.len());
        self.in_flight.drain(..n);
        self.snd_una = ack;
        debug!(
            conn = %self.id,
            ack,
            in_flight = self.in_flight.len(),
            cwnd = self.cwnd,
            rto = ?self.rtt.timeout(),
            "处理确认"
        );

        if !self.in_flight.is_empty() || self.fin_seq.is_some() {
            self.arm_timer(sim);
        }
        if !self.pending.is_empty() {
            self.transmit(sim, ip);
        }
    }

    /// 重传定时器到期：重发最早一个 MSS 的在途数据（或 FIN），窗口减半。
    pub(crate) fn on_timeout(&mut self, generation: u64, sim: &mut Simulator, ip: &mut dyn IpSend) {
        if !self.timer.fire(generation) {
            trace!(conn = %self.id, generation, "过期的定时器事件");
            return;
        }
        if !self.in_flight.is_empty() {
            let n = self.in_flight.len().min(self.cfg.mss);
            let chunk: Vec<u8> = self.in_flight.iter().take(n).copied().collect();
            self.emit(self.snd_una, TcpFlags::ACK, &chunk, ip);
        } else if let Some(fin) = self.fin_seq {
            self.emit(fin, TcpFlags::FIN | TcpFlags::ACK, &[], ip);
        } else {
            return;
        }

        self.retransmits += 1;
        self.sample_start = None;
        self.cwnd = self.cwnd.div_ceil(2).max(1);
        info!(
            conn = %self.id,
            seq = self.snd_una,
            cwnd = self.cwnd,
            rto = ?self.rtt.timeout(),
            "⏰ 超时重传"
        );
        self.arm_timer(sim);
    }

    /// 本连接被移除前调用。
    pub(crate) fn teardown(&mut self) {
        self.timer.cancel();
    }

    fn transmit(&mut self, sim: &mut Simulator, ip: &mut dyn IpSend) {
        let budget = if self.cfg.strict_window {
            let in_flight_segs = self.in_flight.len().div_ceil(self.cfg.mss.max(1));
            self.cwnd
                .saturating_sub(u32::try_from(in_flight_segs).unwrap_or(u32::MAX))
        } else {
            self.cwnd
        };

        let mut sent = 0u32;
        for _ in 0..budget {
            if self.pending.is_empty() {
                break;
            }
            let n = self.pending.len().min(self.cfg.mss.max(1));
            let chunk: Vec<u8> = self.pending.drain(..n).collect();
            self.emit(self.snd_nxt, TcpFlags::ACK, &chunk, ip);
            self.in_flight.extend(chunk);
            self.snd_nxt = self.snd_nxt.wrapping_add(n as u32);
            sent += 1;
        }

        if sent > 0 {
            debug!(
                conn = %self.id,
                segments = sent,
                snd_nxt = self.snd_nxt,
                pending = self.pending.len(),
                "发送数据段"
            );
            if self.sample_start.is_none() {
                self.sample_start = Some(sim.now());
            }
            if !self.timer.is_armed() {
                self.arm_timer(sim);
            }
        }
        self.maybe_send_fin(sim, ip);
    }

    fn maybe_send_fin(&mut self, sim: &mut Simulator, ip: &mut dyn IpSend) {
        if !self.close_requested || self.fin_seq.is_some() || !self.pending.is_empty() {
            return;
        }
        self.fin_seq = Some(self.snd_nxt);
        debug!(conn = %self.id, seq = self.snd_nxt, "发送 FIN");
        self.emit(self.snd_nxt, TcpFlags::FIN | TcpFlags::ACK, &[], ip);
        if !self.timer.is_armed() {
            self.arm_timer(sim);
        }
    }

    fn arm_timer(&mut self, sim: &mut Simulator) {
        let rto = self.rtt.timeout();
        self.timer.arm(sim, rto, self.node, self.id);
    }

    fn deliver(&mut self, payload: &[u8], sim: &mut Simulator, ip: &mut dyn IpSend) {
        let Some(mut handler) = self.handler.take() else {
            debug_assert!(false, "no data handler registered on {}", self.id);
            warn!(conn = %self.id, len = payload.len(), "没有注册数据回调，丢弃");
            return;
        };
        handler(&mut Socket::new(self, sim, ip), payload);
        // 回调里可能换了新的 handler
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }

    fn emit(&self, seq: u32, flags: TcpFlags, payload: &[u8], ip: &mut dyn IpSend) {
        let segment = TcpHeader::new(self.id.local_port, self.id.peer_port, seq, self.rcv_nxt, flags)
            .with_window(self.cfg.window)
            .emit_segment(self.id.local_addr, self.id.peer_addr, payload);
        ip.send(&segment, self.id.peer_addr, PROTO_TCP);
    }
}

/// 应用在回调里看到的连接。
pub struct Socket<'a> {
    conn: &'a mut Connection,
    sim: &'a mut Simulator,
    ip: &'a mut dyn IpSend,
}

impl<'a> Socket<'a> {
    pub fn new(conn: &'a mut Connection, sim: &'a mut Simulator, ip: &'a mut dyn IpSend) -> Self {
        Self { conn, sim, ip }
    }

    pub fn id(&self) -> ConnId {
        self.conn.id
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn send(&mut self, data: &[u8]) {
        self.conn.send(data, self.sim, self.ip);
    }

    /// 同 [`Connection::close`]：还有待发数据时 FIN 延后发出。
    pub fn close(&mut self) {
        self.conn.close(self.sim, self.ip);
    }

    pub fn set_handler(&mut self, handler: impl FnMut(&mut Socket<'_>, &[u8]) + Send + 'static) {
        self.conn.handler = Some(Box::new(handler));
    }
}
