//! 网络层收发
//!
//! 目的地址等于本机地址时走主机路径（交付给上层），否则作为路由器转发。
//! 没有配置本机地址的实例是纯路由器，这一角色由配置显式给出。

use std::net::Ipv4Addr;

use tracing::{debug, info, trace, warn};

use super::header::{Ipv4Header, HEADER_LEN, MAX_TOTAL_LEN};
use super::routing::{ForwardingTable, Route};
use super::{checksum, icmp, PROTO_ICMP};
use crate::link::LinkLayer;

/// 主机发出数据报的默认 TTL。
pub const DEFAULT_TTL: u8 = 64;

/// 传输层向下的接口。
pub trait IpSend {
    /// 发送一个传输层段；`dst` 不可达时由网络层记录并丢弃。
    fn send(&mut self, segment: &[u8], dst: Ipv4Addr, protocol: u8);

    /// 测试用：链路不能保证传输层校验和正确时跳过校验。
    fn ignore_checksum(&self) -> bool {
        false
    }
}

/// 交付给本机上层的数据报。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IpStats {
    pub sent: u64,
    pub delivered: u64,
    pub forwarded: u64,
    pub ttl_expired: u64,
    pub no_route: u64,
    /// 本机要发的段装不进一个数据报
    pub oversize: u64,
    pub bad_header: u64,
    pub bad_checksum: u64,
}

#[derive(Debug)]
pub struct IpLayer {
    link: LinkLayer,
    local: Option<Ipv4Addr>,
    table: ForwardingTable,
    ignore_checksum: bool,
    pub stats: IpStats,
}

impl IpLayer {
    /// `local` 为 `None` 时该实例只做路由器。
    pub fn new(link: LinkLayer, local: Option<Ipv4Addr>) -> Self {
        Self {
            link,
            local,
            table: ForwardingTable::default(),
            ignore_checksum: false,
            stats: IpStats::default(),
        }
    }

    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        self.local
    }

    pub fn set_local_addr(&mut self, local: Option<Ipv4Addr>) {
        self.local = local;
    }

    /// 整表替换转发表。
    pub fn set_forwarding_table(&mut self, routes: impl IntoIterator<Item = Route>) {
        self.table.set(routes);
    }

    pub fn forwarding_table(&self) -> &ForwardingTable {
        &self.table
    }

    pub fn set_ignore_checksum(&mut self, ignore: bool) {
        self.ignore_checksum = ignore;
    }

    pub fn link(&self) -> &LinkLayer {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkLayer {
        &mut self.link
    }

    /// 处理链路层交上来的一个数据报。发往本机的返回 `Some`，其余在内部转发或丢弃。
    #[tracing::instrument(skip(self, datagram), fields(local = ?self.local, len = datagram.len()))]
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Option<Delivery> {
        let (header, payload) = match Ipv4Header::parse(datagram) {
            Ok(v) => v,
            Err(err) => {
                self.stats.bad_header += 1;
                warn!(%err, "无法解析 IPv4 头，丢弃");
                return None;
            }
        };
        let hdr_bytes = usize::from(header.header_len) * 4;
        if !self.ignore_checksum && !checksum::verify(&datagram[..hdr_bytes]) {
            self.stats.bad_checksum += 1;
            warn!(src = %header.src, dst = %header.dst, "IPv4 头校验和错误，丢弃");
            return None;
        }

        if Some(header.dst) == self.local {
            self.stats.delivered += 1;
            debug!(src = %header.src, protocol = header.protocol, len = payload.len(), "交付给本机");
            return Some(Delivery {
                src: header.src,
                dst: header.dst,
                protocol: header.protocol,
                payload: payload.to_vec(),
            });
        }

        self.forward(&header, payload, datagram);
        None
    }

    fn forward(&mut self, header: &Ipv4Header, payload: &[u8], original: &[u8]) {
        if header.ttl <= 1 {
            self.stats.ttl_expired += 1;
            info!(src = %header.src, dst = %header.dst, "⏱️  TTL 耗尽，不再转发");
            if header.protocol == PROTO_ICMP
                && icmp::kind(payload).is_some_and(|(t, _)| t == icmp::TYPE_TIME_EXCEEDED)
            {
                // 不为 ICMP 差错报文再生成差错报文
                return;
            }
            let notice = icmp::time_exceeded(original);
            self.send(&notice, header.src, PROTO_ICMP);
            return;
        }

        let Some(next_hop) = self.table.next_hop(header.dst) else {
            self.stats.no_route += 1;
            warn!(dst = %header.dst, "无路由，丢弃");
            return;
        };
        let fwd = header.forwarded(payload.len());
        trace!(ttl = fwd.ttl, %next_hop, "转发");
        self.stats.forwarded += 1;
        self.link.send(&fwd.with_payload(payload), next_hop);
    }

    /// 本机发出：构造完整头部、查表、交给链路层。
    #[tracing::instrument(skip(self, segment), fields(len = segment.len()))]
    pub fn send(&mut self, segment: &[u8], dst: Ipv4Addr, protocol: u8) {
        if HEADER_LEN + segment.len() > MAX_TOTAL_LEN {
            self.stats.oversize += 1;
            warn!(%dst, len = segment.len(), max = MAX_TOTAL_LEN - HEADER_LEN, "载荷超出数据报上限，丢弃");
            return;
        }
        let src = self.local.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let Some(next_hop) = self.table.next_hop(dst) else {
            self.stats.no_route += 1;
            warn!(%dst, "无路由，丢弃本机发出的数据报");
            return;
        };
        let header = Ipv4Header::new(src, dst, protocol, DEFAULT_TTL, segment.len());
        self.stats.sent += 1;
        debug!(%src, %dst, %next_hop, protocol, "发送数据报");
        self.link.send(&header.with_payload(segment), next_hop);
    }
}

impl IpSend for IpLayer {
    fn send(&mut self, segment: &[u8], dst: Ipv4Addr, protocol: u8) {
        IpLayer::send(self, segment, dst, protocol);
    }

    fn ignore_checksum(&self) -> bool {
        self.ignore_checksum
    }
}
