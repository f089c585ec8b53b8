//! 主机 - 路由器 - 主机
//!
//! ```text
//! client 10.0.1.2 ---- router 10.0.0.1 ---- server 10.0.2.2
//! ```
//!
//! 两台主机把默认路由指向路由器；路由器按 /24 网段转发给两端。

use std::net::Ipv4Addr;

use tracing::info;

use crate::config::StackConfig;
use crate::ip::Cidr;
use crate::net::{Network, NetworkBuilder, NodeId};
use crate::sim::SimTime;
use crate::tcp::TcpConfig;

pub const CLIENT_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
pub const ROUTER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

#[derive(Debug, Clone)]
pub struct ChainOpts {
    /// 单向传播时延
    pub latency: SimTime,
    pub bits_per_sec: u64,
    /// 服务器监听端口
    pub port: u16,
    pub tcp: TcpConfig,
    pub ignore_checksum: bool,
}

impl Default for ChainOpts {
    fn default() -> Self {
        Self {
            latency: SimTime::from_millis(1),
            bits_per_sec: 1_000_000,
            port: 7,
            tcp: TcpConfig::default(),
            ignore_checksum: false,
        }
    }
}

#[derive(Debug)]
pub struct Chain {
    pub net: Network,
    pub client: NodeId,
    pub router: NodeId,
    pub server: NodeId,
}

pub fn build_chain(opts: &ChainOpts) -> Chain {
    let any = Cidr::new(Ipv4Addr::UNSPECIFIED, 0);
    let mut b = NetworkBuilder::new();

    let mut client_cfg = StackConfig::host(CLIENT_ADDR).with_route(any, ROUTER_ADDR);
    client_cfg.ignore_checksum = opts.ignore_checksum;

    let mut router_cfg = StackConfig::router()
        .with_route(Cidr::new(CLIENT_ADDR, 24), CLIENT_ADDR)
        .with_route(Cidr::new(SERVER_ADDR, 24), SERVER_ADDR);
    router_cfg.ignore_checksum = opts.ignore_checksum;

    let mut server_cfg = StackConfig::host(SERVER_ADDR)
        .with_route(any, ROUTER_ADDR)
        .with_listen(opts.port, opts.tcp.clone());
    server_cfg.ignore_checksum = opts.ignore_checksum;

    let client = b.add_node("client", CLIENT_ADDR, client_cfg);
    let router = b.add_node("router", ROUTER_ADDR, router_cfg);
    let server = b.add_node("server", SERVER_ADDR, server_cfg);
    b.connect(client, router, opts.latency, opts.bits_per_sec);
    b.connect(router, server, opts.latency, opts.bits_per_sec);

    info!(latency = ?opts.latency, bps = opts.bits_per_sec, port = opts.port, "构建 chain 拓扑");
    Chain {
        net: b.build(),
        client,
        router,
        server,
    }
}
