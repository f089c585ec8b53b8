//! 配置
//!
//! 两层：`*Spec` 是 JSON 里的原样结构（地址都是字符串），
//! `StackConfig` 是解析后的结果，由 `NetworkBuilder` 直接使用。

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ip::{Cidr, Route};
use crate::net::{Network, NetworkBuilder};
use crate::sim::SimTime;
use crate::tcp::{TcpConfig, MAX_MSS};

/// 未指定时的线路传播时延（微秒）
pub const DEFAULT_LATENCY_US: u64 = 1_000;
/// 未指定时的线路速率（bit/s），取常见串口波特率
pub const DEFAULT_BITS_PER_SEC: u64 = 115_200;

/// 解析后的单节点协议栈配置。
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    /// `None` 表示纯路由器：不接收任何本机流量
    pub local_addr: Option<Ipv4Addr>,
    pub routes: Vec<Route>,
    pub ignore_checksum: bool,
    pub listen: Option<(u16, TcpConfig)>,
}

impl StackConfig {
    pub fn host(local_addr: Ipv4Addr) -> Self {
        Self {
            local_addr: Some(local_addr),
            ..Self::default()
        }
    }

    pub fn router() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, cidr: Cidr, next_hop: Ipv4Addr) -> Self {
        self.routes.push(Route { cidr, next_hop });
        self
    }

    pub fn with_listen(mut self, port: u16, cfg: TcpConfig) -> Self {
        self.listen = Some((port, cfg));
        self
    }
}

/// 一条转发表项：`["10.0.0.0/8", "10.0.0.1"]`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec(pub String, pub String);

impl RouteSpec {
    pub fn resolve(&self) -> Result<Route, ConfigError> {
        Ok(Route {
            cidr: Cidr::parse(&self.0)?,
            next_hop: parse_addr(&self.1)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenSpec {
    pub port: u16,
    #[serde(default)]
    pub mss: Option<usize>,
    #[serde(default)]
    pub init_rto_ms: Option<u64>,
    #[serde(default)]
    pub init_cwnd: Option<u32>,
    #[serde(default)]
    pub isn_seed: Option<u64>,
    #[serde(default)]
    pub strict_window: Option<bool>,
}

impl ListenSpec {
    /// MSS 必须在 `1..=MAX_MSS` 内，否则数据段放不进一个数据报。
    pub fn resolve(&self) -> Result<(u16, TcpConfig), ConfigError> {
        let d = TcpConfig::default();
        let mss = self.mss.unwrap_or(d.mss);
        if !(1..=MAX_MSS).contains(&mss) {
            return Err(ConfigError::InvalidMss(mss));
        }
        let cfg = TcpConfig {
            mss,
            init_rto: self.init_rto_ms.map(SimTime::from_millis).unwrap_or(d.init_rto),
            init_cwnd: self.init_cwnd.unwrap_or(d.init_cwnd).max(1),
            isn_seed: self.isn_seed.or(d.isn_seed),
            strict_window: self.strict_window.unwrap_or(d.strict_window),
            ..d
        };
        Ok((self.port, cfg))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackSpec {
    /// 省略或 `null` 表示路由器
    #[serde(default)]
    pub local_addr: Option<String>,
    /// 按顺序保存，同长前缀先出现者优先
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub ignore_checksum: bool,
    #[serde(default)]
    pub listen: Option<ListenSpec>,
}

impl StackSpec {
    pub fn resolve(&self) -> Result<StackConfig, ConfigError> {
        let local_addr = self.local_addr.as_deref().map(parse_addr).transpose()?;
        let routes = self
            .routes
            .iter()
            .map(RouteSpec::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StackConfig {
            local_addr,
            routes,
            ignore_checksum: self.ignore_checksum,
            listen: self.listen.as_ref().map(ListenSpec::resolve).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// 邻居用来称呼这个节点的地址
    pub addr: String,
    #[serde(flatten)]
    pub stack: StackSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSpec {
    pub a: String,
    pub b: String,
    #[serde(default)]
    pub latency_us: Option<u64>,
    #[serde(default)]
    pub bits_per_sec: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySpec {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub lines: Vec<LineSpec>,
}

impl TopologySpec {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn build(&self) -> Result<Network, ConfigError> {
        let mut b = NetworkBuilder::new();
        let mut ids = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if ids.iter().any(|(name, _)| name == &node.name) {
                return Err(ConfigError::DuplicateNode(node.name.clone()));
            }
            let addr = parse_addr(&node.addr)?;
            let id = b.add_node(node.name.clone(), addr, node.stack.resolve()?);
            ids.push((node.name.clone(), id));
        }

        let lookup = |name: &str| {
            ids.iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| *id)
                .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))
        };
        for line in &self.lines {
            let a = lookup(&line.a)?;
            let z = lookup(&line.b)?;
            b.connect(
                a,
                z,
                SimTime::from_micros(line.latency_us.unwrap_or(DEFAULT_LATENCY_US)),
                line.bits_per_sec.unwrap_or(DEFAULT_BITS_PER_SEC),
            );
        }
        Ok(b.build())
    }
}

pub fn parse_addr(s: &str) -> Result<Ipv4Addr, ConfigError> {
    s.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(s.to_string()))
}
