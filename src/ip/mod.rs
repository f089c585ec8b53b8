//! 网络层
//!
//! 固定 20 字节 IPv4 头、Internet 校验和、最长前缀匹配转发表，
//! 以及主机/路由器两种角色下的接收与发送。

pub mod checksum;
mod cidr;
mod header;
pub mod icmp;
mod layer;
mod routing;

pub use cidr::Cidr;
pub use header::{Ipv4Header, HEADER_LEN, MAX_TOTAL_LEN};
pub use layer::{Delivery, IpLayer, IpSend, IpStats, DEFAULT_TTL};
pub use routing::{ForwardingTable, Route};

/// IP 协议号：ICMP。
pub const PROTO_ICMP: u8 = 1;
/// IP 协议号：TCP。
pub const PROTO_TCP: u8 = 6;
