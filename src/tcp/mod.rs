//! 传输层（简化 TCP）
//!
//! 只实现被动打开的一侧：监听端点收到 SYN 后建立连接，顺序交付、
//! 累计确认、超时重传、按段计数的拥塞窗口以及 Jacobson/Karels RTT 估计。
//! 不做乱序缓存、选项协商、SACK，也不建模完整的十一状态机。

mod conn;
mod header;
mod peer;
mod rtt;
mod server;
mod timer;

pub use conn::{AcceptHandler, ConnId, Connection, DataHandler, Socket};
pub use header::{verify_segment, TcpFlags, TcpHeader, HEADER_LEN};
pub use peer::{Received, TcpPeer};
pub use rtt::{RttEstimator, ALPHA, BETA};
pub use server::{TcpServer, TcpStats};
pub use timer::{RetransmitTimeout, RetransmitTimer};

use crate::sim::SimTime;

/// 单个数据段的最大载荷。
pub const DEFAULT_MSS: usize = 1460;

/// MSS 上限：载荷加 TCP 头、IPv4 头不能超过 16 位 total length。
pub const MAX_MSS: usize = u16::MAX as usize - HEADER_LEN - crate::ip::HEADER_LEN;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// 数据段载荷上限（字节）
    pub mss: usize,
    /// 尚无 RTT 样本时的超时间隔
    pub init_rto: SimTime,
    /// 初始拥塞窗口（段数）
    pub init_cwnd: u32,
    /// 通告窗口（不参与流控，只是填进头部）
    pub window: u16,
    /// 初始序号的随机种子；`None` 时使用系统熵
    pub isn_seed: Option<u64>,
    /// 为 true 时每次发送最多补足 `cwnd - 在途段数`，而不是固定 `cwnd` 段
    pub strict_window: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            init_rto: SimTime::from_secs(1),
            init_cwnd: 1,
            window: u16::MAX,
            isn_seed: None,
            strict_window: false,
        }
    }
}

/// 模 2^32 比较：`a` 是否在 `b` 之后。
pub(crate) fn seq_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}
