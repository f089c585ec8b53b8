//! 仿真网络
//!
//! 节点之间用带时延和速率的串口线相连，每个节点运行一套完整的协议栈。

mod deliver_bytes;
mod id;
mod line;
mod net_world;
mod network;
mod stack;
mod stats;

pub use deliver_bytes::DeliverBytes;
pub use id::{LineId, NodeId};
pub use line::{Line, SimPort};
pub use net_world::NetWorld;
pub use network::{Network, NetworkBuilder};
pub use stack::{Stack, DEFAULT_INBOX_CAPACITY};
pub use stats::Stats;
