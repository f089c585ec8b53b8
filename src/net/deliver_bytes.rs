//! 字节到达事件

use std::net::Ipv4Addr;

use super::id::NodeId;
use super::net_world::NetWorld;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：一块字节从 `from` 地址的邻居到达节点 `to`。
#[derive(Debug)]
pub struct DeliverBytes {
    pub to: NodeId,
    pub from: Ipv4Addr,
    pub bytes: Vec<u8>,
}

impl Event for DeliverBytes {
    #[tracing::instrument(skip(self, sim, world), fields(to = ?self.to, from = %self.from, len = self.bytes.len()))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverBytes { to, from, bytes } = *self;
        trace!(now = ?sim.now(), "字节到达");

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, from, &bytes, sim);
    }
}
