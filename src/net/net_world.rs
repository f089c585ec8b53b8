//! 网络世界

use super::network::Network;
use crate::sim::World;
use std::any::Any;

/// 持有 `Network` 的世界；所有网络事件都 downcast 到它。
#[derive(Debug)]
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self { net }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
