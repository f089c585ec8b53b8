//! 事件 trait

use super::simulator::Simulator;
use super::world::World;

/// 可调度的一次性回调。使用 `self: Box<Self>` 以便事件把自身携带的数据 move 出来。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}
