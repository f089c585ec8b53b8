//! 世界 trait

use super::simulator::Simulator;
use std::any::Any;

/// 事件作用的对象（例如 `NetWorld` 持有整个网络）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
