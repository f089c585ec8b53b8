//! 事件驱动核心
//!
//! 协议栈的所有接收、超时处理都作为事件在这里串行执行：单线程、不可重入，
//! 唯一的“挂起点”是等待下一个事件。

mod event;
mod scheduled_event;
mod simulator;
mod time;
mod world;

pub use event::Event;
pub use scheduled_event::ScheduledEvent;
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
