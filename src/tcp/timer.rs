//! 重传定时器
//!
//! 事件一经入队无法撤回，所以每次 `arm` 递增代号，触发时代号不符
//! （已被取消或重新设置）的事件直接忽略。`cancel` 可以重复调用。

use tracing::trace;

use super::conn::ConnId;
use crate::net::{NetWorld, NodeId};
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Default, Clone)]
pub struct RetransmitTimer {
    generation: u64,
    deadline: Option<SimTime>,
}

impl RetransmitTimer {
    /// 在 `after` 之后触发；已在运行的定时器被替换。
    pub fn arm(&mut self, sim: &mut Simulator, after: SimTime, node: NodeId, conn: ConnId) {
        self.generation = self.generation.wrapping_add(1);
        let at = sim.now().saturating_add(after);
        self.deadline = Some(at);
        trace!(%conn, ?at, generation = self.generation, "设置重传定时器");
        sim.schedule(
            at,
            RetransmitTimeout {
                node,
                conn,
                generation: self.generation,
            },
        );
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<SimTime> {
        self.deadline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 代号匹配时消费这次触发并返回 true。
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        if self.deadline.is_none() || generation != self.generation {
            return false;
        }
        self.deadline = None;
        true
    }
}

/// 事件：某节点上某连接的重传定时器到期。
#[derive(Debug)]
pub struct RetransmitTimeout {
    pub node: NodeId,
    pub conn: ConnId,
    pub generation: u64,
}

impl Event for RetransmitTimeout {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let RetransmitTimeout {
            node,
            conn,
            generation,
        } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.on_retransmit_timeout(node, conn, generation, sim);
    }
}
