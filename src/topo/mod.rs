//! 预置拓扑

pub mod chain;
