//! 转发表（最长前缀匹配）
//!
//! 表项按配置顺序保存，允许重叠；查找时选前缀最长的匹配项，
//! 前缀长度相同则取最先出现的一项。整表替换，不做增量修改。

use std::net::Ipv4Addr;

use tracing::{debug, trace};

use super::cidr::Cidr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub cidr: Cidr,
    pub next_hop: Ipv4Addr,
}

#[derive(Debug, Default, Clone)]
pub struct ForwardingTable {
    routes: Vec<Route>,
}

impl ForwardingTable {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// 整表替换。
    pub fn set(&mut self, routes: impl IntoIterator<Item = Route>) {
        self.routes = routes.into_iter().collect();
        debug!(entries = self.routes.len(), "转发表已替换");
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 返回 `dst` 的下一跳；没有任何匹配项时返回 `None`（无路由）。
    pub fn next_hop(&self, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if !route.cidr.contains(dst) {
                continue;
            }
            // 严格大于：前缀长度相同时保留先扫描到的表项
            if best.is_none_or(|b| route.cidr.prefix_len() > b.cidr.prefix_len()) {
                best = Some(route);
            }
        }
        trace!(%dst, next_hop = ?best.map(|r| r.next_hop), "查找下一跳");
        best.map(|r| r.next_hop)
    }
}
