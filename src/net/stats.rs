//! 物理层统计

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    /// 写入线路的字节块数（每块对应一次 `SerialLine::send`，即一帧）
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub chunks_delivered: u64,
    pub bytes_delivered: u64,
    /// 因丢包注入而丢弃
    pub chunks_dropped: u64,
}
