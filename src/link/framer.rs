//! 帧编码与增量解码

use tracing::{trace, warn};

/// 帧定界符（同时作为帧头和帧尾）。
pub const END: u8 = 0xC0;
/// 转义字节。
pub const ESC: u8 = 0xDB;
/// `ESC ESC_END` 表示载荷中的 `END`。
pub const ESC_END: u8 = 0xDC;
/// `ESC ESC_ESC` 表示载荷中的 `ESC`。
pub const ESC_ESC: u8 = 0xDD;

/// 把一帧编码为可直接写入字节流的序列：`END`、转义后的载荷、`END`。
pub fn encode(frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() + 2 + frame.len() / 16);
    out.push(END);
    for &b in frame {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Normal,
    Escaped,
}

/// 单个邻居的增量解码状态。
///
/// 字节可以按任意粒度到达；帧可以跨越多次 `feed`。
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    state: DecodeState,
    malformed: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已丢弃的非法转义序列数。
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// 当前缓冲中尚未完成的帧字节数。
    pub fn partial_len(&self) -> usize {
        self.buf.len()
    }

    /// 送入一段字节；每完成一个非空帧调用一次 `on_frame`。
    pub fn feed(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Vec<u8>)) {
        for &b in bytes {
            match (self.state, b) {
                (DecodeState::Escaped, END) => {
                    // 转义后紧跟定界符：截断的转义，丢弃转义本身，帧照常结束
                    self.malformed += 1;
                    warn!("截断的转义序列，已丢弃");
                    self.state = DecodeState::Normal;
                    self.finish(&mut on_frame);
                }
                (DecodeState::Escaped, ESC_END) => {
                    self.buf.push(END);
                    self.state = DecodeState::Normal;
                }
                (DecodeState::Escaped, ESC_ESC) => {
                    self.buf.push(ESC);
                    self.state = DecodeState::Normal;
                }
                (DecodeState::Escaped, other) => {
                    self.malformed += 1;
                    warn!(byte = other, "非法转义序列，已丢弃");
                    self.state = DecodeState::Normal;
                }
                (DecodeState::Normal, END) => self.finish(&mut on_frame),
                (DecodeState::Normal, ESC) => self.state = DecodeState::Escaped,
                (DecodeState::Normal, other) => self.buf.push(other),
            }
        }
    }

    fn finish(&mut self, on_frame: &mut impl FnMut(Vec<u8>)) {
        // 空缓冲遇到定界符什么也不做：END 既是帧头也是帧尾
        if self.buf.is_empty() {
            return;
        }
        let frame = std::mem::take(&mut self.buf);
        trace!(len = frame.len(), "完成一帧");
        on_frame(frame);
    }
}
