//! 链路层：字节填充成帧
//!
//! 每个邻居一条字节流（串口线），帧用 `END` 定界，载荷中的保留字节
//! 用 `ESC` 转义。

mod framer;
mod layer;

pub use framer::{encode, FrameDecoder, END, ESC, ESC_END, ESC_ESC};
pub use layer::{LinkLayer, SerialLine};
