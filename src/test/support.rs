//! 测试用的假线路和假网络层。

use crate::ip::IpSend;
use crate::link::SerialLine;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// 记录写入的每一块字节。
#[derive(Debug, Clone, Default)]
pub struct CaptureLine {
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CaptureLine {
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.written.lock().expect("capture lock"))
    }
}

impl SerialLine for CaptureLine {
    fn send(&mut self, bytes: &[u8]) {
        self.written.lock().expect("capture lock").push(bytes.to_vec());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub segment: Vec<u8>,
    pub dst: Ipv4Addr,
    pub protocol: u8,
}

/// 记录传输层交给网络层的每个段。
#[derive(Debug, Default)]
pub struct RecordingIp {
    pub sent: Vec<Sent>,
    pub ignore_checksum: bool,
}

impl RecordingIp {
    pub fn take(&mut self) -> Vec<Sent> {
        std::mem::take(&mut self.sent)
    }
}

impl IpSend for RecordingIp {
    fn send(&mut self, segment: &[u8], dst: Ipv4Addr, protocol: u8) {
        self.sent.push(Sent {
            segment: segment.to_vec(),
            dst,
            protocol,
        });
    }

    fn ignore_checksum(&self) -> bool {
        self.ignore_checksum
    }
}
