//! Scripted far end of a connection.
//!
//! Builds correctly checksummed segments and tracks the sequence/ack cursors
//! the way an active opener would. It never retransmits; tests and the demo
//! binary drive it by hand.

use std::net::Ipv4Addr;

use super::header::{TcpFlags, TcpHeader};
use crate::error::WireError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub header: TcpHeader,
    pub payload: Vec<u8>,
    /// True when the segment carried the next expected bytes (or SYN/FIN).
    pub in_order: bool,
}

#[derive(Debug, Clone)]
pub struct TcpPeer {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    pub snd_nxt: u32,
    pub rcv_nxt: u32,
    pub established: bool,
    pub remote_closed: bool,
}

impl TcpPeer {
    pub fn new(addr: Ipv4Addr, port: u16, remote_addr: Ipv4Addr, remote_port: u16, isn: u32) -> Self {
        Self {
            addr,
            port,
            remote_addr,
            remote_port,
            snd_nxt: isn,
            rcv_nxt: 0,
            established: false,
            remote_closed: false,
        }
    }

    pub fn segment(&self, seq: u32, flags: TcpFlags, payload: &[u8]) -> Vec<u8> {
        TcpHeader::new(self.port, self.remote_port, seq, self.rcv_nxt, flags).emit_segment(
            self.addr,
            self.remote_addr,
            payload,
        )
    }

    pub fn syn(&mut self) -> Vec<u8> {
        let seg = self.segment(self.snd_nxt, TcpFlags::SYN, &[]);
        self.snd_nxt = self.snd_nxt.wrapping_add(1);
        seg
    }

    pub fn data(&mut self, payload: &[u8]) -> Vec<u8> {
        let seg = self.segment(self.snd_nxt, TcpFlags::ACK | TcpFlags::PSH, payload);
        self.snd_nxt = self.snd_nxt.wrapping_add(payload.len() as u32);
        seg
    }

    pub fn ack(&self) -> Vec<u8> {
        self.segment(self.snd_nxt, TcpFlags::ACK, &[])
    }

    pub fn fin(&mut self) -> Vec<u8> {
        let seg = self.segment(self.snd_nxt, TcpFlags::FIN | TcpFlags::ACK, &[]);
        self.snd_nxt = self.snd_nxt.wrapping_add(1);
        seg
    }

    /// Consume a segment from the remote side and advance `rcv_nxt`.
    pub fn receive(&mut self, segment: &[u8]) -> Result<Received, WireError> {
        let (header, payload) = TcpHeader::parse(segment)?;
        let mut in_order = false;
        if header.flags.contains(TcpFlags::SYN) {
            self.rcv_nxt = header.seq.wrapping_add(1);
            self.established = true;
            in_order = true;
        } else if header.seq == self.rcv_nxt {
            if !payload.is_empty() {
                self.rcv_nxt = self.rcv_nxt.wrapping_add(payload.len() as u32);
                in_order = true;
            }
            if header.flags.contains(TcpFlags::FIN) {
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
                self.remote_closed = true;
                in_order = true;
            }
        }
        Ok(Received {
            header,
            payload: payload.to_vec(),
            in_order,
        })
    }
}
