use crate::ip::PROTO_TCP;
use crate::net::NodeId;
use crate::sim::Simulator;
use crate::tcp::{ConnId, TcpConfig, TcpFlags, TcpHeader, TcpPeer, TcpServer};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use super::support::{RecordingIp, Sent};

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
const PORT: u16 = 7;
const PEER_ISN: u32 = 1_000;

type Inbox = Arc<Mutex<Vec<Vec<u8>>>>;

struct Harness {
    sim: Simulator,
    ip: RecordingIp,
    server: TcpServer,
    peer: TcpPeer,
    received: Inbox,
}

impl Harness {
    fn new(cfg: TcpConfig) -> Self {
        let received: Inbox = Arc::default();
        let mut server = TcpServer::new(
            NodeId(0),
            PORT,
            TcpConfig {
                isn_seed: Some(42),
                ..cfg
            },
        );
        let sink = Arc::clone(&received);
        server.on_accept(move |s| {
            let sink = Arc::clone(&sink);
            s.set_handler(move |_s, data| sink.lock().expect("inbox lock").push(data.to_vec()));
        });
        Self {
            sim: Simulator::default(),
            ip: RecordingIp::default(),
            server,
            peer: TcpPeer::new(CLIENT, 40_000, SERVER, PORT, PEER_ISN),
            received,
        }
    }

    fn id(&self) -> ConnId {
        ConnId {
            peer_addr: CLIENT,
            peer_port: 40_000,
            local_addr: SERVER,
            local_port: PORT,
        }
    }

    fn push(&mut self, segment: &[u8]) {
        self.server
            .on_segment(CLIENT, SERVER, segment, &mut self.sim, &mut self.ip);
    }

    /// 三次握手；返回 SYN+ACK。
    fn open(&mut self) -> TcpHeader {
        let syn = self.peer.syn();
        self.push(&syn);
        let out = self.ip.take();
        assert_eq!(out.len(), 1, "expected a single SYN+ACK");
        let rx = self.peer.receive(&out[0].segment).expect("valid segment");
        let ack = self.peer.ack();
        self.push(&ack);
        assert!(self.ip.take().is_empty(), "bare handshake ACK needs no reply");
        rx.header
    }

    fn sent_headers(&mut self) -> Vec<(TcpHeader, Vec<u8>)> {
        self.ip
            .take()
            .into_iter()
            .map(|Sent { segment, dst, protocol }| {
                assert_eq!(dst, CLIENT);
                assert_eq!(protocol, PROTO_TCP);
                let (h, p) = TcpHeader::parse(&segment).expect("valid segment");
                (h, p.to_vec())
            })
            .collect()
    }

    fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().expect("inbox lock").clone()
    }

    fn send(&mut self, data: &[u8]) {
        let id = self.id();
        assert!(self.server.send(id, data, &mut self.sim, &mut self.ip));
    }

    fn fire_timer(&mut self) {
        let id = self.id();
        let generation = self.server.get(id).expect("conn").timer().generation();
        self.server
            .on_timeout(id, generation, &mut self.sim, &mut self.ip);
    }
}

fn mss(n: usize) -> TcpConfig {
    TcpConfig {
        mss: n,
        ..TcpConfig::default()
    }
}

#[test]
fn syn_is_answered_with_syn_ack() {
    let mut h = Harness::new(TcpConfig::default());
    let syn_ack = h.open();

    assert_eq!(syn_ack.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(syn_ack.ack, PEER_ISN.wrapping_add(1));
    assert_eq!(h.server.stats.accepted, 1);

    let conn = h.server.get(h.id()).expect("connection registered");
    assert_eq!(conn.isn(), syn_ack.seq);
    assert_eq!(conn.snd_nxt(), syn_ack.seq.wrapping_add(1));
    assert_eq!(conn.rcv_nxt(), PEER_ISN.wrapping_add(1));
}

#[test]
fn in_order_data_is_delivered_then_acknowledged() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();

    let seg = h.peer.data(b"hello");
    h.push(&seg);

    assert_eq!(h.received(), vec![b"hello".to_vec()]);
    let out = h.sent_headers();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.flags, TcpFlags::ACK);
    assert_eq!(out[0].0.ack, h.peer.snd_nxt);
}

#[test]
fn receive_cursor_advances_before_callback() {
    let mut h = Harness::new(TcpConfig::default());
    let seen = Arc::new(Mutex::new(None));
    let seen_in_cb = Arc::clone(&seen);
    h.server.on_accept(move |s| {
        let seen = Arc::clone(&seen_in_cb);
        s.set_handler(move |s, _data| {
            *seen.lock().expect("lock") = Some(s.connection().rcv_nxt());
        });
    });
    h.open();

    let seg = h.peer.data(b"abc");
    h.push(&seg);
    assert_eq!(*seen.lock().expect("lock"), Some(h.peer.snd_nxt));
}

#[test]
fn out_of_order_segment_is_ignored() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();

    let ahead = h.peer.snd_nxt.wrapping_add(10);
    let seg = h.peer.segment(ahead, TcpFlags::ACK | TcpFlags::PSH, b"later");
    h.push(&seg);

    assert!(h.received().is_empty());
    assert!(h.sent_headers().is_empty());
    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.rcv_nxt(), h.peer.snd_nxt);
}

#[test]
fn send_is_limited_by_cwnd_and_grows_per_sample() {
    let mut h = Harness::new(mss(1000));
    h.open();

    h.send(&[7u8; 3000]);
    let first = h.sent_headers();
    assert_eq!(first.len(), 1, "initial cwnd is one segment");
    assert_eq!(first[0].1.len(), 1000);
    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.pending_len(), 2000);
    assert!(conn.timer().is_armed());

    h.peer.rcv_nxt = first[0].0.seq.wrapping_add(1000);
    let ack = h.peer.ack();
    h.push(&ack);

    let next = h.sent_headers();
    assert_eq!(next.len(), 2, "cwnd grew to two segments");
    assert_eq!(next[0].0.seq, first[0].0.seq.wrapping_add(1000));
    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.cwnd(), 2);
    assert_eq!(conn.pending_len(), 0);
    assert!(conn.rtt().srtt_secs().is_some());
}

#[test]
fn timeout_resends_oldest_segment_and_halves_cwnd() {
    let mut h = Harness::new(TcpConfig {
        mss: 100,
        init_cwnd: 5,
        ..TcpConfig::default()
    });
    h.open();

    h.send(&[1u8; 250]);
    let first = h.sent_headers();
    assert_eq!(first.len(), 3);

    h.fire_timer();
    let resent = h.sent_headers();
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].0.seq, first[0].0.seq);
    assert_eq!(resent[0].1, first[0].1);

    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.cwnd(), 3);
    assert_eq!(conn.retransmits(), 1);
    assert!(conn.timer().is_armed(), "timer re-armed after retransmission");

    h.fire_timer();
    assert_eq!(h.server.get(h.id()).expect("conn").cwnd(), 2);
    h.fire_timer();
    h.fire_timer();
    assert_eq!(h.server.get(h.id()).expect("conn").cwnd(), 1, "cwnd never drops below one");
    assert_eq!(h.server.total_retransmits(), 4);
}

#[test]
fn stale_timer_generation_is_ignored() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();
    h.send(b"x");
    h.sent_headers();

    let id = h.id();
    let stale = h.server.get(id).expect("conn").timer().generation().wrapping_sub(1);
    h.server.on_timeout(id, stale, &mut h.sim, &mut h.ip);
    assert!(h.sent_headers().is_empty());
    assert_eq!(h.server.get(id).expect("conn").retransmits(), 0);
}

#[test]
fn ack_beyond_sent_data_is_ignored() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();
    h.send(b"abc");
    h.sent_headers();

    let before = h.server.get(h.id()).expect("conn").snd_una();
    let bogus = h.peer.segment(h.peer.snd_nxt, TcpFlags::ACK, &[]);
    let mut bogus_hdr = TcpHeader::parse(&bogus).expect("valid").0;
    bogus_hdr.ack = before.wrapping_add(1_000);
    let seg = bogus_hdr.emit_segment(CLIENT, SERVER, &[]);
    h.push(&seg);

    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.snd_una(), before);
    assert_eq!(conn.in_flight_len(), 3);
}

#[test]
fn close_defers_fin_until_pending_drains_then_removes_on_fin_ack() {
    let mut h = Harness::new(mss(10));
    h.open();
    let id = h.id();

    h.send(&[9u8; 20]);
    let data = h.sent_headers();
    assert_eq!(data.len(), 1);
    assert!(h.server.close(id, &mut h.sim, &mut h.ip));
    assert!(h.sent_headers().is_empty(), "FIN waits for pending data");
    assert!(h.server.get(id).expect("conn").is_closing());

    // 确认第一段：cwnd 变为 2，剩下的一段和 FIN 一起发出
    h.peer.rcv_nxt = data[0].0.seq.wrapping_add(10);
    let ack = h.peer.ack();
    h.push(&ack);
    let out = h.sent_headers();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].1.len(), 10);
    let fin = &out[1].0;
    assert_eq!(fin.flags, TcpFlags::FIN | TcpFlags::ACK);
    assert_eq!(fin.seq, out[0].0.seq.wrapping_add(10));

    // 数据仍在途时连接保持
    h.peer.rcv_nxt = fin.seq;
    let ack = h.peer.ack();
    h.push(&ack);
    assert!(h.server.get(id).is_some());

    h.peer.rcv_nxt = fin.seq.wrapping_add(1);
    let ack = h.peer.ack();
    h.push(&ack);
    assert!(h.server.get(id).is_none());
    assert_eq!(h.server.stats.closed, 1);
}

#[test]
fn close_on_idle_connection_sends_fin_at_once() {
    let mut h = Harness::new(mss(10));
    h.open();
    let id = h.id();

    assert!(h.server.close(id, &mut h.sim, &mut h.ip));
    let out = h.sent_headers();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.flags, TcpFlags::FIN | TcpFlags::ACK);
    assert!(out[0].1.is_empty());
}

#[test]
fn fin_is_retransmitted_on_timeout() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();
    let id = h.id();
    assert!(h.server.close(id, &mut h.sim, &mut h.ip));
    let fin = h.sent_headers();
    assert_eq!(fin.len(), 1);
    assert!(fin[0].0.flags.contains(TcpFlags::FIN));

    h.fire_timer();
    let again = h.sent_headers();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].0.seq, fin[0].0.seq);
    assert!(again[0].0.flags.contains(TcpFlags::FIN));
}

#[test]
fn data_after_close_is_dropped() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();
    let id = h.id();
    h.server.close(id, &mut h.sim, &mut h.ip);
    h.sent_headers();

    h.send(b"late");
    assert!(h.sent_headers().is_empty());
    assert_eq!(h.server.get(id).expect("conn").pending_len(), 0);
}

#[test]
fn peer_fin_is_reported_as_empty_delivery_and_acknowledged() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();

    let fin = h.peer.fin();
    h.push(&fin);

    assert_eq!(h.received(), vec![Vec::<u8>::new()]);
    let out = h.sent_headers();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.ack, h.peer.snd_nxt);
}

#[test]
fn echo_handler_can_reply_and_close_from_callback() {
    let mut h = Harness::new(TcpConfig::default());
    h.server.on_accept(|s| {
        s.set_handler(|s, data| {
            if data.is_empty() {
                s.close();
            } else {
                s.send(data);
            }
        })
    });
    h.open();

    let seg = h.peer.data(b"hello");
    h.push(&seg);
    let out = h.sent_headers();
    // 回显数据先于纯 ACK
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].1, b"hello");
    assert_eq!(out[1].0.flags, TcpFlags::ACK);

    let fin = h.peer.fin();
    h.push(&fin);
    let out = h.sent_headers();
    assert!(out.iter().any(|(hdr, _)| hdr.flags.contains(TcpFlags::FIN)));
}

#[test]
fn duplicate_syn_replaces_connection() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();

    let mut again = TcpPeer::new(CLIENT, 40_000, SERVER, PORT, 5_000);
    let syn = again.syn();
    h.push(&syn);

    assert_eq!(h.server.len(), 1);
    assert_eq!(h.server.stats.accepted, 2);
    let conn = h.server.get(h.id()).expect("conn");
    assert_eq!(conn.rcv_nxt(), 5_001);
}

#[test]
fn checksum_wrong_port_and_unknown_connection_are_dropped() {
    let mut h = Harness::new(TcpConfig::default());

    let mut syn = h.peer.syn();
    syn[16] ^= 0xff;
    h.push(&syn);
    assert_eq!(h.server.stats.bad_checksum, 1);
    assert!(h.server.is_empty());

    let mut other = TcpPeer::new(CLIENT, 40_001, SERVER, PORT + 1, 1);
    let seg = other.syn();
    h.push(&seg);
    assert_eq!(h.server.stats.wrong_port, 1);

    let stray = h.peer.ack();
    h.push(&stray);
    assert_eq!(h.server.stats.unknown_conn, 1);

    h.push(&[0u8; 5]);
    assert_eq!(h.server.stats.bad_segment, 1);
    assert!(h.ip.sent.is_empty());
}

#[test]
fn ignore_checksum_accepts_corrupted_segment() {
    let mut h = Harness::new(TcpConfig::default());
    h.ip.ignore_checksum = true;
    let mut syn = h.peer.syn();
    syn[16] ^= 0xff;
    h.push(&syn);
    assert_eq!(h.server.stats.accepted, 1);
}

#[test]
fn strict_window_counts_segments_in_flight() {
    let mut loose = Harness::new(TcpConfig {
        mss: 10,
        init_cwnd: 2,
        ..TcpConfig::default()
    });
    loose.open();
    loose.send(&[0u8; 20]);
    loose.send(&[0u8; 20]);
    assert_eq!(loose.sent_headers().len(), 4);

    let mut strict = Harness::new(TcpConfig {
        mss: 10,
        init_cwnd: 2,
        strict_window: true,
        ..TcpConfig::default()
    });
    strict.open();
    strict.send(&[0u8; 20]);
    strict.send(&[0u8; 20]);
    assert_eq!(strict.sent_headers().len(), 2);
    assert_eq!(strict.server.get(strict.id()).expect("conn").pending_len(), 20);
}

#[test]
fn shutdown_tears_down_all_connections() {
    let mut h = Harness::new(TcpConfig::default());
    h.open();
    h.send(b"abc");
    h.server.shutdown();
    assert!(h.server.is_empty());
}

#[test]
#[should_panic(expected = "no data handler")]
fn delivery_without_handler_fails_loudly() {
    let mut h = Harness::new(TcpConfig::default());
    h.server.on_accept(|_s| {});
    h.open();
    let seg = h.peer.data(b"x");
    h.push(&seg);
}
