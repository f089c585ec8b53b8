use crate::ip::checksum;
use crate::ip::{Ipv4Header, PROTO_TCP, PROTO_ICMP};
use crate::tcp::{verify_segment, TcpFlags, TcpHeader};
use std::net::Ipv4Addr;

#[test]
fn rfc1071_example_sum() {
    // RFC 1071 §3 的例子：0001 f203 f4f5 f6f7 -> 和为 ddf2
    let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
    assert_eq!(checksum::data(&bytes), 0xddf2);
    assert_eq!(checksum::internet(&bytes), !0xddf2);
}

#[test]
fn odd_length_pads_with_zero() {
    assert_eq!(checksum::data(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
}

#[test]
fn emitted_ipv4_header_verifies_and_detects_corruption() {
    let hdr = Ipv4Header::new(
        Ipv4Addr::new(192, 0, 2, 1),
        Ipv4Addr::new(198, 51, 100, 7),
        PROTO_ICMP,
        64,
        12,
    );
    let mut bytes = hdr.emit();
    assert!(checksum::verify(&bytes));

    bytes[8] ^= 0x01;
    assert!(!checksum::verify(&bytes));
}

#[test]
fn tcp_checksum_covers_pseudo_header() {
    let src = Ipv4Addr::new(10, 0, 1, 2);
    let dst = Ipv4Addr::new(10, 0, 2, 2);
    let seg = TcpHeader::new(40_000, 7, 1, 0, TcpFlags::SYN).emit_segment(src, dst, b"odd");

    assert!(verify_segment(&seg, src, dst));
    assert!(!verify_segment(&seg, src, Ipv4Addr::new(10, 0, 2, 3)));

    let mut bad = seg.clone();
    let last = bad.len() - 1;
    bad[last] ^= 0xff;
    assert!(!verify_segment(&bad, src, dst));
}

#[test]
fn pseudo_header_matches_manual_layout() {
    let src = Ipv4Addr::new(1, 2, 3, 4);
    let dst = Ipv4Addr::new(5, 6, 7, 8);
    let manual = [1, 2, 3, 4, 5, 6, 7, 8, 0, PROTO_TCP, 0x00, 0x28];
    assert_eq!(
        checksum::pseudo_header(src, dst, PROTO_TCP, 40),
        checksum::data(&manual)
    );
}
