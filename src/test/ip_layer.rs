use crate::error::WireError;
use crate::ip::{icmp, Cidr, Ipv4Header, IpLayer, Route, MAX_TOTAL_LEN, PROTO_ICMP, PROTO_TCP};
use crate::link::{FrameDecoder, LinkLayer, SerialLine};
use std::net::Ipv4Addr;

use super::support::CaptureLine;

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

struct Router {
    ip: IpLayer,
    to_client: CaptureLine,
    to_server: CaptureLine,
}

fn router() -> Router {
    let to_client = CaptureLine::default();
    let to_server = CaptureLine::default();
    let link = LinkLayer::new([
        (CLIENT, Box::new(to_client.clone()) as Box<dyn SerialLine>),
        (SERVER, Box::new(to_server.clone()) as Box<dyn SerialLine>),
    ]);
    let mut ip = IpLayer::new(link, None);
    ip.set_forwarding_table([
        Route {
            cidr: Cidr::new(CLIENT, 24),
            next_hop: CLIENT,
        },
        Route {
            cidr: Cidr::new(SERVER, 24),
            next_hop: SERVER,
        },
    ]);
    Router {
        ip,
        to_client,
        to_server,
    }
}

fn frames(line: &CaptureLine) -> Vec<Vec<u8>> {
    let mut d = FrameDecoder::new();
    let mut out = Vec::new();
    for chunk in line.take() {
        d.feed(&chunk, |f| out.push(f));
    }
    out
}

fn datagram(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ttl: u8, payload: &[u8]) -> Vec<u8> {
    Ipv4Header::new(src, dst, protocol, ttl, payload.len()).with_payload(payload)
}

#[test]
fn router_forwards_with_decremented_ttl() {
    let mut r = router();
    let mut original = Ipv4Header::new(CLIENT, SERVER, PROTO_TCP, 2, 4);
    original.ident = 0xbeef;
    original.dscp = 10;
    let bytes = original.with_payload(b"data");

    assert_eq!(r.ip.on_datagram(&bytes), None);

    let out = frames(&r.to_server);
    assert_eq!(out.len(), 1);
    assert!(frames(&r.to_client).is_empty());

    let (hdr, payload) = Ipv4Header::parse(&out[0]).expect("valid header");
    assert_eq!(hdr.ttl, 1);
    assert_eq!(hdr.ident, 0xbeef);
    assert_eq!(hdr.dscp, 10);
    assert_eq!(hdr.src, CLIENT);
    assert_eq!(hdr.dst, SERVER);
    assert_eq!(payload, b"data");
    assert!(crate::ip::checksum::verify(&out[0][..20]));
    assert_eq!(r.ip.stats.forwarded, 1);
}

#[test]
fn ttl_one_yields_exactly_one_time_exceeded_notice() {
    let mut r = router();
    let bytes = datagram(CLIENT, SERVER, PROTO_TCP, 1, &[0xaa; 40]);

    assert_eq!(r.ip.on_datagram(&bytes), None);

    assert!(frames(&r.to_server).is_empty());
    let back = frames(&r.to_client);
    assert_eq!(back.len(), 1);

    let (hdr, msg) = Ipv4Header::parse(&back[0]).expect("valid header");
    assert_eq!(hdr.protocol, PROTO_ICMP);
    assert_eq!(hdr.dst, CLIENT);
    assert_eq!(hdr.src, Ipv4Addr::UNSPECIFIED);
    assert_eq!(
        icmp::kind(msg),
        Some((icmp::TYPE_TIME_EXCEEDED, icmp::CODE_TTL_EXCEEDED))
    );
    assert_eq!(&msg[8..], &bytes[..icmp::QUOTED_LEN]);
    assert!(crate::ip::checksum::verify(msg));
    assert_eq!(r.ip.stats.ttl_expired, 1);
}

#[test]
fn expiring_time_exceeded_notice_is_not_answered() {
    let mut r = router();
    let inner = datagram(SERVER, CLIENT, PROTO_TCP, 1, b"x");
    let notice = icmp::time_exceeded(&inner);
    let bytes = datagram(Ipv4Addr::UNSPECIFIED, SERVER, PROTO_ICMP, 1, &notice);
    // 回送地址 0.0.0.0 没有路由，但根本不应该走到查表这一步
    r.ip.on_datagram(&bytes);

    assert!(frames(&r.to_client).is_empty());
    assert!(frames(&r.to_server).is_empty());
    assert_eq!(r.ip.stats.no_route, 0);
}

#[test]
fn host_delivers_local_datagrams() {
    let line = CaptureLine::default();
    let link = LinkLayer::new([(
        Ipv4Addr::new(10, 0, 0, 1),
        Box::new(line.clone()) as Box<dyn SerialLine>,
    )]);
    let mut ip = IpLayer::new(link, Some(SERVER));

    let d = ip
        .on_datagram(&datagram(CLIENT, SERVER, PROTO_TCP, 5, b"seg"))
        .expect("delivered locally");
    assert_eq!(d.src, CLIENT);
    assert_eq!(d.protocol, PROTO_TCP);
    assert_eq!(d.payload, b"seg");
    assert!(line.take().is_empty());
}

#[test]
fn trailing_link_bytes_are_trimmed_by_total_length() {
    let mut ip = IpLayer::new(LinkLayer::new(Vec::<(Ipv4Addr, Box<dyn SerialLine>)>::new()), Some(SERVER));
    let mut bytes = datagram(CLIENT, SERVER, PROTO_TCP, 5, b"abc");
    bytes.extend_from_slice(&[0, 0, 0]);
    let d = ip.on_datagram(&bytes).expect("delivered");
    assert_eq!(d.payload, b"abc");
}

#[test]
fn datagram_shorter_than_total_length_is_rejected() {
    let bytes = datagram(CLIENT, SERVER, PROTO_TCP, 8, &[0x11; 80]);
    let cut = &bytes[..40];
    assert_eq!(
        Ipv4Header::parse(cut).map(|(h, _)| h),
        Err(WireError::Truncated {
            what: "IPv4 datagram",
            needed: 100,
            got: 40,
        })
    );

    // 路由器不能把截断的数据报补成合法头部再转发
    let mut r = router();
    assert_eq!(r.ip.on_datagram(cut), None);
    assert_eq!(r.ip.stats.bad_header, 1);
    assert_eq!(r.ip.stats.forwarded, 0);
    assert!(frames(&r.to_server).is_empty());
    assert!(frames(&r.to_client).is_empty());
}

#[test]
fn total_length_below_header_is_rejected() {
    let mut bytes = datagram(CLIENT, SERVER, PROTO_TCP, 8, b"abcd");
    bytes[2] = 0;
    bytes[3] = 12;
    assert!(matches!(
        Ipv4Header::parse(&bytes),
        Err(WireError::BadTotalLen(12))
    ));

    let mut r = router();
    r.ip.set_ignore_checksum(true);
    r.ip.on_datagram(&bytes);
    assert_eq!(r.ip.stats.bad_header, 1);
    assert!(frames(&r.to_server).is_empty());
}

#[test]
fn bad_header_checksum_is_dropped_unless_ignored() {
    let mut r = router();
    let mut bytes = datagram(CLIENT, SERVER, PROTO_TCP, 8, b"x");
    bytes[10] ^= 0x55;

    r.ip.on_datagram(&bytes);
    assert!(frames(&r.to_server).is_empty());
    assert_eq!(r.ip.stats.bad_checksum, 1);

    r.ip.set_ignore_checksum(true);
    r.ip.on_datagram(&bytes);
    assert_eq!(frames(&r.to_server).len(), 1);
}

#[test]
fn garbage_and_unroutable_datagrams_are_counted() {
    let mut r = router();
    r.ip.on_datagram(&[0x45, 0x00, 0x00]);
    assert_eq!(r.ip.stats.bad_header, 1);

    let mut v6 = datagram(CLIENT, SERVER, PROTO_TCP, 8, b"x");
    v6[0] = 0x65;
    r.ip.on_datagram(&v6);
    assert_eq!(r.ip.stats.bad_header, 2);

    r.ip.on_datagram(&datagram(CLIENT, Ipv4Addr::new(192, 0, 2, 1), PROTO_TCP, 8, b"x"));
    assert_eq!(r.ip.stats.no_route, 1);
    assert!(frames(&r.to_client).is_empty());
    assert!(frames(&r.to_server).is_empty());
}

#[test]
fn host_send_uses_local_source_and_route() {
    let line = CaptureLine::default();
    let link = LinkLayer::new([(
        Ipv4Addr::new(10, 0, 0, 1),
        Box::new(line.clone()) as Box<dyn SerialLine>,
    )]);
    let mut ip = IpLayer::new(link, Some(CLIENT));
    ip.set_forwarding_table([Route {
        cidr: Cidr::new(Ipv4Addr::UNSPECIFIED, 0),
        next_hop: Ipv4Addr::new(10, 0, 0, 1),
    }]);

    ip.send(b"hi", SERVER, PROTO_TCP);
    let out = frames(&line);
    assert_eq!(out.len(), 1);
    let (hdr, payload) = Ipv4Header::parse(&out[0]).expect("valid header");
    assert_eq!(hdr.src, CLIENT);
    assert_eq!(hdr.dst, SERVER);
    assert_eq!(hdr.ttl, crate::ip::DEFAULT_TTL);
    assert_eq!(payload, b"hi");
    assert_eq!(ip.stats.sent, 1);
}

#[test]
fn oversize_segment_is_dropped_not_truncated() {
    let line = CaptureLine::default();
    let link = LinkLayer::new([(
        Ipv4Addr::new(10, 0, 0, 1),
        Box::new(line.clone()) as Box<dyn SerialLine>,
    )]);
    let mut ip = IpLayer::new(link, Some(CLIENT));
    ip.set_forwarding_table([Route {
        cidr: Cidr::new(Ipv4Addr::UNSPECIFIED, 0),
        next_hop: Ipv4Addr::new(10, 0, 0, 1),
    }]);

    ip.send(&vec![0x5a; 70_000], SERVER, PROTO_TCP);
    assert!(line.take().is_empty());
    assert_eq!(ip.stats.oversize, 1);
    assert_eq!(ip.stats.sent, 0);

    // 正好填满 total length 的段照常发出
    let largest = vec![0xa5; MAX_TOTAL_LEN - 20];
    ip.send(&largest, SERVER, PROTO_TCP);
    let out = frames(&line);
    assert_eq!(out.len(), 1);
    let (hdr, payload) = Ipv4Header::parse(&out[0]).expect("valid header");
    assert_eq!(usize::from(hdr.total_len), MAX_TOTAL_LEN);
    assert_eq!(payload, &largest[..]);
    assert_eq!(ip.stats.oversize, 1);
    assert_eq!(ip.stats.sent, 1);
}
