//! 回显实验
//!
//! client --- router --- server：client 由脚本驱动（`TcpPeer`），
//! server 的监听端点把收到的数据原样发回，收到 FIN 后关闭。

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slipnet::config::TopologySpec;
use slipnet::ip::PROTO_TCP;
use slipnet::net::{NetWorld, Network, NodeId};
use slipnet::sim::{SimTime, Simulator};
use slipnet::tcp::{Socket, TcpConfig, TcpFlags, TcpPeer, MAX_MSS};
use slipnet::topo::chain::{build_chain, ChainOpts};
use std::path::PathBuf;
use std::process;

#[derive(Debug, Parser)]
#[command(name = "echo-sim", about = "串口链路上的 TCP 回显仿真：client -> router -> server")]
struct Args {
    /// 要回显的消息
    #[arg(long, default_value = "hello")]
    message: String,

    /// 消息重复次数（用来制造多个数据段）
    #[arg(long, default_value_t = 1)]
    repeat: usize,

    /// 服务器 MSS（字节），上限为一个数据报能装下的载荷
    #[arg(long, default_value_t = 1460, value_parser = clap::value_parser!(u16).range(1..=MAX_MSS as i64))]
    mss: u16,

    /// 单向线路传播时延（微秒）
    #[arg(long, default_value_t = 1000)]
    latency_us: u64,

    /// 线路速率（bit/s）
    #[arg(long, default_value_t = 1_000_000)]
    bps: u64,

    /// 握手完成后，在 server -> router 线路上丢弃的块数
    #[arg(long, default_value_t = 0)]
    loss: u32,

    /// 仿真运行到多少毫秒
    #[arg(long, default_value_t = 10_000)]
    until_ms: u64,

    /// 随机种子（服务器 ISN 与客户端 ISN）
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// 从 JSON 读取拓扑，替代内置的 chain
    #[arg(long)]
    topology: Option<PathBuf>,

    #[arg(long, default_value = "client")]
    client: String,

    #[arg(long, default_value = "server")]
    server: String,
}

struct Setup {
    net: Network,
    client: NodeId,
    server: NodeId,
    port: u16,
}

fn setup(args: &Args) -> Result<Setup, String> {
    let Some(path) = &args.topology else {
        let opts = ChainOpts {
            latency: SimTime::from_micros(args.latency_us),
            bits_per_sec: args.bps,
            tcp: TcpConfig {
                mss: usize::from(args.mss),
                isn_seed: Some(args.seed),
                ..TcpConfig::default()
            },
            ..ChainOpts::default()
        };
        let chain = build_chain(&opts);
        return Ok(Setup {
            net: chain.net,
            client: chain.client,
            server: chain.server,
            port: opts.port,
        });
    };

    let spec = TopologySpec::from_path(path).map_err(|e| e.to_string())?;
    let net = spec.build().map_err(|e| e.to_string())?;
    let find = |name: &str| {
        net.node_id(name)
            .ok_or_else(|| format!("topology has no node named {name:?}"))
    };
    let client = find(&args.client)?;
    let server = find(&args.server)?;
    let port = net
        .stack(server)
        .tcp
        .as_ref()
        .map(|t| t.port())
        .ok_or_else(|| format!("node {:?} is not listening", args.server))?;
    Ok(Setup {
        net,
        client,
        server,
        port,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let Setup {
        net,
        client,
        server,
        port,
    } = match setup(&args) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::new(net);

    if let Some(tcp) = world.net.stack_mut(server).tcp.as_mut() {
        tcp.on_accept(move |s| s.set_handler(echo));
    }

    let client_addr = world
        .net
        .stack(client)
        .ip
        .local_addr()
        .unwrap_or_else(|| world.net.addr(client));
    let server_addr = world
        .net
        .stack(server)
        .ip
        .local_addr()
        .unwrap_or_else(|| world.net.addr(server));

    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let mut peer = TcpPeer::new(client_addr, 40_000, server_addr, port, rng.r#gen());

    let message = args.message.repeat(args.repeat.max(1)).into_bytes();
    let mut echoed = Vec::new();
    let mut data_sent = false;
    let mut fin_sent = false;

    let syn = peer.syn();
    world.net.send_raw(client, &syn, server_addr, PROTO_TCP, &mut sim);

    let until = SimTime::from_millis(args.until_ms);
    let step = SimTime::from_micros(100);
    while sim.now() < until {
        let next = sim.now().saturating_add(step).min(until);
        sim.run_until(next, &mut world);

        for d in world.net.stack_mut(client).take_inbox() {
            if d.protocol != PROTO_TCP {
                continue;
            }
            let Ok(rx) = peer.receive(&d.payload) else {
                continue;
            };
            if rx.header.flags.contains(TcpFlags::SYN) {
                // 第三次握手与第一段数据一起发出
                world.net.send_raw(client, &peer.ack(), server_addr, PROTO_TCP, &mut sim);
                if !data_sent {
                    data_sent = true;
                    if args.loss > 0 {
                        world.net.set_line_loss(server, next_hop_of(&world.net, server), args.loss);
                    }
                    for chunk in message.chunks(usize::from(args.mss)) {
                        let seg = peer.data(chunk);
                        world.net.send_raw(client, &seg, server_addr, PROTO_TCP, &mut sim);
                    }
                }
                continue;
            }
            if rx.in_order {
                echoed.extend_from_slice(&rx.payload);
            }
            world.net.send_raw(client, &peer.ack(), server_addr, PROTO_TCP, &mut sim);
        }

        if data_sent && !fin_sent && echoed.len() >= message.len() {
            fin_sent = true;
            let fin = peer.fin();
            world.net.send_raw(client, &fin, server_addr, PROTO_TCP, &mut sim);
        }

        let server_idle = world
            .net
            .stack(server)
            .tcp
            .as_ref()
            .is_none_or(|t| t.is_empty());
        if peer.remote_closed && server_idle {
            break;
        }
    }

    let retransmits = world
        .net
        .stack(server)
        .tcp
        .as_ref()
        .map_or(0, |t| t.total_retransmits());
    let stats = &world.net.stats;
    println!(
        "done @ {}\n  echo: sent_bytes={} echoed_bytes={} match={} closed={} retransmits={}\n  net: chunks_sent={} chunks_delivered={} chunks_dropped={}",
        sim.now(),
        message.len(),
        echoed.len(),
        echoed == message,
        peer.remote_closed,
        retransmits,
        stats.chunks_sent,
        stats.chunks_delivered,
        stats.chunks_dropped,
    );
}

/// 原样回显；空载荷表示对端关闭，随之关闭本端。
fn echo(s: &mut Socket<'_>, data: &[u8]) {
    if data.is_empty() {
        s.close();
    } else {
        s.send(data);
    }
}

/// server 唯一的出口线路的对端。
fn next_hop_of(net: &Network, node: NodeId) -> NodeId {
    (0..net.node_count())
        .map(NodeId)
        .find(|&n| net.line_between(node, n).is_some())
        .unwrap_or(node)
}
