// wiz-echo: echo server on a simulated offload chip
// Peers connect to the listening slots, send a line per round and get it
// echoed back; then they hang up and the slots are reclaimed
use std::net::Ipv4Addr;
use std::process;
use std::rc::Rc;

use clap::Parser;
use log::{debug, info, warn};

use wiz_ng::{Chip, ManualClock, SocketStatus, StackConfig, TransportAdapter, TransportListener};
use wiz_sim::{RecordingBus, SimChip};

#[derive(Parser)]
#[command(name = "wiz-echo")]
#[command(about = "Echo server over the hardware socket layer (simulated chip)", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Listening port
    #[arg(short, long, default_value_t = 7)]
    port: u16,

    /// Server slots (defaults to WIZ_SERVER_SLOTS)
    #[arg(short, long)]
    slots: Option<usize>,

    /// Simulated peers that connect
    #[arg(long, default_value_t = 3)]
    peers: usize,

    /// Lines each peer sends
    #[arg(short, long, default_value_t = 5)]
    rounds: usize,
}

#[derive(Default)]
struct Summary {
    accepted: usize,
    echoed: usize,
    mismatched: usize,
    reclaimed: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = StackConfig::from_env();
    if let Some(slots) = cli.slots {
        config.server_slots = slots;
    }
    let channels = config.channels;

    let chip = Chip::with_clock(SimChip::new(channels), config, Rc::new(ManualClock::new()));
    chip.driver().borrow_mut().set_echo(false);

    let bus = RecordingBus::new();
    let trace = bus.trace();
    if let Err(e) = chip.start(TransportAdapter::new(bus)) {
        eprintln!("chip start failed: {}", e);
        process::exit(1);
    }

    let mut server = chip.tcp_server();
    if !server.establish(cli.port) {
        warn!("not every slot is listening on port {}", cli.port);
    }
    println!(
        "wiz-echo listening on port {} ({} slots, {} channels)",
        cli.port,
        server.slot_count(),
        channels
    );

    let mut summary = Summary::default();

    // Peers connect to the listening slots, lowest first
    let mut peers = Vec::new();
    for index in 0..server.slot_count() {
        if peers.len() == cli.peers {
            break;
        }
        let Some(channel) = server.channel(index) else {
            continue;
        };
        let address = Ipv4Addr::new(10, 0, 0, 100 + peers.len() as u8);
        if chip.driver().borrow_mut().accept_peer(channel, address, 40000 + index as u16) {
            peers.push((index, channel, address));
        }
    }
    if peers.len() < cli.peers {
        warn!("only {} of {} peers found a listening slot", peers.len(), cli.peers);
    }

    while let Ok(Some(index)) = server.accept() {
        debug!("slot {} accepted", index);
        summary.accepted += 1;
    }

    let mut buf = [0u8; 256];
    for round in 0..cli.rounds {
        for &(index, channel, address) in &peers {
            let line = format!("round {} from {}\n", round, address);
            chip.driver().borrow_mut().peer_send(channel, line.as_bytes());

            let pending = server.available(index);
            if pending <= 0 {
                warn!("slot {}: nothing to echo ({})", index, pending);
                continue;
            }
            let read = server.read(index, &mut buf);
            let written = server.write(index, &buf[..read]);
            summary.echoed += written;

            let echoed = chip.driver().borrow_mut().peer_output(channel);
            if echoed != line.as_bytes() {
                summary.mismatched += 1;
            }
        }
    }

    // Peers hang up; each slot drains, disconnects and goes back to LISTEN
    for &(index, channel, _) in &peers {
        chip.driver().borrow_mut().peer_close(channel);
        let drained = server.available(index);
        debug!("slot {} after peer close: {}", index, drained);
        // LAST_ACK reads back as CLOSED and frees the slot
        server.available(index);
        server.is_available(index);
        if server.status(index) == Some(SocketStatus::Listen) {
            summary.reclaimed += 1;
        }
    }

    info!("bus frames: {}", trace.frames());
    println!("accepted:   {}", summary.accepted);
    println!("echoed:     {} bytes", summary.echoed);
    println!("mismatched: {}", summary.mismatched);
    println!("reclaimed:  {}/{}", summary.reclaimed, peers.len());
    println!("bus frames: {}", trace.frames());

    if summary.mismatched > 0 {
        process::exit(1);
    }
}
