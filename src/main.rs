use std::cell::Cell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn, Level};

use simnet::network::{Endpoint, Network};
use simnet::routing::{CostBasedRouting, PoissonCost};
use simnet::socket::PacketSink;
use simnet::telemetry::init_tracing;
use simnet::{
    AdminState, InterfaceIndex, NodeId, SimError, Simulation, SimulationConfig, UdpSocket,
    VirtualTime,
};

/// Two nodes joined by parallel links, cost-based routing on the sender,
/// and an interface outage halfway through.
#[derive(Parser)]
#[command(name = "simnet", version)]
struct Args {
    /// JSON run configuration. Defaults apply to every missing field.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured stop time, in milliseconds.
    #[arg(long)]
    stop_time_ms: Option<u64>,

    /// The log level for traces. opts: (error, warn, info, debug, trace)
    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,
}

const SENDER_ADDRS: [Ipv4Addr; 2] = [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 1, 1)];
const SINK_ADDRS: [Ipv4Addr; 2] = [Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 1, 2)];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level);

    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(ms) = args.stop_time_ms {
        config.stop_time = VirtualTime::checked_from_millis(ms)
            .with_context(|| format!("--stop-time-ms {ms} does not fit in virtual time"))?;
    }
    config.validate()?;

    println!("═══════════════════════════════════════════════════════");
    println!("  simnet: parallel links with cost-based routing");
    println!("═══════════════════════════════════════════════════════");
    println!();
    println!("  seed={} stop={} update every {}", config.seed, config.stop_time, config.route_update_interval);
    println!(
        "  link delay={} jitter={} loss={}",
        config.link.delay, config.link.jitter, config.link.drop_probability
    );
    println!();

    run(&config)
}

fn run(config: &SimulationConfig) -> anyhow::Result<()> {
    let mut sim = Simulation::new();
    let net = Network::new(config.seed);

    // ── Topology ──────────────────────────────────────────────
    let sender = net.add_node();
    let sink_node = net.add_node();
    let mut links = Vec::new();
    for (s, d) in SENDER_ADDRS.into_iter().zip(SINK_ADDRS) {
        let si = net.add_interface(sender, s)?;
        let di = net.add_interface(sink_node, d)?;
        links.push(net.connect(
            Endpoint { node: sender, interface: si },
            Endpoint { node: sink_node, interface: di },
            config.link,
        )?);
    }

    // ── Routing ───────────────────────────────────────────────
    let destination = SINK_ADDRS[0];
    let routing = CostBasedRouting::new(
        config.route_update_interval,
        PoissonCost::new(1.0, 2.0, config.seed)?,
    );
    for (i, next_hop) in SINK_ADDRS.into_iter().enumerate() {
        routing.add_candidate(destination, next_hop, InterfaceIndex::new(i as u32));
    }
    net.attach_routing(&mut sim, sender, routing.clone())?;
    print_table(&net, sender, sim.now())?;

    // ── Applications ──────────────────────────────────────────
    let sink = PacketSink::install(&net, sink_node, config.traffic.port)?;
    let socket = UdpSocket::new(&net, sender)?;
    socket.connect(SocketAddrV4::new(destination, config.traffic.port))?;
    let failures = Rc::new(Cell::new(0u64));
    let counter = failures.clone();
    socket.set_error_callback(move |sim: &mut Simulation, err: SimError| {
        warn!(at = %sim.now(), %err, "send failed");
        counter.set(counter.get() + 1);
        Ok(())
    });
    socket.start_sending(&mut sim, config.traffic.schedule())?;

    // ── Outage ────────────────────────────────────────────────
    if let Some(outage) = config.outage {
        schedule_state(&mut sim, &net, sender, outage.down_at, AdminState::Down)?;
        if let Some(up_at) = outage.up_at {
            schedule_state(&mut sim, &net, sender, up_at, AdminState::Up)?;
        }
    }

    // ── Run ───────────────────────────────────────────────────
    let executed = sim.run(Some(config.stop_time))?;
    info!(executed, now = %sim.now(), "run finished");

    println!();
    print_table(&net, sender, sim.now())?;
    println!();
    println!("  Events executed:  {}", executed);
    println!("  Route updates:    {}", routing.updates());
    println!("  Network:          {}", net.stats());
    for id in links {
        if let Some(link) = net.link(id) {
            println!(
                "  Link {}:          delivered={} dropped={}",
                id,
                link.delivered_count(),
                link.dropped_count()
            );
        }
    }
    let sent = socket.stats();
    println!("  Sender:           sent={} errors={}", sent.sent, failures.get());
    match sink.mean_latency() {
        Some(latency) => println!("  Sink:             received={} mean latency={}", sink.count(), latency),
        None => println!("  Sink:             received={}", sink.count()),
    }
    Ok(())
}

/// Toggle the sender's first interface at `at` and print its table.
fn schedule_state(
    sim: &mut Simulation,
    net: &Network,
    node: NodeId,
    at: VirtualTime,
    state: AdminState,
) -> anyhow::Result<()> {
    let net = net.clone();
    sim.schedule_at(at, move |sim: &mut Simulation| {
        net.set_interface_state(node, InterfaceIndex::new(0), state)?;
        println!();
        println!("  if0 on {} set {:?}", node, state);
        print_table(&net, node, sim.now()).map_err(|e| SimError::Application(e.to_string()))
    })?;
    Ok(())
}

fn print_table(net: &Network, node: NodeId, now: VirtualTime) -> anyhow::Result<()> {
    println!("  Routing table of {} at {}:", node, now);
    for line in net.routing_table(node)?.to_string().lines() {
        println!("    {}", line);
    }
    Ok(())
}
