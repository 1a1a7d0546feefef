//! Lumping demo on a family of symmetric Markov chains.
//!
//! The model has one initial state branching uniformly into `n` identical
//! middle states; each middle state reaches the absorbing goal with
//! probability `p` and falls back to the initial state otherwise. All middle
//! states are bisimilar, so the quotient has 3 states for every `n`.
//!
//! Run with:
//! ```bash
//! cargo run --release --example lumping -- [n]
//! ```

use std::time::Instant;

use clap::Parser;
use lump_rs::bitset::BitSet;
use lump_rs::graph::{GraphBuilder, Semantics};
use lump_rs::graph_dd::GraphDdBuilder;
use lump_rs::mtbdd::Mtdd;
use lump_rs::objective::Objective;
use lump_rs::props::PropKey;
use lump_rs::solver::Registry;

#[derive(Debug, Parser)]
#[command(author, version, about = "State-space reduction demo")]
struct Cli {
    /// Number of symmetric middle states
    #[arg(default_value = "64")]
    n: usize,

    /// Success probability of each middle state
    #[arg(long, default_value = "0.3")]
    p: f64,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    simplelog::SimpleLogger::init(simplelog::LevelFilter::Info, simplelog::Config::default())?;

    let cli = Cli::parse();
    let n = cli.n;
    let goal = n + 1;

    println!("=== Bisimulation Lumping Demo ===\n");
    println!("Model: 1 initial + {} middle states + 1 goal\n", n);

    // Explicit representation.
    let mut builder = GraphBuilder::new(Semantics::Dtmc);
    for middle in 1..=n {
        builder
            .add_edge(0, middle, 1.0 / n as f64)
            .add_edge(middle, goal, cli.p)
            .add_edge(middle, 0, 1.0 - cli.p);
    }
    builder.add_edge(goal, goal, 1.0);
    let graph = builder.build();

    let target: BitSet = [goal].into_iter().collect();
    let start = Instant::now();
    let prepared = Registry::new().prepare(&graph, Objective::unbounded_reachability(target))?;
    let elapsed = start.elapsed();

    println!(
        "{:>10} {:>10} {:>10} {:>12}",
        "Engine", "States", "Blocks", "Time (ms)"
    );
    println!("{}", "-".repeat(46));
    println!(
        "{:>10} {:>10} {:>10} {:>12.2}",
        "explicit",
        graph.num_nodes(),
        prepared.quotient.graph.num_nodes(),
        elapsed.as_secs_f64() * 1000.0
    );

    // Symbolic representation of the same model.
    let state_bits = usize::BITS as usize - (n + 1).leading_zeros() as usize;
    let dd = Mtdd::default();
    let mut builder = GraphDdBuilder::new(&dd, Semantics::Dtmc, state_bits, 0);
    for middle in 1..=n {
        builder
            .add_edge(0, 0, middle, 1.0 / n as f64)
            .add_edge(middle, 0, goal, cli.p)
            .add_edge(middle, 0, 0, 1.0 - cli.p);
    }
    builder.add_edge(goal, 0, goal, 1.0);
    builder.set_prop(PropKey::label("goal"), &[goal]);
    let graph_dd = builder.build();

    let start = Instant::now();
    let quotient = Registry::new().prepare_dd(&graph_dd, &[PropKey::label("goal")])?;
    let elapsed = start.elapsed();

    println!(
        "{:>10} {:>10} {:>10} {:>12.2}",
        "symbolic",
        graph_dd.num_states(),
        quotient.num_blocks(),
        elapsed.as_secs_f64() * 1000.0
    );
    println!("\nDiagram nodes in the manager: {}", dd.num_nodes());

    Ok(())
}
