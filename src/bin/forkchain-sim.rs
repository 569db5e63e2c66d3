#![forbid(unsafe_code)]
//! Drives the consensus simulation or a scripted fork scenario from the CLI.

use clap::{Parser, Subcommand};
use colored::*;
use forkchain::blockchain::{Block, Blockchain};
use forkchain::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use forkchain::crypto::{address_to_hex, KeyPair};
use forkchain::simulation::Simulation;
use forkchain::transaction::{Amount, Transaction};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a consensus simulation over a random follow graph
    Consensus {
        /// Overrides simulation.seed
        #[arg(long)]
        seed: Option<u64>,
        /// Overrides simulation.num_rounds
        #[arg(long)]
        rounds: Option<u32>,
        /// Overrides simulation.num_nodes
        #[arg(long)]
        nodes: Option<usize>,
    },
    /// Builds a short chain, then a competing fork, and prints the best branch
    Chain {
        /// Blocks to build on the main branch
        #[arg(long, default_value_t = 5)]
        length: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_max_level(config.logging.level.parse::<tracing::Level>()?)
        .init();

    match cli.command {
        Commands::Consensus {
            seed,
            rounds,
            nodes,
        } => {
            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }
            if let Some(rounds) = rounds {
                config.simulation.num_rounds = rounds;
            }
            if let Some(nodes) = nodes {
                config.simulation.num_nodes = nodes;
            }
            config.validate()?;
            run_consensus(&config)?;
        }
        Commands::Chain { length } => run_chain(&config, length)?,
    }

    Ok(())
}

fn run_consensus(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "🌐 Running consensus simulation...".bright_cyan());
    let report = Simulation::new(&config.simulation)?.run();

    println!(
        "   Compliant nodes: {}   Malicious nodes: {}",
        report.decisions.len().to_string().bright_green(),
        report.malicious.len().to_string().bright_red()
    );
    for (id, decided) in report.decisions.iter().take(10) {
        println!("   node {:>4} decided {} transactions", id, decided.len());
    }
    if report.decisions.len() > 10 {
        println!("   ...");
    }

    let verdict = if report.unanimous() {
        "unanimous".bright_green()
    } else {
        "split".yellow()
    };
    println!(
        "✅ Agreed on {} transactions ({})",
        report.agreed.len().to_string().bold(),
        verdict
    );
    Ok(())
}

fn run_chain(config: &Config, length: u32) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "⛓️  Building a forked chain...".bright_cyan());

    let alice = KeyPair::generate()?;
    let bob = KeyPair::generate()?;
    let genesis = Block::genesis(alice.address(), config.chain.coinbase_amount());
    let genesis_hash = genesis.hash();
    let mut chain = Blockchain::with_config(genesis.clone(), config.chain.clone());

    let mut payment = Transaction::new();
    payment.add_input(genesis.coinbase.hash(), 0);
    payment.add_output(Amount::from_num(10), bob.address());
    payment.add_output(config.chain.coinbase_amount() - Amount::from_num(11), alice.address());
    payment.sign_input_with(0, &alice)?;
    chain.add_transaction(payment);

    for _ in 0..length {
        if chain.create_block(bob.address()).is_none() {
            println!("{}", "   block creation failed".red());
        }
    }

    let fork = Block::new(Some(genesis_hash), alice.address(), config.chain.coinbase_amount());
    let fork_hash = fork.hash_str();
    let accepted = chain.add_block(fork);
    println!(
        "   Fork {} on genesis: {}",
        &fork_hash[..16],
        if accepted {
            "accepted".green()
        } else {
            "rejected".red()
        }
    );

    let best = chain.max_height_node();
    println!(
        "✅ Best block {} at height {} ({} retained nodes)",
        &best.block.hash_str()[..16],
        best.height.to_string().bold(),
        chain.node_count()
    );
    for (name, key) in [("alice", &alice), ("bob", &bob)] {
        println!(
            "   {} {}… balance {}",
            name,
            &address_to_hex(&key.address())[..12],
            chain.max_height_utxo_pool().get_balance(&key.address())
        );
    }
    Ok(())
}
