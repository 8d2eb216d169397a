use std::net::Ipv4Addr;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "netwarden",
    about = "LAN device blocker using ARP cache poisoning",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List available network interfaces
    Interfaces,

    /// Sweep the local subnet for active devices
    Scan {
        /// Network interface to sweep on
        #[arg(short, long)]
        interface: String,

        /// Gateway IP (detected from the routing table if omitted)
        #[arg(short, long)]
        gateway: Option<Ipv4Addr>,

        /// Resolve hostnames via reverse DNS after the sweep
        #[arg(short, long)]
        resolve: bool,
    },

    /// Block devices from reaching the gateway until interrupted
    Block {
        /// Network interface to use
        #[arg(short, long)]
        interface: String,

        /// Gateway IP (detected from the routing table if omitted)
        #[arg(short, long)]
        gateway: Option<Ipv4Addr>,

        /// Target IP addresses to block (repeatable)
        #[arg(short, long, required = true)]
        target: Vec<Ipv4Addr>,
    },
}
