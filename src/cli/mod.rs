pub mod args;

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use clap::Parser;

use netwarden::config::EngineConfig;
use netwarden::core::engine::ArpEngine;
use netwarden::core::timing::CancelToken;
use netwarden::error::{Result, WardenError};
use netwarden::net::interface;

use crate::cli::args::{Args, Command};

pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Interfaces => {
            let candidates = interface::candidates();
            if candidates.is_empty() {
                println!("No usable interfaces (up, non-loopback, with an IPv4 address).");
                return Ok(());
            }
            for iface in candidates {
                let mac = iface
                    .mac
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".into());
                println!("{:<12} {:<20} {:?}", iface.name, mac, iface.ips);
            }
            Ok(())
        }
        Command::Scan {
            interface,
            gateway,
            resolve,
        } => {
            let mut engine = build_engine(&interface, gateway)?;

            println!(
                "[*] Sweeping {} on {}...\n",
                engine.binding().network,
                interface
            );
            let cancel = CancelToken::new();
            engine.scan(|_| {}, &cancel);
            if resolve {
                engine.resolve_hostnames(&cancel);
            }

            let devices = engine.devices();
            if devices.is_empty() {
                println!("No devices found.");
            } else {
                println!("{:<16} {}", "IP", "MAC");
                println!("{}", "\u{2500}".repeat(36));
                for device in &devices {
                    println!("{device}");
                }
                println!("\n[*] Found {} device(s).", devices.len());
            }

            engine.shutdown();
            Ok(())
        }
        Command::Block {
            interface,
            gateway,
            target,
        } => {
            let mut engine = build_engine(&interface, gateway)?;

            // Mirror engine events onto the terminal as they happen.
            let event_rx = engine.events().subscribe();
            thread::spawn(move || {
                while let Ok(line) = event_rx.recv() {
                    println!("{line}");
                }
            });

            println!("[*] Sweeping for targets...");
            let cancel = CancelToken::new();
            engine.scan(|_| {}, &cancel);

            let gateway_device = engine.resolve_gateway()?;
            println!(
                "[*] Gateway: {} ({})",
                gateway_device.ip, gateway_device.mac
            );

            let blocker = engine.blocking_engine(gateway_device)?;
            blocker.start();

            for ip in &target {
                match engine.find_device(*ip) {
                    Some(device) => blocker.block(&device),
                    None => println!("[!] {ip} did not answer the sweep — skipping."),
                }
            }

            if blocker.blocked().is_empty() {
                blocker.stop();
                engine.shutdown();
                return Err(WardenError::Network("no targets could be blocked".into()));
            }

            let stop = CancelToken::new();
            let flag = stop.clone();
            ctrlc::set_handler(move || flag.cancel())
                .map_err(|e| WardenError::Network(format!("failed to set signal handler: {e}")))?;

            println!(
                "[*] Blocking {} device(s). Press Ctrl+C to stop and restore.\n",
                blocker.blocked().len()
            );
            while !stop.is_cancelled() {
                stop.wait(Duration::from_secs(1));
            }

            let stats = blocker.blocked();
            blocker.stop();
            for entry in stats {
                println!("[*] {}: {} poison packets", entry.ip, entry.packets_sent);
            }
            engine.shutdown();
            Ok(())
        }
    }
}

fn build_engine(iface_name: &str, gateway: Option<Ipv4Addr>) -> Result<ArpEngine> {
    let gateway_ip = match gateway {
        Some(ip) => ip,
        None => interface::default_gateway()?,
    };
    let binding = interface::InterfaceBinding::bind(iface_name, gateway_ip)?;
    ArpEngine::new(binding, EngineConfig::default())
}
