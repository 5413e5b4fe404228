use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use caprewrite::config::{Cli, Config};
use caprewrite::pipeline::{self, Counters};

// Every outcome exits 0; failures are reported through the log.
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let report = cli.report;
    let config = match Config::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            if e.is_usage() {
                let _ = Cli::command().print_help();
            }
            return ExitCode::SUCCESS;
        }
    };

    match rewrite(&config, report) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::SUCCESS
        }
    }
}

fn rewrite(config: &Config, report: bool) -> Result<()> {
    let counters = pipeline::run(config)
        .with_context(|| format!("Failed to rewrite {:?}", config.source))?;
    info!("Wrote {:?}", config.destination);

    if report {
        println!("{}", serde_json::to_string_pretty(&counters)?);
    } else {
        print_summary(&counters);
    }
    Ok(())
}

fn print_summary(counters: &Counters) {
    println!("=== Rewrite Summary ===");
    println!("Total packets processed:       {}", counters.total);
    println!("ARP packets processed:         {}", counters.arp);
    println!("802.1Q packets processed:      {}", counters.vlan);
    println!("802.1QinQ packets processed:   {}", counters.qinq);
    println!("─────────────────────────────────────────");
    println!("Ethernet MACs rewritten:       {}", counters.ethernet_macs_rewritten);
    println!("ARP MACs rewritten:            {}", counters.arp_macs_rewritten);
    println!("ARP IPv4 rewritten:            {}", counters.arp_ipv4_rewritten);
    println!("IPv4 header fields rewritten:  {}", counters.ipv4_rewritten);
    if counters.malformed > 0 {
        println!("Malformed packets skipped:     {}", counters.malformed);
    }
}
