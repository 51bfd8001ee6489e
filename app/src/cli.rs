use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "domain-desk", version, about = "Registrar queries, simulated orders and renewal sweeps")]
pub struct Cli {
    /// Configuration file (default: ./domain-desk.toml if present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Configured provider name to use
    #[arg(long, short, global = true)]
    pub provider: Option<String>,

    /// Force the sandbox adapter regardless of `mode`
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether domains can be registered
    Check {
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// Show registrar details for a domain
    Info { domain: String },
    /// Show the DNS zone of a domain
    Zone { domain: String },
    /// List TLDs the registrar sells
    Tlds {
        /// Only these TLDs
        filter: Vec<String>,
    },
    /// List domains in the registrar account
    Domains,
    /// Check that the configured credentials work
    Verify,
    /// Run an order through registration and provisioning against in-memory billing
    SimulateOrder {
        domain: String,
        #[arg(long, default_value_t = 1)]
        years: u32,
        #[arg(long, default_value = "cust_demo")]
        customer: String,
    },
    /// Auto-renew account domains expiring within the renewal window
    Sweep {
        /// Actually renew. Without it the due domains are only listed.
        #[arg(long)]
        execute: bool,
    },
    /// Clear the renewal marker a failed sweep left on a domain
    Release { domain: String },
}
