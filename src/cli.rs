//! Command-line interface for the epcdns discovery tool.
//!
//! Two operation modes are exposed:
//!
//! - `resolve` performs one NAPTR-driven peer lookup for an operator
//!   identity and prints the outcome as JSON.
//! - `batch` resolves many APNs from a file against a shared identity, with
//!   bounded concurrency and query rate limiting, writing JSONL results.
//!
//! Transport tuning (nameserver, timeout, retransmit attempts) and filter
//! behavior flags are global and apply to both modes. When no nameserver is
//! given the system resolver configuration is used.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::context::ResolverContext;

/// Main command-line structure.
///
/// # Examples
///
/// ```text
/// epcdns resolve --target pgw --interface s5 --apn mms --mcc 001 --mnc 100
/// epcdns batch --target sgw --interface s11 --mcc 505 --mnc 001 \
///     --input-file apns.txt --output-file peers.jsonl --rate-limit 60
/// ```
#[derive(Parser)]
#[command(
    name = "epcdns",
    about = "DNS NAPTR based discovery of 3GPP EPC core peers",
    version
)]
pub struct Cli {
    /// Operation to run (single lookup or batch processing)
    #[command(subcommand)]
    pub command: Commands,

    /// Nameserver to query as host:port
    /// Defaults to the first nameserver in the system resolver configuration
    #[arg(short = 'n', long)]
    pub nameserver: Option<SocketAddr>,

    /// Per-attempt query timeout in milliseconds
    #[arg(short = 't', long)]
    pub timeout_ms: Option<u64>,

    /// Send attempts per query before giving up
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Apply the RFC 2915 regexp match rule when filtering NAPTR records
    /// instead of the inverted test deployed EPC resolvers use
    #[arg(long)]
    pub rfc2915_filter: bool,

    /// Drop NAPTR records whose replacement name failed to decode
    #[arg(long)]
    pub drop_invalid: bool,
}

/// Operator identity shared by both subcommands.
///
/// These map directly onto the discovery FQDN and the desired NAPTR service
/// strings: `x-3gpp-<target>` and `x-<interface>-<protocol>`.
#[derive(Args, Clone)]
pub struct IdentityArgs {
    /// Service target token (e.g. sgw, pgw)
    #[arg(long)]
    pub target: String,

    /// Interface token (e.g. s5, s8, s11)
    #[arg(long)]
    pub interface: String,

    /// Protocol token
    #[arg(long, default_value = "gtp")]
    pub protocol: String,

    /// Mobile country code, zero-padded
    #[arg(long)]
    pub mcc: String,

    /// Mobile network code, zero-padded
    #[arg(long)]
    pub mnc: String,

    /// DNS zone suffix of the discovery domain
    #[arg(long, default_value = "3gppnetwork.org")]
    pub domain_suffix: String,
}

impl IdentityArgs {
    /// Builds a resolver context for one APN (empty for the EPC root
    /// domain).
    pub fn to_context(&self, apn: &str) -> ResolverContext {
        ResolverContext {
            target: self.target.clone(),
            interface: self.interface.clone(),
            protocol: self.protocol.clone(),
            apn: apn.to_string(),
            mnc: self.mnc.clone(),
            mcc: self.mcc.clone(),
            domain_suffix: self.domain_suffix.clone(),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a single peer address
    Resolve {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Access point name; omit to use the EPC root domain
        #[arg(short, long, default_value = "")]
        apn: String,
    },
    /// Resolve peers for many APNs from a file
    ///
    /// The input file carries one APN per line. Empty lines and lines
    /// starting with '#' are skipped. Results are written as one JSON
    /// object per line when an output file is given, otherwise printed
    /// to stdout.
    Batch {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Input file containing APNs (one per line)
        #[arg(short, long)]
        input_file: PathBuf,

        /// Output file for results (JSON, one result per line)
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// Number of APNs read and resolved per chunk
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Sustained query rate limit (lookups per minute)
        #[arg(short, long, default_value = "100")]
        rate_limit: u64,

        /// Number of lookups kept in flight at once
        #[arg(short = 'c', long, default_value = "16")]
        concurrent_queries: usize,
    },
}
