//! nxguard - a local DNS-filtering firewall.
//!
//! Reads raw packets from a tunnel, answers blocked DNS queries with
//! NXDOMAIN and forwards the rest to an upstream resolver.

pub mod config;
pub mod dns;
pub mod filter;
pub mod intercept;
pub mod packet;
pub mod resolver;
pub mod rules;
pub mod schedule;
pub mod stats;
pub mod store;
#[cfg(unix)]
pub mod tunnel;
pub mod upstream;
