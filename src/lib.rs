pub mod config;
pub mod dns;
pub mod error;
pub mod icmp;
pub mod probe;
pub mod report;
pub mod traceroute;
