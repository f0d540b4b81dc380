//! pgha - REST control plane for a PostgreSQL high-availability cluster
//!
//! Answers load balancer health checks, exposes the cluster state kept in
//! the DCS and turns operator requests (switchover, restart, configuration
//! edits) into DCS writes and HA loop requests.

pub mod cli;
pub mod config;
pub mod dcs;
pub mod dynconfig;
pub mod ha;
pub mod health;
pub mod http_server;
pub mod observability;
pub mod postgres;
pub mod restart;
pub mod schedule;
pub mod shutdown;
pub mod switchover;
