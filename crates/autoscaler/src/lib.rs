//! Cluster autoscaler daemon: configuration and HTTP API

pub mod api;
pub mod config;
