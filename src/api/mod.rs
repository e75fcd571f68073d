//! HTTP API Module
//!
//! Provides the REST surface brokers use to register, deregister, query
//! leadership, and report a failed leader.

mod http;

pub use http::HttpServer;
