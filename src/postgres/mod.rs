// ABOUTME: PostgreSQL connection utilities
// ABOUTME: Re-exports the connect helpers used by the CLI and integration tests

pub mod connection;

pub use connection::{connect, connect_with_options, connect_with_retry, init_tls_policy, ConnectOptions};
