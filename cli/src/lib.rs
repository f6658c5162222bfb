//! taskweave-cli library: command handlers and the HTTP server, exposed for tests.

pub mod commands;
pub mod http;
