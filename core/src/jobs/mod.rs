//! Job control surface consumed by front ends (CLI, HTTP server).

mod controller;

pub use controller::JobController;
