pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod jobs;
pub mod nodes;
pub mod plan;
pub mod state;
