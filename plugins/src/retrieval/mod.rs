mod local;
mod service;

pub use local::InMemoryRetrieval;
pub use service::HttpRetrieval;
