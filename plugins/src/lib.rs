mod http;

pub mod factory;
pub mod provision;
pub mod reasoning;
pub mod retrieval;
pub mod sandbox;

pub use http::{HttpError, HttpErrorKind};
