pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod stream;
