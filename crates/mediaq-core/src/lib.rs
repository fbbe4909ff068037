pub mod config;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod metadata;
pub mod queue;
pub mod security;
pub mod store;
