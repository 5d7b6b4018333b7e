pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod output;
pub mod parser;
pub mod poller;
pub mod stats;
pub mod status;
pub mod types;
