pub mod clock;
pub mod command;
pub mod config;
pub mod gate;
pub mod history;
pub mod http;
pub mod ingest;
pub mod mqtt;
pub mod snapshot;
pub mod stats;
pub mod topic;
