pub mod addressing;
pub mod api;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod processing;
pub mod proto;
pub mod queue;
pub mod storage;
pub mod worker;
