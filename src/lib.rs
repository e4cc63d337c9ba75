pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod remote;
pub mod resolver;
pub mod ssh;
pub mod store;
pub mod tail;
