pub mod api;
pub mod cli;
pub mod config;
pub mod event;
pub mod storage;
pub mod sync;
