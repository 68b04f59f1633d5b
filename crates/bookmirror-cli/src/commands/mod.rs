//! Command handlers

pub mod config;
pub mod job;
pub mod search;
pub mod status;
pub mod sync;
pub mod tree;
