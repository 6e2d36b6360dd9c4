// src/core/mod.rs

pub mod config_loader;
pub mod monitor;
pub mod parser;
pub mod paths;
pub mod slot;
pub mod worker;
