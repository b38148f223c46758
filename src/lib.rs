// Library exports for the fleetd tenant supervisor

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ipc;
pub mod logs;
pub mod process;
pub mod reload;
pub mod state;
pub mod tenant;
