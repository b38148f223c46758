// Daemon module - Long-running supervisor process

pub mod handler;
pub mod pid;
mod runtime;

pub use handler::handle_command;
pub use pid::PidFile;
pub use runtime::Daemon;
