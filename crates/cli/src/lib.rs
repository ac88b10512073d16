pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
pub mod server;
pub mod signal;
