pub mod commands;

pub use commands::CliHandler;
