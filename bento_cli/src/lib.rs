pub mod auto_test;
pub mod commands;
pub mod config;
pub mod error;
pub mod interactive;
pub mod serial_console;
pub mod settings;
