pub mod capture;
pub mod config;
pub mod gateway_adapter;
pub mod process;
pub mod repl;
pub mod settings;
pub mod speech;

pub use gateway_client::types as gateway_types;
