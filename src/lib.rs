pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod mapper;
pub mod pipeline;
pub mod schema;
pub mod state_machine;
pub mod store;
pub mod ui;
