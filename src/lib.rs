pub mod accounts;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod host;
pub mod identity;
pub mod lock;
pub mod logging;
pub mod manifest;
pub mod mcp;
pub mod orchestrator;
pub mod paths;
pub mod redirect;
pub mod roots;
pub mod store;
pub mod ui;

#[cfg(test)]
pub mod test_utils;
