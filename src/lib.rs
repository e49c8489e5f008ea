pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod device;
pub mod flow;
pub mod guard;
pub mod model;
pub mod provider;
pub mod revocation;
pub mod state;

#[cfg(test)]
mod testutil;
