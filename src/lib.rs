pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod permissions;
pub mod server;
pub mod state;
pub mod store;
