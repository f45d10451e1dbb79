pub mod body;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod names;
pub mod privileges;
pub mod server;
pub mod store;
pub mod tls;
