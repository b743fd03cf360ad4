// Auth Session - Library root

pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod http_client;
pub mod login;
pub mod store;
