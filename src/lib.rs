pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod params;
pub mod postgres;
pub mod provider;
pub mod server;
pub mod session;
pub mod views;
