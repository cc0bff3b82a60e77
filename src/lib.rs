//! Home-services marketplace backend
//!
//! Customers place orders, providers bid on them, and both sides negotiate
//! over REST with realtime pushes. The `client` module is a typed client for
//! the same API.

pub mod api;
pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod realtime;
pub mod repository;
pub mod routes;
pub mod services;
