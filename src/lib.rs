//! Library exports for the URL shortener application
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod database;
pub mod error;
pub mod federated;
pub mod handler;
pub mod identity;
pub mod middleware;
pub mod model;
pub mod password;
pub mod redirect;
pub mod retry;
pub mod route;
pub mod shortener;
pub mod state;
pub mod store;
pub mod token;
