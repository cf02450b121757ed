//! Library exports for the Pokédex backend
//!
//! This module exposes internal components for testing and potential library usage.

pub mod account;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod model;
pub mod route;
pub mod store;
pub mod validation;
