//! Library crate for mafiadon-back, exposing modules for binaries and integration tests.

pub mod config;
pub mod dto;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod state;
