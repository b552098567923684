//! HTTP service for Join Guard: webhook intake, verification, approval
//! and the operator API.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
