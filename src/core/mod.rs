//! Core configuration, models and errors

pub mod config;
pub mod errors;
pub mod models;
