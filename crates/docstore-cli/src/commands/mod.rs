//! Command handlers

pub mod config;
pub mod document;
pub mod link;
pub mod vacuum;
