pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod web;
