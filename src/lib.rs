pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod services;
