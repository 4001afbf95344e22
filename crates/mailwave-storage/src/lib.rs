//! Mailwave Storage - Database abstraction
//!
//! This crate provides the PostgreSQL storage layer for Mailwave:
//! connection pooling, migrations, models, and per-table repositories.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
