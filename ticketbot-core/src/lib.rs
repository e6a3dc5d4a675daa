// src/lib.rs

pub mod db;
pub mod repositories;
pub mod platforms;
pub mod tasks;
pub mod eventbus;
pub mod cache;
pub mod services;
pub mod utils;
pub mod test_utils;

pub use db::Database;
pub use ticketbot_common::error::Error;
