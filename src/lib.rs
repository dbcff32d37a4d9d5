#![forbid(unsafe_code)]

//! Notification scheduling core for reminders, scheduled texts, birthday
//! texts and gift reminders.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod persistence;
pub mod scheduling;
pub mod time;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
