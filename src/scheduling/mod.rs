//! Scheduling orchestration over the store and the notification gateway.

pub mod consumer;
pub mod flows;
pub mod service;
