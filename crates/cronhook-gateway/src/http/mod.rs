pub mod admin;
pub mod cron;
pub mod data;
pub mod error;
pub mod health;
pub mod status;
