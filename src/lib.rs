//! Warden guild protection library.
//!
//! Moderation commands plus passive protection subsystems: anti-raid join
//! monitoring, ban-abuse and kick-abuse detection with audit-log actor
//! correlation, and automated punishments.

pub mod abuse;
pub mod audit;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod health;
pub mod logs;
pub mod punish;
pub mod raid;
pub mod window;
