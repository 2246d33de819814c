//! Live scoreboard synchronization: one host writes a game document, viewers follow it through
//! store change notifications, and every client runs its own clock between snapshots.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
