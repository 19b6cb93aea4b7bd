//! `pace`: task state reconciler for the PACE project board.

pub mod config;
pub mod projects;
pub mod store;
pub mod tasks;
