//! Command handlers

pub mod blocks;
pub mod check;
pub mod config;
pub mod join;
pub mod serve;
