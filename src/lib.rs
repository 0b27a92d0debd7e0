#![allow(dead_code)]

pub mod config;
pub mod engine;
pub mod feeds;
pub mod models;
pub mod signals;
pub mod store;
pub mod strategies;
pub mod telemetry;
