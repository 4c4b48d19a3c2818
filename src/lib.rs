//! tickdown - a terminal task tracker with live deadline countdowns

pub mod app;
pub mod cli;
pub mod config;
pub mod countdown;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod parser;
pub mod store;
pub mod ui;
