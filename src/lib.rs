//! # Order Intake
//!
//! Collects customer orders from two channels and keeps them as JSON files:
//!
//! - a Telegram bot with a customer mode (web app launcher) and a
//!   code-protected manager mode (user entry, user and order overviews)
//! - an HTTP order form (`POST /submit`) plus an inbox directory of
//!   structured order exports
//!
//! Every inbound order is normalized into one canonical [`order_model::Order`]
//! shape before it is persisted.

pub mod bot;
pub mod config;
pub mod console;
pub mod dialogue;
pub mod ingestion;
pub mod intake_errors;
pub mod localization;
pub mod manager_registry;
pub mod normalizer;
pub mod order_model;
pub mod persistence;
pub mod users;
pub mod web_server;
