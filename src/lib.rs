//! sqlport - convert legacy SQL files into Databricks notebooks.
//!
//! Input files are analyzed into a result table, converted by a model
//! serving endpoint, statically checked, repaired in bounded fix attempts
//! and finally exported as notebook source files.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod export;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod validate;
