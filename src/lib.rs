//! Invalidation-aware caching for a geographic-data REST API.
//!
//! The [`cache`] module holds the engine; [`api`] and [`infra::store`] form a
//! small demo service that exercises it end to end.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod routes;
