//! # feed-export
//!
//! Exports a store's catalog, categories, brands, customers and orders as
//! paginated feed documents for an external search and recommendations API.
//!
//! - [`runner::FeedRunner`] sends one feed type: page through a
//!   [`source::FeedDataSource`], map each entity with a [`mapper::RowMapper`],
//!   push rows to a [`contract::FeedBuilder`] and track progress in [`state`].
//! - [`requester::FeedRequester`] marks feed types as requested; a scheduler
//!   tick ([`runner::FeedRunner::run_scheduled`]) picks them up.
//! - [`pricing`] rolls composite product prices up into per-currency
//!   `Prices` / `SalePrices` / `GroupPrices`.
//! - Collaborators (catalog, tax, currency, transport, state backend) are the
//!   traits in [`contract`]; [`local`] has file-backed versions used by the CLI.

pub mod cli;
pub mod config;
pub mod context;
pub mod contract;
pub mod currency;
pub mod document;
pub mod error;
pub mod load_config;
pub mod local;
pub mod mapper;
pub mod models;
pub mod pricing;
pub mod registry;
pub mod requester;
pub mod runner;
pub mod source;
pub mod state;
