//! # Segue Content
//!
//! Versioned content store, search indexer and content facade for the Segue
//! learning platform.
//!
//! Content lives as JSON files in a git repository; every commit is a
//! content version. This crate reads versions through [`git_store`], builds
//! per-version search indices with [`indexer`], and serves content through
//! the [`manager`] facade, over a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Git store   │──▶│  Loader +   │──▶│ Search index │
//! │ (versions)  │   │  Validator  │   │ SQLite / mem │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │ (segue)  │       │  facade  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! segue init                    # create the search database
//! segue versions                # list content versions
//! segue index head --live       # index the head commit and make it live
//! segue search "gravity"        # fuzzy search the live version
//! segue serve                   # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`git_store`] | Git-backed version store |
//! | [`source`] | Async access to the version store and loader |
//! | [`indexer`] | Per-version index builds and aliases |
//! | [`manager`] | Content read facade with search fallback |
//! | [`sqlite_search`] | SQLite search provider |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod git_store;
pub mod indexer;
pub mod manager;
pub mod migrate;
pub mod server;
pub mod source;
pub mod sqlite_search;
