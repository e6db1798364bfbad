//! # trend-harvest
//!
//! Finds cloud-drive share links for trending titles in chat-group history,
//! saves the linked content into an account-controlled drive, and re-shares
//! it under a fresh link.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ TrendSource │──▶│  Collector  │──▶│   Delivery   │
//! └─────────────┘   └──────┬──────┘   └──────────────┘
//!                          ▼
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │MessageSource│──▶│  Searcher   │──▶│ DriveClient  │──▶│ TaskPoller │
//! └─────────────┘   └──────┬──────┘   └──────────────┘   └────────────┘
//!                          ▼
//!                   ┌─────────────┐
//!                   │ SearchCache │
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest account                       # verify the drive cookie
//! harvest groups                        # check the message groups
//! harvest search "Movie X" --debug      # stream results for one title
//! harvest run --test                    # one pipeline pass, first hit only
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`retry`] | Shared retry/backoff policy |
//! | [`cache`] | Persistent search cache with TTL |
//! | [`drive`] | Drive client and HTTP transport |
//! | [`task`] | Remote task polling |
//! | [`fuzzy`] | Similarity scoring |
//! | [`links`] | Share-link extraction |
//! | [`search`] | Streaming and bulk message search |
//! | [`collector`] | Pipeline orchestrator |
//! | [`traits`] | Collaborator traits |
//! | [`export_source`] | Chat-export message source |
//! | [`trends`] | Trend fetching and ranking |
//! | [`delivery`] | Webhook delivery |
//! | [`results`] | Run result files |
//! | [`progress`] | `--debug` progress on stderr |
//! | [`logging`] | Subscriber setup |
//! | [`sources`] | Group status listing |

pub mod cache;
pub mod collector;
pub mod config;
pub mod delivery;
pub mod drive;
pub mod error;
pub mod export_source;
pub mod fuzzy;
pub mod links;
pub mod logging;
pub mod models;
pub mod progress;
pub mod results;
pub mod retry;
pub mod search;
pub mod sources;
pub mod task;
pub mod traits;
pub mod trends;
