//! # Server Dashboard Client Library
//!
//! This library keeps an operator's view of a fleet of Minecraft servers in sync
//! with the management backend. It polls the backend for snapshots of every server
//! the caller can see, turns each snapshot into the smallest set of visible changes,
//! and dispatches operator actions (start, stop, backup and friends) back to the
//! backend.
//!
//! ## Architecture Overview
//!
//! ### Snapshot Reconciliation
//! Every poll returns the whole fleet. The client diffs it against what is currently
//! shown and emits ordered effects: cards created, fields changed, buttons flipped,
//! cards removed. Fetches are tagged with sequence numbers so a slow response can
//! never overwrite a newer one.
//!
//! ### Permission Evaluation
//! Whether an action is available is a pure function of the server record and the
//! release catalog. Disabled actions are refused before anything is sent.
//!
//! ### Action Dispatch
//! At most one request per server and action kind is outstanding at a time. Each
//! completed request triggers an out-of-cycle refresh so the board catches up
//! without waiting for the next poll.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings
//! - `error`: the error type shared by every fallible operation
//! - `permissions`: the action evaluator
//! - `store`: the view-model of what is shown
//! - `reconcile`: snapshot diffing and stale-response rejection
//! - `dispatch`: action requests and their follow-up work
//! - `http`: the backend over HTTP
//! - `input`: operator command parsing
//! - `rendering`: the text board
//! - `network`: the sync loop tying everything together
//!
//! ## Usage Example
//!
//! ```ignore
//! use client::config::ClientConfig;
//! use client::http::HttpBackend;
//! use client::network::Client;
//! use client::rendering::Renderer;
//!
//! let config = ClientConfig::default().with_base_url("http://127.0.0.1:8080");
//! let backend = HttpBackend::new(&config)?;
//! let mut client = Client::new(backend, config, Renderer::new(true));
//! client.run().await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod input;
pub mod network;
pub mod permissions;
pub mod reconcile;
pub mod rendering;
pub mod store;
