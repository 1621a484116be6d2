//! # courier-service
//!
//! Team-shared API testing backend. Stores reusable request definitions in
//! collections and folders, resolves scoped variables, proxies requests to
//! arbitrary user-supplied targets, records history, and runs whole
//! collections as batches with scripted assertions.
//!
//! The four core subsystems:
//!
//! - [`proxy`]: builds, dispatches, redirect-tracks, times, and size-caps
//!   outgoing requests, recording one history entry per dispatch
//! - [`vars`]: four-scope variable store and `{{name}}` template expansion
//! - [`runner`]: ordered execution of a collection over N iterations with
//!   data files, cancellation, and aggregate statistics
//! - [`script`]: restricted sandbox exposing the `pm` API to pre-request
//!   and post-response snippets
//!
//! Persistence and caller authentication are external collaborators: the
//! core consumes the [`repository`] traits and trusts the pre-validated
//! identity headers handled by [`identity`].

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod model;
pub mod observability;
pub mod pagination;
pub mod proxy;
pub mod repository;
pub mod runner;
pub mod script;
pub mod server;
pub mod state;
pub mod vars;
