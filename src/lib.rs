//! `oa-bulkfix`: directive-driven bulk find-and-replace over structured
//! documents.
//!
//! A batch of `{fragment, replaceWith}` directives is resolved against the
//! leaf elements of a document (paragraphs, headings, list items, table
//! cells), turned into one reviewable suggestion per element, and applied
//! with a one-shot undo batch. Matching is exact in normalized space first;
//! an optional ranking backend identifies paraphrased fragments when no
//! exact hit exists.
//!
//! # Pipeline
//!
//! ```text
//! directives ─▶ fixer ─▶ document::index ─▶ matching ─▶ suggest ─▶ (approval)
//!                                              │                      │
//!                                          semantic                 apply ─▶ store
//! ```
//!
//! [`engine::Engine`] drives the pipeline and its phase machine; [`server`]
//! exposes it as MCP tools over stdio.

pub mod apply;
pub mod config;
pub mod document;
pub mod edit;
pub mod engine;
pub mod error;
pub mod fixer;
pub mod matching;
pub mod normalize;
pub mod oplog;
pub mod semantic;
pub mod server;
pub mod store;
pub mod suggest;
pub mod tools;
pub mod util;

pub use document::{Document, DocumentElement, DocumentHost, ElementType};
pub use engine::Engine;
pub use error::{BulkfixError, BulkfixResult};
pub use fixer::Directive;
pub use server::run_mcp_server;
pub use suggest::Suggestion;
