//! Monospace Core Library
//!
//! This is the core library for the Monospace polyglot monorepo workbench. It
//! provides the task pipeline engine and everything around it: configuration,
//! project registry, task resolution, parallel execution, output rendering and
//! pinned repository states.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`workspace_manager`] - High-level context object used by every command
//! - [`configs`] - `monospace.yml`, pinned states and `package.json` parsing
//! - [`projects`] - Project registry and aliases
//! - [`pipeline`] - Canonical pipeline model and cycle detection
//! - [`resolver`] - Project filters and dependency closure of requested tasks
//! - [`execution`] - Runner factory and the bounded-parallelism DAG executor
//! - [`output`] - Output modes and the output multiplexer
//! - [`state`] - Pinned states of the outer repository and external projects
//! - [`graph`] - Graphviz export of resolved tasks
//! - [`lexer`] - Splitting and quoting of single-string commands
//! - [`ui`] - Terminal capabilities, interactivity and messages
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! The primary entry point is the [`WorkspaceManager`]:
//!
//! ```rust,no_run
//! use monospace_core::workspace_manager::WorkspaceManager;
//! use std::path::Path;
//!
//! # fn example() -> monospace_core::types::MonospaceResult<()> {
//! let manager = WorkspaceManager::discover(Path::new("."))?;
//! let tasks = manager.list_tasks(&[])?;
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod git;
pub mod graph;
pub mod lexer;
pub mod output;
pub mod package_manager;
pub mod pipeline;
pub mod projects;
pub mod resolver;
pub mod results;
pub mod state;
pub mod types;
pub mod ui;
pub mod workspace_manager;

pub use workspace_manager::WorkspaceManager;
