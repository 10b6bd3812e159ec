//! # jar-indexer
//!
//! Stores Java artifact sources under Maven coordinates and serves them for
//! browsing.
//!
//! ## Architecture
//!
//! - **coords**: coordinate and git-ref validation
//! - **storage**: on-disk layout (`code/`, `source-jar/`, `git-bare/`)
//! - **uri**: source URI classification
//! - **git**: bare clones and per-version worktrees behind a `GitBackend` seam
//! - **archive**: jar integrity checks and extraction
//! - **download**: HTTP download with retry
//! - **fsops**: verified copies and tree copies
//! - **materialize**: source registration
//! - **extract**: registered-source query and code-tree materialization
//! - **status**: derived artifact status
//! - **catalog**: artifact discovery, filtering and pagination
//! - **version**: version constraints and Maven-style ordering
//! - **explore**: tree listing, file reads, file-name and content search
//! - **scan**: Maven/Gradle local cache lookup
//! - **tools**: the request/response tool surface
//! - **mcp**: stdio JSON-RPC server around the tools

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod coords;
pub mod download;
pub mod error;
pub mod explore;
pub mod extract;
pub mod fsops;
pub mod git;
pub mod materialize;
pub mod mcp;
pub mod scan;
pub mod status;
pub mod storage;
pub mod tools;
pub mod uri;
pub mod version;
