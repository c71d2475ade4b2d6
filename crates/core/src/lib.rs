//! Core library for bloodwork
//!
//! This crate implements the **Functional Core** of the bloodwork lab report
//! importer, following the Functional Core - Imperative Shell architectural
//! pattern.
//!
//! # Architecture Overview
//!
//! - **`bloodwork_core`** (this crate): Pure transformation functions with zero I/O
//! - **`bloodwork`**: PDF text extraction, model calls, glossary files and batch
//!   orchestration (the Imperative Shell)
//!
//! The glossary is the only state that outlives a report. It is passed in as
//! a value and mutated in place; reading and writing the file is the shell's
//! job.
//!
//! # Module Organization
//!
//! Modules follow the order a report moves through:
//!
//! - [`harvest`]: Candidate rows from page text (table lines, cards, model prompts, fallback patterns)
//! - [`filter`]: Acceptance gates for candidates
//! - [`merge`]: Cross-strategy merge and deduplication
//! - [`glossary`]: Name normalization and the persistent canonical vocabulary
//! - [`units`]: Unit standardization with pre-conversion snapshots
//! - [`lab`]: Report date and laboratory detection, record assembly
//! - [`pipeline`]: The stages composed, including a heuristic-only path
//!
//! Supporting modules: [`model`] (record types), [`rules`] (regex rule
//! tables), [`text`] (string helpers) and [`json`] (JSON recovery from free
//! text model output).
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use bloodwork_core::glossary::Glossary;
//! use bloodwork_core::pipeline::process_offline;
//!
//! let pages = vec!["Glukose    6,1    mmol/l    3,9-5,5".to_string()];
//! let mut glossary = Glossary::empty("2024-05-01T10:00:00Z");
//!
//! let lab = process_offline(&pages, &mut glossary, "2024-05-01T10:00:00Z", "2024-05-01");
//!
//! assert_eq!(lab.measurements[0].name, "Glucose");
//! assert_eq!(lab.measurements[0].unit.as_deref(), Some("mg/dL"));
//! ```

pub mod filter;
pub mod glossary;
pub mod harvest;
pub mod json;
pub mod lab;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod rules;
pub mod text;
pub mod units;
