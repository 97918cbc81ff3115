// SPDX-License-Identifier: MPL-2.0

//! Frame processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ Camera Frame │ ──▶ │ Effects Pipeline  │ ──▶ │  Output Surface  │
//! │   (BGRA32)   │     │  - Blur           │     │  (double buffer) │
//! │              │     │  - Beautification │     │                  │
//! │              │     │  - Background     │     │                  │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`effects`]: Effect state, processing and output surfaces
//! - [`worker`]: Dedicated thread that feeds frames through a pipeline

pub mod effects;
pub mod worker;
