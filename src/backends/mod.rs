// SPDX-License-Identifier: MPL-2.0

//! Collaborators the pipeline is built on
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Effects Pipeline               │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────┴──────────┐ ┌─────────┴──────────┐
//! │       Engine        │ │      Surface       │
//! │ (effects, images)   │ │ (heap, memfd)      │
//! └─────────────────────┘ └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: Effect engine and background image loader interfaces
//! - [`surface`]: Output surface allocation

pub mod engine;
pub mod surface;
