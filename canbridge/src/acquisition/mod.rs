// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Sample Acquisition
//!
//! ## Modules
//!
//! - [`engine`] - Per-tick sampling of all channels and N:1 decimation.
//! - [`calibration`] - Raw-count to voltage conversion for the console.

pub mod calibration;
pub mod engine;

pub use calibration::Calibration;
pub use engine::{AcquisitionContext, AdcConverter, DecimationFilter};
