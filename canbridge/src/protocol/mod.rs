// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod builder;
pub mod frame;

pub use builder::{decode_samples, pack12, unpack12, FrameBuilder, SequenceCounter};
pub use frame::TxFrame;
