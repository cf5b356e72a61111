//! Core engine types shared by the terrain and water crates.
//!
//! This crate is GPU-free:
//! - Integer update rectangles and their non-overlapping merge
//! - The height field sampling trait
//! - Frame timing

pub mod heightfield;
pub mod overlap;
pub mod rect;
pub mod time;

pub use heightfield::*;
pub use overlap::*;
pub use rect::*;
pub use time::*;

// Re-export commonly used types
pub use glam::{Mat4, Vec2, Vec3, Vec4};
