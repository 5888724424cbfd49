//! Tools module - Tool implementations for the agent
//!
//! Contains the healthcare tools and the tool registry.

pub mod booking;
pub mod disease;
pub mod doctors;
pub mod hospitals;
pub mod math;
pub mod registry;
pub mod web;

pub use registry::{Tool, ToolRegistry};
