//! Flowchart Core Types and Definitions
//!
//! This crate provides the foundational value types for the flowchart
//! engine. It includes:
//!
//! - **Identifiers**: Interned element identifiers ([`identifier::Id`])
//! - **Colors**: CSS color parsing for line and border colors ([`color::Color`])
//! - **Geometry**: Points, sizes, bounds and node sides ([`geometry`] module)
//! - **Draw**: Stroke styles, path commands and text measurement ([`draw`] module)

pub mod color;
pub mod draw;
pub mod geometry;
pub mod identifier;
