//! # Vessel Support
//!
//! Shared text-rendering utilities for the Vessel dependency-resolution
//! engine. Everything here exists to keep error output readable:
//! shortened type names, candidate lists, owner descriptions.

pub mod rendering;
