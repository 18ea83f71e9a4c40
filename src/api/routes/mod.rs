//! API Routes
//!
//! Route handlers organized by functionality.

pub mod calendar;
pub mod events;
pub mod health;
pub mod images;
pub mod segments;
pub mod site;
