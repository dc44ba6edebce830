//! Postbeam — compose once, deliver to any channel, now or later.

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod flows;
pub mod model;
pub mod ops;
pub mod store;
