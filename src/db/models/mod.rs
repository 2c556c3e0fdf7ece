//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` work.

pub mod event;
pub mod notification_log;
pub mod studio;

pub use self::event::*;
pub use self::notification_log::*;
pub use self::studio::*;
