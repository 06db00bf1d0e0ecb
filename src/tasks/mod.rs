//! Background Tasks Module
//!
//! # Tasks
//! - Expiry timer: removes one TTL entry when its duration elapses

mod expiry;

pub(crate) use expiry::spawn_expiry_timer;
