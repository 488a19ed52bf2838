//! Concrete entity types, listed in dependency order: a type only references
//! types listed before it.

pub mod interface;
pub mod port;
pub mod channel;
pub mod controller;
pub mod bridge;
