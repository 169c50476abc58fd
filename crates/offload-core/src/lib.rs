#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod dispatch;
pub mod fibonacci;
pub mod pool;
pub mod range;
pub mod store;
pub mod workload;
