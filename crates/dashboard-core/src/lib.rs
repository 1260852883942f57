#![doc = include_str!("../README.md")]

mod types;

pub mod export;
pub mod txn;

pub use crate::types::*;
