//! foliotrack: portfolio performance time series from an order ledger.
//!
//! Hexagonal architecture: pure computation in [`domain`], collaborator
//! contracts in [`ports`], concrete implementations in [`adapters`],
//! request orchestration in [`service`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
pub mod service;
