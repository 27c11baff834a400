//! Collaborator contracts consumed by the service layer.

pub mod clock_port;
pub mod config_port;
pub mod ledger_port;
pub mod price_port;
