//! Time source port.

use chrono::{DateTime, Utc};

/// Supplies the resolution instant for window computations.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
