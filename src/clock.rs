//! Logical clock source.
//!
//! Production code reads wall time; tests inject a fixed/controllable clock
//! so checkpoint scheduling and termination rules are deterministic.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// checkpoint scheduling and termination rules.
#[derive(Clone)]
pub struct TestClock {
    at: Arc<RwLock<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: Arc::new(RwLock::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.write() = at;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.at.write();
        *guard += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.read()
    }
}

pub type SharedClock = Arc<dyn Clock>;
