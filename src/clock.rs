// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, in whole seconds since the Unix epoch.
pub trait Clock {
    fn now_secs(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HostClock;

impl Clock for HostClock {
    fn now_secs(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs(),
            Err(_) => {
                error!("Host clock is before UNIX_EPOCH. RTC reports time=0");
                0
            }
        }
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    secs: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self { secs: Rc::new(Cell::new(secs)) }
    }

    pub fn set(&self, secs: u64) {
        self.secs.set(secs);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.set(self.secs.get().saturating_add(secs));
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.secs.get()
    }
}
