//! Host port allocator.
//!
//! A mutex-guarded counter starting from a configurable base. Ports are
//! never reused during the orchestrator's lifetime, even after an app is
//! torn down; once the range is exhausted, `next` fails rather than
//! handing out a port twice.

use crate::error::{CoreError, Result};
use std::sync::Mutex;

pub const DEFAULT_PORT_BASE: u16 = 10000;

#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    // One past u16::MAX marks exhaustion, hence the wider type.
    next: Mutex<u32>,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self {
            base,
            next: Mutex::new(base as u32),
        }
    }

    /// Issue the next host port. Monotonic; never hands out the same port
    /// twice, so an exhausted range surfaces as an error for the caller
    /// to attribute to its app.
    pub fn next(&self) -> Result<u16> {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        if *next > u16::MAX as u32 {
            return Err(CoreError::PortsExhausted { base: self.base });
        }
        let port = *next as u16;
        *next += 1;
        Ok(port)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_BASE)
    }
}
