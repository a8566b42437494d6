use tracing::debug;
use wasmtime::ResourceLimiter;

use crate::TRACE_TARGET_SANDBOX;

/// Hard caps on one session's linear memory and tables. A denied `grow`
/// returns -1 to the guest; guests that treat that as fatal trap, which the
/// session reports as an internal error.
#[derive(Debug)]
pub struct MemoryLimiter {
    max_memory: usize,
    max_table_elements: usize,
    peak_memory: usize,
}

impl MemoryLimiter {
    /// Table elements are budgeted as if each cost this many bytes of the
    /// memory limit.
    const TABLE_ELEMENT_BYTES: usize = 64;
    const MIN_TABLE_ELEMENTS: usize = 1024;

    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            max_table_elements: (max_memory / Self::TABLE_ELEMENT_BYTES)
                .max(Self::MIN_TABLE_ELEMENTS),
            peak_memory: 0,
        }
    }

    /// Largest linear memory size granted so far, in bytes.
    pub const fn peak_memory(&self) -> usize {
        self.peak_memory
    }
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.max_memory {
            debug!(
                target: TRACE_TARGET_SANDBOX,
                current,
                desired,
                limit = self.max_memory,
                "memory growth denied"
            );
            return Ok(false);
        }
        self.peak_memory = self.peak_memory.max(desired);
        Ok(true)
    }

    fn table_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.max_table_elements {
            debug!(
                target: TRACE_TARGET_SANDBOX,
                current,
                desired,
                limit = self.max_table_elements,
                "table growth denied"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
