//! RTOS thread awareness.

pub mod riot;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::TargetMemory;
use crate::profile::ArchitectureVariant;
use crate::stacking::RegisterSet;
use crate::symbols::{resolve_requirements, SymbolRequirement, SymbolResolver};

/// Thread identifier. For RIOT this is the PID, i.e. the slot index.
pub type ThreadId = u16;

/// One live thread as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDescriptor {
    /// Thread id (slot index).
    pub thread_id: ThreadId,
    /// Human readable run state.
    pub state: String,
    /// Thread name, or a placeholder when names are unavailable.
    pub name: String,
    /// Always `true`: only live threads are reported.
    pub exists: bool,
}

/// Result of one scheduler refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Thread id the scheduler reports as active. Read independently of the
    /// slot scan; it may name a thread that is not in `threads`.
    pub active_thread: ThreadId,
    /// Live thread count according to the scheduler's own counter.
    pub reported_thread_count: u32,
    /// Capacity of the thread slot table.
    pub max_threads: u8,
    /// Live threads in ascending id order.
    pub threads: Vec<ThreadDescriptor>,
}

impl SchedulerSnapshot {
    /// Look up a thread by id.
    pub fn thread(&self, thread_id: ThreadId) -> Option<&ThreadDescriptor> {
        self.threads.iter().find(|t| t.thread_id == thread_id)
    }

    /// Whether the scheduler's counter disagrees with the slots found.
    pub fn count_mismatch(&self) -> bool {
        u32::try_from(self.threads.len()).map_or(true, |n| n != self.reported_thread_count)
    }
}

/// An RTOS whose threads can be listed and inspected on a halted target.
pub trait RtosAware: Send {
    /// RTOS name.
    fn name(&self) -> &str;

    /// Symbols this RTOS needs resolved before it can run.
    fn symbol_requirements(&self) -> &'static [SymbolRequirement];

    /// Re-read the scheduler state and return the new snapshot.
    fn update_threads(&mut self, memory: &mut dyn TargetMemory) -> Result<&SchedulerSnapshot>;

    /// Decode the saved registers of one thread.
    fn thread_registers(
        &self,
        memory: &mut dyn TargetMemory,
        thread_id: ThreadId,
    ) -> Result<RegisterSet>;
}

/// Build thread awareness for the RTOS found in `symbols`, if any.
pub fn detect_rtos(
    symbols: &dyn SymbolResolver,
    variant: ArchitectureVariant,
) -> Result<Option<Box<dyn RtosAware>>> {
    if riot::Riot::detect(symbols) {
        let mut rtos = riot::Riot::new();
        rtos.attach(variant)?;
        rtos.load_symbols(&resolve_requirements(&riot::RIOT_SYMBOLS, symbols))?;
        log::info!("RIOT thread awareness initialized for {variant}");
        return Ok(Some(Box::new(rtos)));
    }
    log::debug!("No supported RTOS detected");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn riot_symbols() -> HashMap<String, u64> {
        [
            ("sched_threads", 0x2000),
            ("sched_num_threads", 0x1000),
            ("sched_active_pid", 0x1004),
            ("max_threads", 0x1008),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_detects_riot() {
        let rtos = detect_rtos(&riot_symbols(), ArchitectureVariant::CortexM3).unwrap();
        assert_eq!(rtos.map(|r| r.name().to_string()), Some("RIOT".to_string()));
    }

    #[test]
    fn test_no_rtos_without_thread_table() {
        let mut symbols = riot_symbols();
        symbols.remove("sched_threads");
        assert!(detect_rtos(&symbols, ArchitectureVariant::CortexM3).unwrap().is_none());
    }

    #[test]
    fn test_detection_fails_on_missing_required_symbol() {
        let mut symbols = riot_symbols();
        symbols.remove("max_threads");
        assert!(detect_rtos(&symbols, ArchitectureVariant::CortexM0).is_err());
    }

    #[test]
    fn test_count_mismatch_is_informational() {
        let snapshot = SchedulerSnapshot {
            active_thread: 1,
            reported_thread_count: 3,
            max_threads: 4,
            threads: vec![ThreadDescriptor {
                thread_id: 1,
                state: "Running".to_string(),
                name: "main".to_string(),
                exists: true,
            }],
        };
        assert!(snapshot.count_mismatch());
        assert_eq!(snapshot.thread(1).map(|t| t.name.as_str()), Some("main"));
        assert!(snapshot.thread(2).is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = SchedulerSnapshot {
            active_thread: 0,
            reported_thread_count: 0,
            max_threads: 8,
            threads: Vec::new(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: SchedulerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, decoded);
    }
}
