//! RIOT-OS scheduler reader.
//!
//! RIOT keeps one `thread_t *` per PID in `sched_threads`; a null entry is
//! an unused PID. Every refresh walks the whole table, so the result never
//! depends on the previous one.

use super::{RtosAware, SchedulerSnapshot, ThreadDescriptor, ThreadId};
use crate::error::{Result, RtosError};
use crate::memory::TargetMemory;
use crate::profile::{ArchitectureVariant, TargetProfile};
use crate::stacking::{stack_to_registers, RegisterSet};
use crate::symbols::{SymbolRequirement, SymbolResolver};

const SCHED_THREADS: &str = "sched_threads";
const SCHED_NUM_THREADS: &str = "sched_num_threads";
const SCHED_ACTIVE_PID: &str = "sched_active_pid";
const MAX_THREADS: &str = "max_threads";
const TCB_NAME_OFFSET: &str = "_tcb_name_offset";

/// Symbols RIOT thread awareness needs. `_tcb_name_offset` only exists in
/// firmware built with `DEVELHELP`.
pub static RIOT_SYMBOLS: [SymbolRequirement; 5] = [
    SymbolRequirement::required(SCHED_THREADS),
    SymbolRequirement::required(SCHED_NUM_THREADS),
    SymbolRequirement::required(SCHED_ACTIVE_PID),
    SymbolRequirement::required(MAX_THREADS),
    SymbolRequirement::optional(TCB_NAME_OFFSET),
];

/// Size of a target pointer in the slot table.
const POINTER_SIZE: u32 = 4;

/// Bytes read for a thread name, terminator included.
pub const NAME_BUFFER_LEN: usize = 32;

/// Name reported for every thread when the firmware carries no names.
pub const NAMES_UNAVAILABLE: &str = "Enable DEVELHELP to see thread names";

/// Name reported for a thread whose name pointer is null.
pub const UNNAMED: &str = "(unnamed)";

/// Label for status codes outside the table.
pub const UNKNOWN_STATE: &str = "unknown state";

/// `thread_status_t` values, see RIOT's `thread.h`.
const THREAD_STATES: [(u16, &str); 8] = [
    (0, "Stopped"),
    (1, "Sleeping"),
    (2, "Mutex blocked"),
    (3, "Receive blocked"),
    (4, "Send blocked"),
    (5, "Reply blocked"),
    (6, "Running"),
    (7, "Pending"),
];

/// Human readable label for a raw thread status.
pub fn state_label(status: u16) -> &'static str {
    THREAD_STATES
        .iter()
        .find(|(code, _)| *code == status)
        .map_or(UNKNOWN_STATE, |&(_, label)| label)
}

/// Resolved addresses of the scheduler globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RiotSymbols {
    threads_base: u32,
    num_threads: u32,
    active_pid: u32,
    max_threads: u32,
    name_offset: Option<u32>,
}

impl RiotSymbols {
    fn from_requirements(resolved: &[SymbolRequirement]) -> Result<Self> {
        if resolved.iter().all(|r| r.address.is_none()) {
            return Err(RtosError::NoSymbols);
        }

        let lookup = |name: &'static str| -> Option<u32> {
            let address = resolved.iter().find(|r| r.name == name)?.resolved()?;
            let narrowed = u32::try_from(address).ok();
            if narrowed.is_none() {
                log::warn!("Symbol `{name}` at 0x{address:X} is outside the 32-bit address space");
            }
            narrowed
        };
        let require =
            |name: &'static str| lookup(name).ok_or(RtosError::MissingRequiredSymbol(name));

        Ok(Self {
            threads_base: require(SCHED_THREADS)?,
            num_threads: require(SCHED_NUM_THREADS)?,
            active_pid: require(SCHED_ACTIVE_PID)?,
            max_threads: require(MAX_THREADS)?,
            name_offset: lookup(TCB_NAME_OFFSET),
        })
    }

    fn slot_address(&self, index: ThreadId) -> u32 {
        self.threads_base.wrapping_add(u32::from(index) * POINTER_SIZE)
    }
}

fn log_failure(what: &'static str) -> impl FnOnce(RtosError) -> RtosError {
    move |e| {
        log::error!("Couldn't read `{what}`: {e}");
        e
    }
}

/// RIOT thread awareness for one attached target.
#[derive(Debug, Default)]
pub struct Riot {
    profile: Option<&'static TargetProfile>,
    symbols: Option<RiotSymbols>,
    snapshot: Option<SchedulerSnapshot>,
}

impl Riot {
    /// Create an engine with no profile, symbols or data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `symbols` look like a RIOT firmware.
    pub fn detect(symbols: &dyn SymbolResolver) -> bool {
        symbols.resolve(SCHED_THREADS).is_some_and(|addr| addr != 0)
    }

    /// The static symbol declaration.
    pub fn symbol_list() -> &'static [SymbolRequirement] {
        &RIOT_SYMBOLS
    }

    /// Select and bind the profile for the attached core.
    pub fn attach(&mut self, variant: ArchitectureVariant) -> Result<&'static TargetProfile> {
        let profile = TargetProfile::resolve(variant)?;
        self.bind_profile(profile);
        Ok(profile)
    }

    /// Bind an explicit profile.
    pub fn bind_profile(&mut self, profile: &'static TargetProfile) {
        log::debug!("Bound RIOT profile for {}", profile.variant);
        self.profile = Some(profile);
        self.snapshot = None;
    }

    /// The bound profile, if any.
    pub const fn profile(&self) -> Option<&'static TargetProfile> {
        self.profile
    }

    /// Accept resolved symbols. Fails if a required one is missing or zero,
    /// in which case any earlier binding and snapshot are dropped too.
    pub fn load_symbols(&mut self, resolved: &[SymbolRequirement]) -> Result<()> {
        self.symbols = None;
        self.snapshot = None;
        let symbols = RiotSymbols::from_requirements(resolved)?;
        if symbols.name_offset.is_none() {
            log::info!("`{TCB_NAME_OFFSET}` not found, thread names unavailable");
        }
        self.symbols = Some(symbols);
        Ok(())
    }

    /// Last successfully published snapshot. `None` before the first
    /// refresh and after a failed one.
    pub const fn snapshot(&self) -> Option<&SchedulerSnapshot> {
        self.snapshot.as_ref()
    }

    fn bound(&self) -> Result<(&'static TargetProfile, RiotSymbols)> {
        let profile = self.profile.ok_or(RtosError::UnboundProfile)?;
        let symbols = self.symbols.ok_or(RtosError::NoSymbols)?;
        Ok((profile, symbols))
    }

    /// Re-read the scheduler state. On failure the previous snapshot is gone
    /// and the error from the failing read is returned.
    pub fn refresh(&mut self, memory: &mut dyn TargetMemory) -> Result<&SchedulerSnapshot> {
        let (profile, symbols) = self.bound()?;
        self.snapshot = None;
        let snapshot = read_scheduler(memory, profile, &symbols)?;
        Ok(self.snapshot.insert(snapshot))
    }

    /// Decode the registers `thread_id` saved when it was switched out.
    ///
    /// The slot table is re-read, so this works on whatever the target holds
    /// now rather than on the last snapshot.
    pub fn get_registers(
        &self,
        memory: &mut dyn TargetMemory,
        thread_id: ThreadId,
    ) -> Result<RegisterSet> {
        if thread_id == 0 {
            return Err(RtosError::InvalidThreadId(thread_id));
        }
        let (profile, symbols) = self.bound()?;

        let max_threads = memory.read_u8(symbols.max_threads).map_err(log_failure(MAX_THREADS))?;
        if thread_id >= ThreadId::from(max_threads) {
            return Err(RtosError::InvalidThreadId(thread_id));
        }

        let tcb = memory.read_u32(symbols.slot_address(thread_id))?;
        if tcb == 0 {
            return Err(RtosError::ThreadNotFound(thread_id));
        }

        let stack_ptr = memory.read_u32(tcb.wrapping_add(profile.thread_sp_offset))?;
        if stack_ptr == 0 {
            return Err(RtosError::NullStackPointer(thread_id));
        }
        log::debug!("Thread {thread_id}: tcb 0x{tcb:08X}, sp 0x{stack_ptr:08X}");

        stack_to_registers(memory, profile.stacking, stack_ptr)
    }
}

fn read_scheduler(
    memory: &mut dyn TargetMemory,
    profile: &TargetProfile,
    symbols: &RiotSymbols,
) -> Result<SchedulerSnapshot> {
    let active_thread = memory.read_u16(symbols.active_pid).map_err(log_failure(SCHED_ACTIVE_PID))?;
    let reported_thread_count =
        memory.read_u32(symbols.num_threads).map_err(log_failure(SCHED_NUM_THREADS))?;
    let max_threads = memory.read_u8(symbols.max_threads).map_err(log_failure(MAX_THREADS))?;

    let name_offset = match symbols.name_offset {
        Some(addr) => memory.read_u8(addr).map_err(log_failure(TCB_NAME_OFFSET))?,
        None => 0,
    };

    let mut threads = Vec::new();
    for index in 0..ThreadId::from(max_threads) {
        let tcb = memory.read_u32(symbols.slot_address(index)).map_err(log_failure(SCHED_THREADS))?;
        if tcb == 0 {
            continue;
        }

        let status = memory.read_u16(tcb.wrapping_add(profile.thread_status_offset))?;
        let state = state_label(status);
        if state == UNKNOWN_STATE {
            log::debug!("Thread {index} has unknown status {status}");
        }

        let name = if name_offset == 0 {
            NAMES_UNAVAILABLE.to_string()
        } else {
            let name_ptr = memory.read_u32(tcb.wrapping_add(u32::from(name_offset)))?;
            if name_ptr == 0 {
                UNNAMED.to_string()
            } else {
                memory.read_c_string(name_ptr, NAME_BUFFER_LEN)?
            }
        };

        threads.push(ThreadDescriptor {
            thread_id: index,
            state: state.to_string(),
            name,
            exists: true,
        });
    }

    let snapshot = SchedulerSnapshot { active_thread, reported_thread_count, max_threads, threads };
    if snapshot.count_mismatch() {
        log::debug!(
            "sched_num_threads reports {} threads, found {} in the slot table",
            snapshot.reported_thread_count,
            snapshot.threads.len()
        );
    }
    Ok(snapshot)
}

impl RtosAware for Riot {
    fn name(&self) -> &str {
        "RIOT"
    }

    fn symbol_requirements(&self) -> &'static [SymbolRequirement] {
        Self::symbol_list()
    }

    fn update_threads(&mut self, memory: &mut dyn TargetMemory) -> Result<&SchedulerSnapshot> {
        self.refresh(memory)
    }

    fn thread_registers(
        &self,
        memory: &mut dyn TargetMemory,
        thread_id: ThreadId,
    ) -> Result<RegisterSet> {
        self.get_registers(memory, thread_id)
    }
}
