//! riotscope core: RIOT-OS thread awareness for Cortex-M debug sessions.
//!
//! This crate reads the scheduler state of a halted RIOT target through a
//! debug probe, lists its threads and decodes the registers each sleeping
//! thread saved on its stack.

pub mod error;
pub mod memory;
pub mod profile;
pub mod rtos;
pub mod stacking;
pub mod symbols;

// Re-export commonly used types
pub use error::{RtosError, TransportError};
pub use memory::{MemoryImage, TargetMemory};
pub use profile::{ArchitectureVariant, TargetProfile};
pub use rtos::riot::Riot;
pub use rtos::{detect_rtos, RtosAware, SchedulerSnapshot, ThreadDescriptor, ThreadId};
pub use stacking::{RegisterSet, RegisterValue, StackingDescriptor};
pub use symbols::{SymbolManager, SymbolRequirement, SymbolResolver};
