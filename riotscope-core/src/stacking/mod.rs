//! Saved-context layouts and the generic stack-to-registers conversion.
//!
//! A [`StackingDescriptor`] says where every architectural register sits in
//! the frame a thread leaves on its stack when it is switched out. The
//! conversion itself is layout-agnostic: read the frame, let the
//! descriptor's alignment rule correct the stack pointer, then pick each
//! register out of the frame.

pub mod riot;

use serde::Serialize;

use crate::error::Result;
use crate::memory::TargetMemory;

/// Direction the stack grows in when data is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StackGrowth {
    /// Towards higher addresses.
    Up,
    /// Towards lower addresses (every Cortex-M).
    Down,
}

/// Where a register's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLocation {
    /// Byte offset inside the saved frame.
    Frame(usize),
    /// The thread's stack pointer after unwinding the frame.
    StackPointer,
    /// Not saved by this layout; reported as zero.
    Unavailable,
}

/// One register entry of a layout, in canonical register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackedRegister {
    /// Register name as shown to the user.
    pub name: &'static str,
    /// Where to find the value.
    pub location: RegisterLocation,
    /// Width in bits; always a multiple of 8.
    pub bits: u8,
}

impl StackedRegister {
    /// A 32-bit register saved at `offset`.
    pub const fn word(name: &'static str, offset: usize) -> Self {
        Self { name, location: RegisterLocation::Frame(offset), bits: 32 }
    }

    /// The 32-bit stack pointer slot.
    pub const fn stack_pointer(name: &'static str) -> Self {
        Self { name, location: RegisterLocation::StackPointer, bits: 32 }
    }
}

/// Computes the thread's real stack pointer from the raw frame and the
/// stack pointer stored in its control block.
pub type StackAlignFn = fn(frame: &[u8], stacking: &StackingDescriptor, stack_ptr: u32) -> u32;

/// Layout of a saved thread context.
#[derive(Clone, Copy)]
pub struct StackingDescriptor {
    /// Number of bytes the context occupies on the stack.
    pub frame_size: u32,
    /// Stack growth direction.
    pub growth: StackGrowth,
    /// Registers in canonical order.
    pub registers: &'static [StackedRegister],
    /// Stack pointer correction rule.
    pub align: StackAlignFn,
}

impl std::fmt::Debug for StackingDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackingDescriptor")
            .field("frame_size", &self.frame_size)
            .field("growth", &self.growth)
            .field("registers", &self.registers)
            .finish_non_exhaustive()
    }
}

impl StackingDescriptor {
    /// Address the frame starts at, given the saved stack pointer.
    pub const fn frame_address(&self, stack_ptr: u32) -> u32 {
        match self.growth {
            StackGrowth::Down => stack_ptr,
            StackGrowth::Up => stack_ptr.wrapping_sub(self.frame_size),
        }
    }

    /// Stack pointer once the frame has been popped, ignoring padding.
    pub const fn unwound_stack_pointer(&self, stack_ptr: u32) -> u32 {
        match self.growth {
            StackGrowth::Down => stack_ptr.wrapping_add(self.frame_size),
            StackGrowth::Up => stack_ptr.wrapping_sub(self.frame_size),
        }
    }
}

/// Alignment rule for layouts without hardware padding.
pub fn default_stack_align(_frame: &[u8], stacking: &StackingDescriptor, stack_ptr: u32) -> u32 {
    stacking.unwound_stack_pointer(stack_ptr)
}

/// Bit 9 of the stacked xPSR: the core inserted a padding word on
/// exception entry to keep the stack 8-byte aligned.
const XPSR_STACK_ALIGN: u32 = 1 << 9;

/// Cortex-M alignment rule, reading the stacked xPSR at `xpsr_offset`.
pub fn cortex_m_stack_align(
    frame: &[u8],
    stacking: &StackingDescriptor,
    stack_ptr: u32,
    xpsr_offset: usize,
) -> u32 {
    let unwound = stacking.unwound_stack_pointer(stack_ptr);
    let Some(xpsr) = read_le(frame, xpsr_offset, 4) else {
        log::warn!("xPSR offset 0x{xpsr_offset:02X} outside a {}-byte frame", frame.len());
        return unwound;
    };
    if xpsr & u64::from(XPSR_STACK_ALIGN) == 0 {
        return unwound;
    }
    log::debug!("xPSR 0x{xpsr:08X} indicates stack alignment padding");
    match stacking.growth {
        StackGrowth::Down => unwound.wrapping_add(4),
        StackGrowth::Up => unwound.wrapping_sub(4),
    }
}

fn read_le(frame: &[u8], offset: usize, len: usize) -> Option<u64> {
    let bytes = frame.get(offset..offset.checked_add(len)?)?;
    Some(bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

const fn width_mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterValue {
    /// Register name.
    pub name: &'static str,
    /// Value, zero-extended.
    pub value: u64,
    /// Architectural width in bits.
    pub bits: u8,
}

/// Full register set of one thread, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterSet {
    registers: Vec<RegisterValue>,
}

impl RegisterSet {
    /// Registers in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterValue> {
        self.registers.iter()
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether the set holds no registers.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Value of the register called `name`.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.registers.iter().find(|r| r.name == name).map(|r| r.value)
    }

    /// Encode as a GDB remote-protocol `g` reply: every register in target
    /// byte order, hex encoded, concatenated.
    pub fn to_gdb_hex(&self) -> String {
        self.registers
            .iter()
            .map(|r| {
                let bytes = r.value.to_le_bytes();
                hex::encode(&bytes[..usize::from(r.bits / 8).min(bytes.len())])
            })
            .collect()
    }
}

/// Decode a saved context: read the frame at `stack_ptr` and map every
/// register of `stacking` out of it.
pub fn stack_to_registers(
    memory: &mut dyn TargetMemory,
    stacking: &StackingDescriptor,
    stack_ptr: u32,
) -> Result<RegisterSet> {
    let frame_len = usize::try_from(stacking.frame_size).unwrap_or(usize::MAX);
    let frame = memory.read_block(stacking.frame_address(stack_ptr), frame_len)?;
    let new_stack_ptr = (stacking.align)(&frame, stacking, stack_ptr);
    log::debug!("Stack pointer 0x{stack_ptr:08X} unwinds to 0x{new_stack_ptr:08X}");

    let registers = stacking
        .registers
        .iter()
        .map(|reg| {
            let value = match reg.location {
                RegisterLocation::Frame(offset) => {
                    read_le(&frame, offset, usize::from(reg.bits / 8)).unwrap_or_else(|| {
                        log::warn!(
                            "Register {} at 0x{offset:02X} lies outside the frame",
                            reg.name
                        );
                        0
                    })
                }
                RegisterLocation::StackPointer => u64::from(new_stack_ptr),
                RegisterLocation::Unavailable => 0,
            };
            RegisterValue { name: reg.name, value: value & width_mask(reg.bits), bits: reg.bits }
        })
        .collect();

    Ok(RegisterSet { registers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;

    static TINY_REGS: [StackedRegister; 4] = [
        StackedRegister::word("a", 0x00),
        StackedRegister::stack_pointer("sp"),
        StackedRegister { name: "half", location: RegisterLocation::Frame(0x04), bits: 16 },
        StackedRegister { name: "none", location: RegisterLocation::Unavailable, bits: 32 },
    ];

    static TINY_DOWN: StackingDescriptor = StackingDescriptor {
        frame_size: 8,
        growth: StackGrowth::Down,
        registers: &TINY_REGS,
        align: default_stack_align,
    };

    #[test]
    fn test_downward_frame_is_read_from_stack_pointer() {
        let mut mem = MemoryImage::new();
        mem.write_u32(0x1000, 0xDEAD_BEEF);
        mem.write_u32(0x1004, 0x0001_ABCD);

        let regs = stack_to_registers(&mut mem, &TINY_DOWN, 0x1000).unwrap();
        assert_eq!(regs.len(), 4);
        assert_eq!(regs.get("a"), Some(0xDEAD_BEEF));
        assert_eq!(regs.get("sp"), Some(0x1008));
        assert_eq!(regs.get("half"), Some(0xABCD));
        assert_eq!(regs.get("none"), Some(0));
    }

    #[test]
    fn test_upward_frame_sits_below_stack_pointer() {
        let up = StackingDescriptor { growth: StackGrowth::Up, ..TINY_DOWN };
        let mut mem = MemoryImage::new();
        mem.write_u32(0x0FF8, 0x1234_5678);

        let regs = stack_to_registers(&mut mem, &up, 0x1000).unwrap();
        assert_eq!(regs.get("a"), Some(0x1234_5678));
        assert_eq!(regs.get("sp"), Some(0x0FF8));
    }

    #[test]
    fn test_cortex_m_alignment_adds_padding_word() {
        let mut frame = vec![0u8; 8];
        let desc = TINY_DOWN;
        assert_eq!(cortex_m_stack_align(&frame, &desc, 0x1000, 4), 0x1008);

        frame[4..8].copy_from_slice(&XPSR_STACK_ALIGN.to_le_bytes());
        assert_eq!(cortex_m_stack_align(&frame, &desc, 0x1000, 4), 0x100C);
    }

    #[test]
    fn test_frame_read_failure_propagates() {
        let mut mem = MemoryImage::new();
        mem.fault_at(0x1004);
        assert!(stack_to_registers(&mut mem, &TINY_DOWN, 0x1000).is_err());
    }

    #[test]
    fn test_gdb_hex_is_little_endian_per_register() {
        let mut mem = MemoryImage::new();
        mem.write_u32(0x1000, 0x0403_0201);
        let regs = stack_to_registers(&mut mem, &TINY_DOWN, 0x1000).unwrap();

        assert_eq!(regs.to_gdb_hex(), "0102030408100000000000000000");
    }
}
