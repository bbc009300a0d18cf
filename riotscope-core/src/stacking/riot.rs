//! Context layouts saved by RIOT's Cortex-M context switch.
//!
//! RIOT pushes r4-r11 below the hardware exception frame. ARMv6-M cannot
//! `stmdb` the high registers, so Cortex-M0 ports store r8-r11 first and
//! r4-r7 above them; ARMv7-M stores them in order.

use super::{cortex_m_stack_align, StackGrowth, StackedRegister, StackingDescriptor};

/// Size of a RIOT Cortex-M context: 8 software-saved words, 8 hardware
/// words and the leading EXC_RETURN word.
const FRAME_SIZE: u32 = 0x44;

/// xPSR sits at the same offset in both layouts.
const XPSR_OFFSET: usize = 0x40;

fn riot_cortex_m_stack_align(frame: &[u8], stacking: &StackingDescriptor, stack_ptr: u32) -> u32 {
    cortex_m_stack_align(frame, stacking, stack_ptr, XPSR_OFFSET)
}

static CORTEX_M0_REGISTERS: [StackedRegister; 17] = [
    StackedRegister::word("r0", 0x24),
    StackedRegister::word("r1", 0x28),
    StackedRegister::word("r2", 0x2c),
    StackedRegister::word("r3", 0x30),
    StackedRegister::word("r4", 0x14),
    StackedRegister::word("r5", 0x18),
    StackedRegister::word("r6", 0x1c),
    StackedRegister::word("r7", 0x20),
    StackedRegister::word("r8", 0x04),
    StackedRegister::word("r9", 0x08),
    StackedRegister::word("r10", 0x0c),
    StackedRegister::word("r11", 0x10),
    StackedRegister::word("r12", 0x34),
    StackedRegister::stack_pointer("sp"),
    StackedRegister::word("lr", 0x38),
    StackedRegister::word("pc", 0x3c),
    StackedRegister::word("xPSR", XPSR_OFFSET),
];

static CORTEX_M3_REGISTERS: [StackedRegister; 17] = [
    StackedRegister::word("r0", 0x24),
    StackedRegister::word("r1", 0x28),
    StackedRegister::word("r2", 0x2c),
    StackedRegister::word("r3", 0x30),
    StackedRegister::word("r4", 0x04),
    StackedRegister::word("r5", 0x08),
    StackedRegister::word("r6", 0x0c),
    StackedRegister::word("r7", 0x10),
    StackedRegister::word("r8", 0x14),
    StackedRegister::word("r9", 0x18),
    StackedRegister::word("r10", 0x1c),
    StackedRegister::word("r11", 0x20),
    StackedRegister::word("r12", 0x34),
    StackedRegister::stack_pointer("sp"),
    StackedRegister::word("lr", 0x38),
    StackedRegister::word("pc", 0x3c),
    StackedRegister::word("xPSR", XPSR_OFFSET),
];

/// ARMv6-M (Cortex-M0/M0+).
pub static RIOT_CORTEX_M0_STACKING: StackingDescriptor = StackingDescriptor {
    frame_size: FRAME_SIZE,
    growth: StackGrowth::Down,
    registers: &CORTEX_M0_REGISTERS,
    align: riot_cortex_m_stack_align,
};

/// ARMv7-M (Cortex-M3/M4/M7).
pub static RIOT_CORTEX_M3_STACKING: StackingDescriptor = StackingDescriptor {
    frame_size: FRAME_SIZE,
    growth: StackGrowth::Down,
    registers: &CORTEX_M3_REGISTERS,
    align: riot_cortex_m_stack_align,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use crate::stacking::stack_to_registers;

    /// Fill a frame where word `n` holds `0x1000_0000 + n`.
    fn numbered_frame(mem: &mut MemoryImage, sp: u32, xpsr: u32) {
        for n in 0..0x10u32 {
            mem.write_u32(sp + n * 4, 0x1000_0000 + n);
        }
        mem.write_u32(sp + 0x40, xpsr);
    }

    #[test]
    fn test_m0_high_registers_are_stored_first() {
        let mut mem = MemoryImage::new();
        numbered_frame(&mut mem, 0x2000_1000, 0x0100_0000);

        let regs = stack_to_registers(&mut mem, &RIOT_CORTEX_M0_STACKING, 0x2000_1000).unwrap();
        assert_eq!(regs.len(), 17);
        assert_eq!(regs.get("r8"), Some(0x1000_0001));
        assert_eq!(regs.get("r4"), Some(0x1000_0005));
        assert_eq!(regs.get("r0"), Some(0x1000_0009));
        assert_eq!(regs.get("pc"), Some(0x1000_000F));
        assert_eq!(regs.get("sp"), Some(0x2000_1044));
    }

    #[test]
    fn test_m3_low_registers_are_stored_first() {
        let mut mem = MemoryImage::new();
        numbered_frame(&mut mem, 0x2000_1000, 0x0100_0000);

        let regs = stack_to_registers(&mut mem, &RIOT_CORTEX_M3_STACKING, 0x2000_1000).unwrap();
        assert_eq!(regs.get("r4"), Some(0x1000_0001));
        assert_eq!(regs.get("r8"), Some(0x1000_0005));
        assert_eq!(regs.get("r12"), Some(0x1000_000D));
        assert_eq!(regs.get("lr"), Some(0x1000_000E));
    }

    #[test]
    fn test_padded_frame_moves_stack_pointer_one_word() {
        let mut mem = MemoryImage::new();
        numbered_frame(&mut mem, 0x2000_1000, 0x0100_0200);

        let regs = stack_to_registers(&mut mem, &RIOT_CORTEX_M3_STACKING, 0x2000_1000).unwrap();
        assert_eq!(regs.get("sp"), Some(0x2000_1048));
        assert_eq!(regs.get("xPSR"), Some(0x0100_0200));
    }
}
