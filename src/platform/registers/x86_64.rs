// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! 64-bit x86 register snapshot.
//!
//! Layout is fixed by spec: rax, rbx, rcx, rdx, rsi, rdi, rbp, rsp, r8..r15.

use core::arch::asm;
use core::ptr::addr_of_mut;

pub const GPR_COUNT: usize = 16;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterSnapshot {
    pub rax: usize,
    pub rbx: usize,
    pub rcx: usize,
    pub rdx: usize,
    pub rsi: usize,
    pub rdi: usize,
    pub rbp: usize,
    pub rsp: usize,
    pub r8: usize,
    pub r9: usize,
    pub r10: usize,
    pub r11: usize,
    pub r12: usize,
    pub r13: usize,
    pub r14: usize,
    pub r15: usize,
}

impl RegisterSnapshot {
    /// Word-at-a-time view used by the mark engine; order doesn't matter,
    /// only that every GPR slot is visited.
    pub fn words(&self) -> [usize; GPR_COUNT] {
        [
            self.rax, self.rbx, self.rcx, self.rdx, self.rsi, self.rdi, self.rbp, self.rsp,
            self.r8, self.r9, self.r10, self.r11, self.r12, self.r13, self.r14, self.r15,
        ]
    }
}

/// Process-global register-snapshot buffer (spec I6: statically addressable
/// so the save sequence needs no scratch register to locate it).
static mut REGISTER_SNAPSHOT: RegisterSnapshot = RegisterSnapshot {
    rax: 0,
    rbx: 0,
    rcx: 0,
    rdx: 0,
    rsi: 0,
    rdi: 0,
    rbp: 0,
    rsp: 0,
    r8: 0,
    r9: 0,
    r10: 0,
    r11: 0,
    r12: 0,
    r13: 0,
    r14: 0,
    r15: 0,
};

/// Writes every general-purpose register into [`REGISTER_SNAPSHOT`].
///
/// Must be expanded inline at the `collect!` call site, never through an
/// ordinary function call — a call's own prologue/epilogue is free to
/// reuse caller-saved registers before we get a chance to read them. The
/// buffer's address is encoded as a RIP-relative memory operand (`sym`),
/// so no general-purpose register is spent addressing it and every GPR in
/// the snapshot is genuinely the caller's value.
#[inline(always)]
pub unsafe fn capture_registers() {
    asm!(
        "mov [{snap} + 0x00], rax",
        "mov [{snap} + 0x08], rbx",
        "mov [{snap} + 0x10], rcx",
        "mov [{snap} + 0x18], rdx",
        "mov [{snap} + 0x20], rsi",
        "mov [{snap} + 0x28], rdi",
        "mov [{snap} + 0x30], rbp",
        "mov [{snap} + 0x38], rsp",
        "mov [{snap} + 0x40], r8",
        "mov [{snap} + 0x48], r9",
        "mov [{snap} + 0x50], r10",
        "mov [{snap} + 0x58], r11",
        "mov [{snap} + 0x60], r12",
        "mov [{snap} + 0x68], r13",
        "mov [{snap} + 0x70], r14",
        "mov [{snap} + 0x78], r15",
        snap = sym REGISTER_SNAPSHOT,
        options(nostack, preserves_flags),
    );
}

/// Returns the stack pointer at the caller's frame. Must be `#[inline(always)]`
/// and called from the same frame that uses the result — wrapping it in a
/// non-inlined call would read the *callee's* rsp, one frame too deep.
#[inline(always)]
pub fn current_stack_top() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {0}, rsp", out(reg) sp, options(nostack, preserves_flags, nomem));
    }
    sp
}

/// Reads back the last captured snapshot.
pub fn snapshot() -> RegisterSnapshot {
    unsafe { *addr_of_mut!(REGISTER_SNAPSHOT) }
}
