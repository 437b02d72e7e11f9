// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Stack-base probe (spec §4.A.1): the high address of the calling thread's
//! stack, used as the upper bound of the stack scan.

/// Returns `None` ("unknown") on platforms this probe doesn't support; the
/// mark engine treats that as "skip the stack region" (spec §4.A.1, §7).
pub fn stack_base() -> Option<usize> {
    imp::stack_base()
}

#[cfg(all(unix, not(target_vendor = "apple")))]
mod imp {
    use std::mem::MaybeUninit;

    /// Reads `(base, size)` from pthread's own stack-attribute metadata, as
    /// the teacher's `get_stack_start` does, and returns `base + size` (the
    /// high address, since the stack grows down from there).
    pub fn stack_base() -> Option<usize> {
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
            if libc::pthread_attr_init(attr.as_mut_ptr()) != 0 {
                return None;
            }
            let mut attr = attr.assume_init();

            let tid = libc::pthread_self();
            if libc::pthread_getattr_np(tid, &mut attr) != 0 {
                libc::pthread_attr_destroy(&mut attr);
                return None;
            }

            let mut stack_addr: *mut libc::c_void = std::ptr::null_mut();
            let mut stack_size: libc::size_t = 0;
            let ok =
                libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size) == 0;
            libc::pthread_attr_destroy(&mut attr);

            if !ok || stack_addr.is_null() {
                log::warn!("conservgc: pthread_attr_getstack failed, stack scan disabled");
                return None;
            }
            Some(stack_addr as usize + stack_size)
        }
    }
}

#[cfg(target_vendor = "apple")]
mod imp {
    /// Mach/Darwin exposes the same information through
    /// `pthread_get_stackaddr_np`, which already returns the *base* (high
    /// address) directly rather than `(addr, size)` of the low end.
    pub fn stack_base() -> Option<usize> {
        unsafe {
            let tid = libc::pthread_self();
            let base = libc::pthread_get_stackaddr_np(tid);
            if base.is_null() {
                log::warn!("conservgc: pthread_get_stackaddr_np failed, stack scan disabled");
                return None;
            }
            Some(base as usize)
        }
    }
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::System::Threading::GetCurrentThreadStackLimits;

    /// `GetCurrentThreadStackLimits` reports `(low, high)` directly.
    pub fn stack_base() -> Option<usize> {
        let mut low: usize = 0;
        let mut high: usize = 0;
        unsafe {
            GetCurrentThreadStackLimits(&mut low, &mut high);
        }
        if high == 0 {
            log::warn!("conservgc: GetCurrentThreadStackLimits failed, stack scan disabled");
            return None;
        }
        Some(high)
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    /// No supported backtrace/thread-metadata facility: the stack region is
    /// simply not scanned (spec §7: "the corresponding root region is
    /// empty; collection still runs on the remaining configured regions").
    pub fn stack_base() -> Option<usize> {
        log::warn!("conservgc: stack_base unsupported on this platform, stack scan disabled");
        None
    }
}
