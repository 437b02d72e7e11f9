// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Architecture-specific register-snapshot primitives (spec §4.A, §6).
//!
//! Every variant exposes the same three items: `RegisterSnapshot`,
//! `capture_registers`, `current_stack_top`. Callers must treat
//! `capture_registers`/`current_stack_top` as if they were inlined at the
//! call site — see `crate::collect!`.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(target_arch = "x86")] {
        mod x86;
        pub use self::x86::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    } else if #[cfg(target_arch = "arm")] {
        mod arm;
        pub use self::arm::*;
    } else {
        compile_error!(
            "conservgc: no register-snapshot backend for this architecture; \
             supported: x86_64, x86, aarch64, arm"
        );
    }
}
