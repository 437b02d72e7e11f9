// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `print_state` and the ambient logging this crate layers on top of the
//! sentinel-based error model (spec §6, §7).

use crate::gc::CollectorState;
use crate::registry::Records;

/// Human-readable dump of a collector's current bookkeeping: tag, stack
/// base, static-section ranges, live allocation count, threshold, and scan
/// policy (spec §6's diagnostic `print_state`).
pub fn print_state(state: &CollectorState) {
    let inner = state.inner();
    let live = Records::new(inner.head).count();

    log::info!(
        "conservgc::state tag={:?} stack_base={:?} data={:?} bss={:?} \
         allocations_ever={} collections={} live={} threshold={} flags={:?}",
        std::str::from_utf8(&inner.tag).unwrap_or("<non-utf8>"),
        inner.stack_base,
        inner.data,
        inner.bss,
        inner.allocations,
        inner.collections,
        live,
        inner.threshold,
        inner.flags,
    );
}
