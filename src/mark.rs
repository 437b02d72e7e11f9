// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Module D: the mark engine. Root-set assembly, conservative pointer
//! recognition, and transitive marking (spec §4.D).

use crate::gc::{CollectorStateInner, STATE_TAG};
use crate::registry::{self, AllocRecord, Records};
use crate::{platform, ScanPolicy};
use std::mem;
use std::ptr;

const WORD: usize = mem::size_of::<usize>();

/// A region pending scan, together with whether it needs the self-tag
/// check (heap regions do, since the collector's own bookkeeping may live
/// inside them; stack/data/bss never contain tags, per spec §4.D).
type PendingRegion = (usize, usize, bool);

/// Drives one full root-set assembly + transitive mark, exactly following
/// spec §4.D's five root-scanning steps. Recursion into a newly-marked
/// record's payload is implemented as an explicit worklist rather than
/// function-call recursion, per spec §9's guidance for platforms with
/// small default stacks — a long pointer chain must not itself overflow
/// the native stack during marking.
///
/// # Safety
/// `inner` must be a live, exclusively-owned `CollectorStateInner`, and
/// `stack_top` must be a stack-pointer value captured at (or above) the
/// caller's own frame.
pub(crate) unsafe fn mark_roots(inner: &mut CollectorStateInner, stack_top: usize) {
    // Step 1: reset reachability, then pre-mark from the register snapshot.
    for record in Records::new(inner.head) {
        (*record).reachable = false;
        (*record).reach_addr = ptr::null();
    }

    let mut worklist: Vec<PendingRegion> = Vec::new();

    if inner.flags.contains(ScanPolicy::REGISTERS) {
        let snapshot = platform::registers::snapshot();
        for word in snapshot.words() {
            try_mark(inner, word, ptr::null(), &mut worklist);
        }
    }

    // Step 2: stack, `[current_stack_top, stack_base)`.
    if inner.flags.contains(ScanPolicy::STACK) {
        if let Some(base) = inner.stack_base {
            worklist.push((stack_top, base, false));
        }
    }

    // Step 3: data section.
    if inner.flags.contains(ScanPolicy::DATA) {
        if let Some(region) = inner.data {
            worklist.push((region.start, region.end, false));
        }
    }

    // Step 4: bss section.
    if inner.flags.contains(ScanPolicy::BSS) {
        if let Some(region) = inner.bss {
            worklist.push((region.start, region.end, false));
        }
    }

    // Step 5: heap regions. The array is freshly allocated by the probe
    // and owned here; it's dropped at the end of this function, which
    // satisfies spec §5's "must be released on every collection, including
    // early-exit paths" without any extra bookkeeping.
    let heap_regions = if inner.flags.contains(ScanPolicy::HEAPS) {
        let regions = platform::heap_regions();
        for region in &regions {
            worklist.push((region.start, region.end, true));
        }
        regions
    } else {
        Vec::new()
    };

    while let Some((low, high, check_tags)) = worklist.pop() {
        scan_region(inner, low, high, check_tags, &mut worklist);
    }

    drop(heap_regions);
}

/// Scans `[low, high - pointer_size]` inclusive at pointer-size stride
/// (spec §4.D). `check_tags` gates the self-bookkeeping skip, the *only*
/// reason heap-region scanning is safe per spec's own framing.
unsafe fn scan_region(
    inner: &mut CollectorStateInner,
    low: usize,
    high: usize,
    check_tags: bool,
    worklist: &mut Vec<PendingRegion>,
) {
    if high < low || high - low < WORD {
        return;
    }

    let mut p = align_up(low, WORD);
    let end = high - WORD;

    while p <= end {
        if check_tags && region_matches_record_tag(p, high) {
            p += mem::size_of::<AllocRecord>();
            continue;
        }
        if check_tags && region_matches_state_tag(p, high) {
            p += mem::size_of::<CollectorStateInner>();
            continue;
        }

        // I5: pointer-shaped reads are aligned, so a plain (not
        // `read_unaligned`) read is sound here.
        let value = (p as *const usize).read();
        try_mark(inner, value, p as *const u8, worklist);
        p += WORD;
    }
}

unsafe fn region_matches_record_tag(p: usize, high: usize) -> bool {
    p + registry::RECORD_TAG.len() <= high
        && std::slice::from_raw_parts(p as *const u8, registry::RECORD_TAG.len())
            == registry::RECORD_TAG
}

unsafe fn region_matches_state_tag(p: usize, high: usize) -> bool {
    p + STATE_TAG.len() <= high
        && std::slice::from_raw_parts(p as *const u8, STATE_TAG.len()) == STATE_TAG
}

/// If `value` equals the base of an as-yet-unmarked tracked record, marks
/// it reachable and enqueues its payload for a tag-checked scan (spec
/// §4.D step 2: "recurse: mark `[e.ptr, e.ptr + e.size)` with
/// `check_tags = true`, because the payload may contain further tracked
/// pointers, and payloads themselves do not contain the tags").
///
/// Any bit pattern equal to a tracked base marks that record, even if
/// coincidental (a float, an integer, a stale value) — this is the
/// accepted conservatism of the whole design, not a bug.
unsafe fn try_mark(
    inner: &CollectorStateInner,
    value: usize,
    found_at: *const u8,
    worklist: &mut Vec<PendingRegion>,
) {
    let candidate = value as *mut u8;
    if candidate.is_null() {
        return;
    }
    let record = registry::find_by_base(inner.head, candidate);
    if record.is_null() || (*record).reachable {
        return;
    }

    (*record).reachable = true;
    (*record).reach_addr = found_at;

    let payload_lo = (*record).ptr as usize;
    let payload_hi = payload_lo + (*record).size;
    worklist.push((payload_lo, payload_hi, true));
}

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{self, CollectorPhase};
    use crate::registry::push_front;
    use parking_lot::Mutex;
    use std::alloc::{alloc, dealloc, Layout};

    unsafe fn bare_state() -> CollectorStateInner {
        CollectorStateInner {
            tag: gc::STATE_TAG,
            stack_base: None,
            data: None,
            bss: None,
            common: None,
            head: ptr::null_mut(),
            allocations: 0,
            collections: 0,
            threshold: gc::DEFAULT_THRESHOLD,
            flags: ScanPolicy::EVERYTHING_EXCEPT_HEAPS,
            phases: gc::CollectPhases::default(),
            phase: Mutex::new(CollectorPhase::Ready),
        }
    }

    #[test]
    fn stack_scan_marks_a_pointer_held_in_a_local() {
        unsafe {
            let layout = Layout::new::<usize>();
            let payload = alloc(layout);
            let record = Box::into_raw(Box::new(AllocRecord::new(payload, layout.size())));

            let mut state = bare_state();
            push_front(&mut state.head, record);

            // A stack-resident local holding the tracked base, inside a
            // region we scan explicitly rather than relying on a live
            // register/call-site capture.
            let root_slot: *mut u8 = payload;
            let low = &root_slot as *const _ as usize;
            let high = low + WORD;

            mark_roots_over_region(&mut state, low, high);

            assert!((*record).reachable);

            registry::unlink(&mut state.head, record);
            drop(Box::from_raw(record));
            dealloc(payload, layout);
        }
    }

    #[test]
    fn unrooted_record_is_not_marked() {
        unsafe {
            let layout = Layout::new::<usize>();
            let payload = alloc(layout);
            let record = Box::into_raw(Box::new(AllocRecord::new(payload, layout.size())));

            let mut state = bare_state();
            push_front(&mut state.head, record);

            // Scan an unrelated region that never holds the pointer.
            let unrelated: usize = 0;
            let low = &unrelated as *const _ as usize;
            let high = low + WORD;
            mark_roots_over_region(&mut state, low, high);

            assert!(!(*record).reachable);

            registry::unlink(&mut state.head, record);
            drop(Box::from_raw(record));
            dealloc(payload, layout);
        }
    }

    #[test]
    fn heap_scan_skips_its_own_record_tag() {
        unsafe {
            // Lay a tagged record directly in memory and scan straight
            // over it with `check_tags = true`; it must not "discover"
            // its own tag bytes or `ptr`/`next` fields as if they were
            // mutator data (spec §8 boundary scenario 8).
            let layout = Layout::new::<usize>();
            let payload = alloc(layout);
            let mut record = AllocRecord::new(payload, layout.size());
            let mut state = bare_state();

            let low = &record as *const _ as usize;
            let high = low + mem::size_of::<AllocRecord>();
            let mut worklist = Vec::new();
            scan_region(&mut state, low, high, true, &mut worklist);

            // No spurious region was queued from scanning the record's own
            // bytes (its `ptr`/`prev`/`next` fields are not tracked bases).
            assert!(worklist.is_empty());

            dealloc(payload, layout);
            // `record` is stack-local; nothing to free for it directly.
            let _ = &mut record;
        }
    }

    unsafe fn mark_roots_over_region(state: &mut CollectorStateInner, low: usize, high: usize) {
        for r in Records::new(state.head) {
            (*r).reachable = false;
        }
        let mut worklist = vec![(low, high, false)];
        while let Some((lo, hi, tags)) = worklist.pop() {
            scan_region(state, lo, hi, tags, &mut worklist);
        }
    }
}
