// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Writable heap-region enumeration (spec §4.A.4): regions considered
//! "heap-like" on this process, returned fresh on every call.

use crate::Region;

/// The caller owns the returned `Vec` and is responsible for dropping it
/// promptly after a scan (spec §5: "must be released on every collection,
/// including early-exit paths") — ordinary `Vec` drop semantics satisfy
/// this without any extra bookkeeping.
pub fn heap_regions() -> Vec<Region> {
    imp::heap_regions()
}

#[cfg(all(target_os = "linux", not(target_vendor = "apple")))]
mod imp {
    use super::Region;
    use std::fs;

    /// Parses `/proc/self/maps`. Columns are `start-end perms offset dev
    /// inode path`; spec §4.A.4 wants `rw-p` regions whose pathname is
    /// empty, the literal heap tag, or a bracketed anonymous entry (e.g.
    /// `[heap]`, `[anon:...]`) — i.e. not a file-backed mapping and not
    /// shared.
    pub fn heap_regions() -> Vec<Region> {
        let maps = match fs::read_to_string("/proc/self/maps") {
            Ok(s) => s,
            Err(e) => {
                log::warn!("conservgc: failed to read /proc/self/maps: {e}");
                return Vec::new();
            }
        };

        let mut regions = Vec::new();
        for line in maps.lines() {
            let mut fields = line.splitn(6, ' ').filter(|f| !f.is_empty());
            let Some(range) = fields.next() else { continue };
            let Some(perms) = fields.next() else { continue };
            let path = fields.nth(3).unwrap_or("").trim();

            if !perms.starts_with("rw-p") {
                continue;
            }
            let heap_like = path.is_empty() || path == "[heap]" || path.starts_with('[');
            if !heap_like {
                continue;
            }

            let Some((start, end)) = range.split_once('-') else { continue };
            let (Ok(start), Ok(end)) = (
                usize::from_str_radix(start, 16),
                usize::from_str_radix(end, 16),
            ) else {
                continue;
            };
            regions.push(Region { start, end });
        }
        regions
    }
}

#[cfg(target_vendor = "apple")]
mod imp {
    use super::Region;
    use mach2::kern_return::KERN_SUCCESS;
    use mach2::traps::mach_task_self;
    use mach2::vm::mach_vm_region_recurse;
    use mach2::vm_region::vm_region_submap_info_64;
    use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t};

    /// Iterates VM regions via `mach_vm_region_recurse`, keeping the ones
    /// with write protection, `PRIVATE` share mode, and that aren't
    /// themselves submaps (spec §4.A.4).
    pub fn heap_regions() -> Vec<Region> {
        let mut regions = Vec::new();
        let task = unsafe { mach_task_self() };
        let mut address: mach_vm_address_t = 1;

        loop {
            let mut size: mach_vm_size_t = 0;
            let mut depth: u32 = 0;
            let mut info = vm_region_submap_info_64::default();
            let mut info_count =
                (std::mem::size_of_val(&info) / std::mem::size_of::<u32>()) as u32;

            let kr = unsafe {
                mach_vm_region_recurse(
                    task,
                    &mut address,
                    &mut size,
                    &mut depth,
                    &mut info as *mut _ as *mut _,
                    &mut info_count,
                )
            };
            if kr != KERN_SUCCESS {
                break;
            }

            let writable = info.protection & mach2::vm_prot::VM_PROT_WRITE != 0;
            let private = info.share_mode == mach2::vm_region::SM_PRIVATE;
            let is_submap = info.is_submap != 0;
            if writable && private && !is_submap {
                regions.push(Region {
                    start: address as usize,
                    end: address as usize + size as usize,
                });
            }

            address += size;
        }
        regions
    }
}

#[cfg(windows)]
mod imp {
    use super::Region;
    use windows_sys::Win32::System::Memory::{
        VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT, MEM_PRIVATE, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    /// Walks the process address space via `VirtualQuery` from
    /// `lpMinimumApplicationAddress` to `lpMaximumApplicationAddress`,
    /// keeping `MEM_COMMIT | MEM_PRIVATE` regions with write access
    /// (spec §4.A.4).
    pub fn heap_regions() -> Vec<Region> {
        let mut sys_info = SYSTEM_INFO::default();
        unsafe { GetSystemInfo(&mut sys_info) };

        let mut address = sys_info.lpMinimumApplicationAddress as usize;
        let max = sys_info.lpMaximumApplicationAddress as usize;
        let mut regions = Vec::new();

        while address < max {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let written = unsafe {
                VirtualQuery(
                    address as *const _,
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                break;
            }

            let writable = info.State == MEM_COMMIT
                && info.Type == MEM_PRIVATE
                && (info.Protect & PAGE_READWRITE) != 0;
            if writable {
                regions.push(Region {
                    start: info.BaseAddress as usize,
                    end: info.BaseAddress as usize + info.RegionSize,
                });
            }

            address = info.BaseAddress as usize + info.RegionSize;
        }
        regions
    }
}

#[cfg(not(any(all(target_os = "linux", not(target_vendor = "apple")), target_vendor = "apple", windows)))]
mod imp {
    use super::Region;

    pub fn heap_regions() -> Vec<Region> {
        log::warn!("conservgc: heap-region enumeration unsupported, heap scan disabled");
        Vec::new()
    }
}
