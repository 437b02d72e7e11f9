// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Static-section range probes (spec §4.A.3): the `[start, end)` ranges of
//! the initialised (`data`) and zero-initialised (`bss`) sections.

use crate::Region;

/// Returns `(data, bss)`. Either half may be `None` on a platform where the
/// corresponding boundary couldn't be located; the mark engine treats a
/// missing range as empty, not an error (spec §7).
pub fn static_ranges() -> (Option<Region>, Option<Region>) {
    imp::static_ranges()
}

#[cfg(all(target_os = "linux", not(target_vendor = "apple")))]
mod imp {
    use super::Region;

    // Linker-provided boundary symbols. These are emitted by every ELF
    // linker; `data_start`/`_end` bracket the union of `.data` and `.bss`
    // in practice, so we additionally split at `__bss_start` to recover
    // the two halves spec §3 wants tracked separately.
    extern "C" {
        static data_start: u8;
        static __bss_start: u8;
        static _end: u8;
    }

    pub fn static_ranges() -> (Option<Region>, Option<Region>) {
        unsafe {
            let data_lo = &data_start as *const u8 as usize;
            let bss_lo = &__bss_start as *const u8 as usize;
            let hi = &_end as *const u8 as usize;

            if data_lo == 0 || bss_lo < data_lo || hi < bss_lo {
                log::warn!("conservgc: linker symbols out of order, static scan disabled");
                return (None, None);
            }
            (
                Some(Region { start: data_lo, end: bss_lo }),
                Some(Region { start: bss_lo, end: hi }),
            )
        }
    }
}

#[cfg(target_vendor = "apple")]
mod imp {
    use super::Region;
    use mach2::dyld::{_dyld_get_image_header, _dyld_get_image_vmaddr_slide};
    use mach2::getsect::getsectdatafromheader_64;
    use std::ffi::CString;

    /// Uses the Mach-O section-lookup API on the running image's own
    /// `__DATA,__data` and `__DATA,__bss` sections, exactly as spec §4.A.3
    /// describes.
    pub fn static_ranges() -> (Option<Region>, Option<Region>) {
        (section_range("__DATA", "__data"), section_range("__DATA", "__bss"))
    }

    fn section_range(segname: &str, sectname: &str) -> Option<Region> {
        unsafe {
            let header = _dyld_get_image_header(0);
            if header.is_null() {
                log::warn!("conservgc: _dyld_get_image_header failed, static scan disabled");
                return None;
            }
            let slide = _dyld_get_image_vmaddr_slide(0);
            let segname = CString::new(segname).ok()?;
            let sectname = CString::new(sectname).ok()?;
            let mut size: u64 = 0;
            let addr = getsectdatafromheader_64(
                header as *const _,
                segname.as_ptr(),
                sectname.as_ptr(),
                &mut size,
            );
            if addr.is_null() || size == 0 {
                return None;
            }
            let start = addr as usize + slide as usize;
            Some(Region { start, end: start + size as usize })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::Region;
    use std::ffi::c_void;
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows_sys::Win32::System::SystemServices::{
        IMAGE_DOS_HEADER, IMAGE_NT_SIGNATURE,
    };

    /// Walks the NT section table of the current module looking for
    /// `.data`/`.bss`-named sections, matching spec §4.A.3's PE description.
    /// PE binaries often fold `.bss` into `.data`'s uninitialized tail
    /// (`Misc.VirtualSize > SizeOfRawData`), which is treated as `bss`.
    pub fn static_ranges() -> (Option<Region>, Option<Region>) {
        unsafe {
            let base = GetModuleHandleW(std::ptr::null());
            if base.is_null() {
                return (None, None);
            }
            let dos = base as *const IMAGE_DOS_HEADER;
            let nt = (base as *const u8).add((*dos).e_lfanew as usize)
                as *const windows_sys::Win32::System::Diagnostics::Debug::IMAGE_NT_HEADERS64;
            if (*nt).Signature != IMAGE_NT_SIGNATURE {
                log::warn!("conservgc: bad PE signature, static scan disabled");
                return (None, None);
            }

            let num_sections = (*nt).FileHeader.NumberOfSections as usize;
            let first = (nt as *const u8).add(std::mem::size_of_val(&*nt))
                as *const windows_sys::Win32::System::Diagnostics::Debug::IMAGE_SECTION_HEADER;

            let mut data = None;
            let mut bss = None;
            for i in 0..num_sections {
                let section = &*first.add(i);
                let name = std::str::from_utf8(&section.Name).unwrap_or("").trim_end_matches('\0');
                let start = base as usize + section.VirtualAddress as usize;
                let end = start + section.Misc.VirtualSize.max(section.SizeOfRawData) as usize;
                match name {
                    ".data" => data = Some(Region { start, end }),
                    ".bss" => bss = Some(Region { start, end }),
                    _ => {}
                }
            }
            (data, bss)
        }
    }
}

#[cfg(not(any(all(target_os = "linux", not(target_vendor = "apple")), target_vendor = "apple", windows)))]
mod imp {
    use super::Region;

    pub fn static_ranges() -> (Option<Region>, Option<Region>) {
        log::warn!("conservgc: static-section probe unsupported, data/bss scan disabled");
        (None, None)
    }
}
