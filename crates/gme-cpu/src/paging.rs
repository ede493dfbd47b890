//! Paged 64 KiB address space backed by a single byte arena.
//!
//! Every page of the logical address space has one read slot and one write
//! slot, both holding an offset into the arena. Unmapped pages read from a
//! sentinel page filled with a chosen byte and write into a discard page, so
//! every address always resolves to valid storage.

/// Size of the logical address space.
pub const MEM_SIZE: usize = 0x10000;

/// A contiguous range of the arena owned by one memory image (RAM, ROM bank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    /// Start offset inside the arena.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Region {
    /// Slice of this region starting `start` bytes in, at most `len` long.
    pub fn sub(&self, start: usize, len: usize) -> Region {
        let start = start.min(self.len);
        Region {
            offset: self.offset + start,
            len: len.min(self.len - start),
        }
    }
}

/// Page table plus backing storage.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    arena: Vec<u8>,
    page_bits: u32,
    read_pages: Vec<usize>,
    write_pages: Vec<usize>,
    unmapped_read: Region,
    unmapped_write: Region,
}

impl MemoryMap {
    /// Create a map with pages of `1 << page_bits` bytes, all unmapped.
    pub fn new(page_bits: u32) -> Self {
        let page_bits = page_bits.clamp(8, 14);
        let page_size = 1usize << page_bits;
        let page_count = MEM_SIZE >> page_bits;
        let mut arena = Vec::with_capacity(page_size * 2);
        arena.resize(page_size * 2, 0);
        let unmapped_read = Region {
            offset: 0,
            len: page_size,
        };
        let unmapped_write = Region {
            offset: page_size,
            len: page_size,
        };
        Self {
            arena,
            page_bits,
            read_pages: vec![unmapped_read.offset; page_count],
            write_pages: vec![unmapped_write.offset; page_count],
            unmapped_read,
            unmapped_write,
        }
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        1 << self.page_bits
    }

    /// Number of page slots covering the address space.
    pub fn page_count(&self) -> usize {
        self.read_pages.len()
    }

    /// Reserve `size` bytes of storage, rounded up to whole pages.
    pub fn alloc(&mut self, size: usize, fill: u8) -> Region {
        let page = self.page_size();
        let len = size.div_ceil(page).max(1) * page;
        let offset = self.arena.len();
        self.arena.resize(offset + len, fill);
        Region { offset, len }
    }

    /// Unmap every page and refill the unmapped-read sentinel with `fill`.
    ///
    /// Allocated regions keep their contents; drivers refill them explicitly.
    pub fn reset(&mut self, fill: u8) {
        let sentinel = self.unmapped_read;
        self.arena[sentinel.offset..sentinel.offset + sentinel.len].fill(fill);
        self.read_pages.fill(self.unmapped_read.offset);
        self.write_pages.fill(self.unmapped_write.offset);
    }

    /// Map `region` read-only at `start..start + size`.
    ///
    /// Writes to the range are discarded. When the region is shorter than
    /// `size` it is mirrored across the range.
    pub fn map_code(&mut self, start: u16, size: usize, region: Region) {
        let Some((first, count)) = self.page_span(start, size) else {
            return;
        };
        let page = self.page_size();
        let usable = region.len / page * page;
        for i in 0..count {
            let slot = first + i;
            self.read_pages[slot] = if usable == 0 {
                self.unmapped_read.offset
            } else {
                region.offset + (i * page) % usable
            };
            self.write_pages[slot] = self.unmapped_write.offset;
        }
    }

    /// Map separate write and read regions at `start..start + size`.
    ///
    /// Pass the same region for both to get plain RAM. `None` leaves that
    /// direction unmapped.
    pub fn map_mem(
        &mut self,
        start: u16,
        size: usize,
        write: Option<Region>,
        read: Option<Region>,
    ) {
        let Some((first, count)) = self.page_span(start, size) else {
            return;
        };
        let page = self.page_size();
        for i in 0..count {
            let slot = first + i;
            self.read_pages[slot] = match read {
                Some(r) if r.len >= (i + 1) * page => r.offset + i * page,
                _ => self.unmapped_read.offset,
            };
            self.write_pages[slot] = match write {
                Some(r) if r.len >= (i + 1) * page => r.offset + i * page,
                _ => self.unmapped_write.offset,
            };
        }
    }

    /// Unmap `start..start + size` in both directions.
    pub fn unmap(&mut self, start: u16, size: usize) {
        self.map_mem(start, size, None, None);
    }

    /// Read the byte visible at `addr`.
    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.arena[self.resolve_read(addr)]
    }

    /// Write `data` through the write mapping at `addr`.
    #[inline]
    pub fn write(&mut self, addr: u16, data: u8) {
        let at = self.resolve_write(addr);
        self.arena[at] = data;
    }

    /// Arena offset backing reads of `addr`.
    #[inline]
    pub fn resolve_read(&self, addr: u16) -> usize {
        let addr = addr as usize;
        self.read_pages[addr >> self.page_bits] + (addr & (self.page_size() - 1))
    }

    /// Arena offset backing writes of `addr`.
    #[inline]
    pub fn resolve_write(&self, addr: u16) -> usize {
        let addr = addr as usize;
        self.write_pages[addr >> self.page_bits] + (addr & (self.page_size() - 1))
    }

    /// Read and write arena offsets installed for page slot `page`.
    pub fn page_entry(&self, page: usize) -> Option<(usize, usize)> {
        Some((*self.read_pages.get(page)?, *self.write_pages.get(page)?))
    }

    /// True when reads of `addr` come from the unmapped sentinel.
    pub fn is_unmapped(&self, addr: u16) -> bool {
        self.read_pages[addr as usize >> self.page_bits] == self.unmapped_read.offset
    }

    /// Total arena size in bytes.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Contents of an allocated region.
    pub fn region(&self, region: Region) -> &[u8] {
        &self.arena[region.offset..region.offset + region.len]
    }

    /// Mutable contents of an allocated region.
    pub fn region_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.arena[region.offset..region.offset + region.len]
    }

    /// Copy `data` into `region` at `at`, clamped to the region.
    ///
    /// Returns the number of bytes copied.
    pub fn load(&mut self, region: Region, at: usize, data: &[u8]) -> usize {
        let dest = self.region_mut(region);
        if at >= dest.len() {
            return 0;
        }
        let n = data.len().min(dest.len() - at);
        dest[at..at + n].copy_from_slice(&data[..n]);
        n
    }

    /// Page slots covered by a mapping, shrunk to whole pages when misaligned.
    fn page_span(&self, start: u16, size: usize) -> Option<(usize, usize)> {
        let page = self.page_size();
        let start = start as usize;
        let (first, last, aligned) = whole_pages(start, size, page);
        debug_assert!(
            aligned,
            "mapping 0x{start:04X}+0x{size:X} is not aligned to 0x{page:X}-byte pages"
        );
        if !aligned {
            log::warn!(
                "misaligned mapping 0x{start:04X}+0x{size:X}, using pages {first}..{last}"
            );
        }
        if last <= first {
            return None;
        }
        Some((first, last - first))
    }
}

/// Whole pages inside `start..start + size`, and whether the range was aligned.
fn whole_pages(start: usize, size: usize, page: usize) -> (usize, usize, bool) {
    let end = (start + size).min(MEM_SIZE);
    let aligned = start % page == 0 && (end % page == 0 || end == MEM_SIZE);
    (start.div_ceil(page), end / page, aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misaligned_ranges_shrink_to_whole_pages() {
        assert_eq!(whole_pages(0x0400, 0x0800, 0x400), (1, 3, true));
        assert_eq!(whole_pages(0x0300, 0x0900, 0x400), (1, 3, false));
        assert_eq!(whole_pages(0x0500, 0x0200, 0x400), (2, 1, false));
        assert_eq!(whole_pages(0xFC00, 0x1000, 0x400), (63, 64, true));
    }

    #[test]
    fn unmapped_reads_return_fill_and_writes_vanish() {
        let mut map = MemoryMap::new(11);
        map.reset(0x22);
        assert_eq!(map.read(0x5FF6), 0x22);
        map.write(0x5FF6, 0x99);
        assert_eq!(map.read(0x5FF6), 0x22);
    }

    #[test]
    fn every_address_resolves_inside_arena() {
        let mut map = MemoryMap::new(10);
        let ram = map.alloc(0x2000, 0);
        map.reset(0xFF);
        map.map_mem(0xC000, 0x2000, Some(ram), Some(ram));
        for addr in 0..=0xFFFFu16 {
            assert!(map.resolve_read(addr) < map.arena_len());
            assert!(map.resolve_write(addr) < map.arena_len());
        }
    }

    #[test]
    fn ram_mapping_is_readable_and_writable() {
        let mut map = MemoryMap::new(11);
        let ram = map.alloc(0x800, 0);
        map.reset(0);
        map.map_mem(0x0000, 0x800, Some(ram), Some(ram));
        map.write(0x07FF, 0x42);
        assert_eq!(map.read(0x07FF), 0x42);
        assert_eq!(map.region(ram)[0x7FF], 0x42);
    }

    #[test]
    fn code_mapping_mirrors_short_regions_and_ignores_writes() {
        let mut map = MemoryMap::new(11);
        let rom = map.alloc(0x800, 0);
        map.load(rom, 0, &[0xA9, 0x01]);
        map.reset(0);
        map.map_code(0x0000, 0x2000, rom);
        assert_eq!(map.read(0x0000), 0xA9);
        assert_eq!(map.read(0x0800), 0xA9);
        assert_eq!(map.read(0x1801), 0x01);
        map.write(0x0000, 0x00);
        assert_eq!(map.read(0x0000), 0xA9);
    }

    #[test]
    fn remapping_same_bank_is_idempotent() {
        let mut map = MemoryMap::new(10);
        let bank = map.alloc(0x4000, 0x11);
        map.reset(0xFF);
        map.map_code(0x8000, 0x4000, bank);
        let once: Vec<_> = (0..map.page_count()).map(|p| map.page_entry(p)).collect();
        map.map_code(0x8000, 0x4000, bank);
        let twice: Vec<_> = (0..map.page_count()).map(|p| map.page_entry(p)).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn load_clamps_to_region() {
        let mut map = MemoryMap::new(10);
        let r = map.alloc(0x400, 0);
        assert_eq!(map.load(r, 0x3FE, &[1, 2, 3, 4]), 2);
        assert_eq!(map.load(r, 0x400, &[1]), 0);
    }

    #[test]
    fn region_sub_is_clamped() {
        let r = Region {
            offset: 0x100,
            len: 0x200,
        };
        assert_eq!(r.sub(0x180, 0x100), Region { offset: 0x280, len: 0x80 });
        assert_eq!(r.sub(0x300, 0x10).len, 0);
    }
}
