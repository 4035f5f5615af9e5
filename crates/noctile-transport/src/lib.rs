//! NoC-addressed memory access: translates a 64-bit NoC address into a
//! DRAM-channel or worker-L1 region in the [`MemoryFabric`] and performs
//! the read/write/multicast-write there.
//!
//! `NocTransport` is deliberately stateless with respect to the fabric —
//! it holds only the architecture tables it needs to resolve addresses,
//! and takes the fabric to operate on as an explicit parameter on each
//! call. The reference implementation's `Noc` class instead holds a raw
//! pointer to a shared `Soc`; Prefetch and Dispatch each own one. Rust has
//! no safe analogue of two objects holding a mutable raw pointer to the
//! same target, so this crate generalizes that shape into "pass the
//! fabric in," which both Prefetch and Dispatch do in turn since they
//! never touch it concurrently.

use noctile_memory::MemoryFabric;
use noctile_noc::{noc_addr_helper, NocArch};
use noctile_soc::{CoreType, SocArch};

fn align_up(addr: u32, alignment: u32) -> u32 {
    (addr + (alignment - 1)) & !(alignment - 1)
}

pub struct NocTransport {
    soc: &'static SocArch,
    noc: &'static dyn NocArch,
}

impl NocTransport {
    #[must_use]
    pub fn new(soc: &'static SocArch, noc: &'static dyn NocArch) -> Self {
        NocTransport { soc, noc }
    }

    /// Computes the NoC address of an interleaved DRAM or L1 page.
    pub fn get_noc_addr_interleaved(
        &self,
        is_dram: bool,
        bank_base_address: u32,
        page_size: u32,
        id: u32,
        offset: u32,
    ) -> Result<u64, String> {
        let num_banks = if is_dram { self.noc.num_dram_banks() } else { self.noc.num_l1_banks() };
        let bank_id = id % num_banks;
        let page_index = id / num_banks;
        let padded_page_size = align_up(page_size, 32);
        let bank_offset = if is_dram {
            self.noc.bank_to_dram_offset(bank_id)?
        } else {
            self.noc.bank_to_l1_offset(bank_id)?
        };
        // bank_offset may be a two's-complement negative (some L1 banks sit behind
        // a lower physical address than their nominal base); wrap the same way the
        // reference's unsigned arithmetic does rather than panicking on overflow.
        let local_addr = (page_index * padded_page_size)
            .wrapping_add(bank_base_address)
            .wrapping_add(offset)
            .wrapping_add(bank_offset);
        let noc_xy = if is_dram {
            self.noc.dram_bank_to_noc_xy(0, bank_id)?
        } else {
            self.noc.l1_bank_to_noc_xy(0, bank_id)?
        };
        Ok(noc_addr_helper(noc_xy, local_addr))
    }

    pub fn read(&self, fabric: &MemoryFabric, src_noc_addr: u64, dst: &mut [u8]) -> Result<(), String> {
        let (x, y, addr) = self.noc.parse_noc_addr(src_noc_addr);
        let src = self.map_remote_read(fabric, x, y, addr, dst.len() as u32)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    pub fn write(&self, fabric: &mut MemoryFabric, src: &[u8], dst_noc_addr: u64) -> Result<(), String> {
        let (x, y, addr) = self.noc.parse_noc_addr(dst_noc_addr);
        let dst = self.map_remote_write(fabric, x, y, addr, src.len() as u32)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Writes `src` to every WORKER cell in the multicast rectangle.
    /// `num_dests` is carried on the wire but not validated against the
    /// rectangle's actual worker count, matching the reference.
    pub fn write_multicast(
        &self,
        fabric: &mut MemoryFabric,
        src: &[u8],
        dst_noc_addr_multicast: u64,
        num_dests: u32,
    ) -> Result<(), String> {
        let _ = num_dests;
        let (mut x_start, mut y_start, mut x_end, mut y_end, addr) =
            self.noc.parse_noc_multicast_addr(dst_noc_addr_multicast);
        if x_start > x_end {
            std::mem::swap(&mut x_start, &mut x_end);
        }
        if y_start > y_end {
            std::mem::swap(&mut y_start, &mut y_end);
        }
        for x in x_start..=x_end {
            for y in y_start..=y_end {
                if self.soc.core_type(x as i32, y as i32)? != CoreType::Worker {
                    continue;
                }
                let dst = self.map_remote_write(fabric, x, y, addr, src.len() as u32)?;
                dst.copy_from_slice(src);
            }
        }
        Ok(())
    }

    /// Resolves the local DRAM address, preserving and logging the
    /// reference implementation's address-truncation workaround: an
    /// address that is itself past the end of the bank (the quirk) is
    /// taken modulo the bank size rather than rejected outright. An
    /// ordinary end-of-bank overrun — `addr` in range but `addr + size`
    /// past it — is not the quirk and is left to the bounds check below,
    /// without logging a misleading "truncating" message.
    fn resolve_dram_local_addr(&self, mut addr: u32, size: u32) -> Result<u32, String> {
        let bank_size = self.soc.dram_bank_size();
        if addr >= bank_size {
            let truncated = addr % bank_size;
            eprintln!(
                "noctile-transport: DRAM local address 0x{addr:x} exceeds bank size 0x{bank_size:x}, truncating to 0x{truncated:x} (reference workaround)"
            );
            addr = truncated;
        }
        if u64::from(addr) + u64::from(size) > u64::from(bank_size) {
            return Err(format!(
                "DRAM access [{addr}, {}) still exceeds bank size {bank_size} after truncation",
                addr as u64 + size as u64
            ));
        }
        Ok(addr)
    }

    fn map_remote_read<'f>(
        &self,
        fabric: &'f MemoryFabric,
        x: u32,
        y: u32,
        addr: u32,
        size: u32,
    ) -> Result<&'f [u8], String> {
        match self.soc.core_type(x as i32, y as i32)? {
            CoreType::Dram => {
                let channel = self.soc.get_core_dram_channel(x as i32, y as i32)?;
                let local = self.resolve_dram_local_addr(addr, size)?;
                fabric.read_dram(channel, local, size)
            }
            CoreType::Worker => fabric.read_l1(x as i32, y as i32, addr, size),
            other => Err(format!("no DRAM or worker core at ({x}, {y}) (found {other:?})")),
        }
    }

    fn map_remote_write<'f>(
        &self,
        fabric: &'f mut MemoryFabric,
        x: u32,
        y: u32,
        addr: u32,
        size: u32,
    ) -> Result<&'f mut [u8], String> {
        match self.soc.core_type(x as i32, y as i32)? {
            CoreType::Dram => {
                let channel = self.soc.get_core_dram_channel(x as i32, y as i32)?;
                let local = self.resolve_dram_local_addr(addr, size)?;
                fabric.write_dram(channel, local, size)
            }
            CoreType::Worker => fabric.write_l1(x as i32, y as i32, addr, size),
            other => Err(format!("no DRAM or worker core at ({x}, {y}) (found {other:?})")),
        }
    }
}
