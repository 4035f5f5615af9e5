//! Memory fabric: the three address spaces a core can actually reach
//! bytes in — host-visible system memory, per-channel DRAM, and per-core
//! worker L1 scratchpad.
//!
//! [`MemoryFabric`] owns sysmem and DRAM outright; worker L1 buffers are
//! installed by the caller via [`MemoryFabric::set_worker_l1`] and then
//! owned by the fabric for the rest of its lifetime (see DESIGN.md for why
//! this differs from the reference's externally-owned raw pointer).

use noctile_soc::{CoreType, SocArch};

const DEFAULT_SYSMEM_SIZE: usize = 1 << 30;

pub struct MemoryFabric {
    soc: &'static SocArch,
    sysmem: Vec<u8>,
    dram_banks: Vec<Vec<u8>>,
    worker_l1: Vec<Option<Vec<u8>>>,
}

fn bounds_check(region: &str, len: usize, addr: u32, size: u32) -> Result<(), String> {
    let end = u64::from(addr) + u64::from(size);
    if end > len as u64 {
        return Err(format!(
            "{region}: address range [{addr}, {end}) exceeds size {len}"
        ));
    }
    Ok(())
}

impl MemoryFabric {
    /// Builds a fabric with the default 1 GiB sysmem region.
    #[must_use]
    pub fn new(soc: &'static SocArch) -> Self {
        Self::with_sysmem_size(soc, DEFAULT_SYSMEM_SIZE)
    }

    #[must_use]
    pub fn with_sysmem_size(soc: &'static SocArch, sysmem_size: usize) -> Self {
        let cells = (soc.x_size() * soc.y_size()) as usize;
        let dram_banks = (0..soc.num_dram_channels())
            .map(|_| vec![0u8; soc.dram_bank_size() as usize])
            .collect();
        MemoryFabric {
            soc,
            sysmem: vec![0u8; sysmem_size],
            dram_banks,
            worker_l1: vec![None; cells],
        }
    }

    #[must_use]
    pub fn soc(&self) -> &'static SocArch {
        self.soc
    }

    #[must_use]
    pub fn sysmem_size(&self) -> usize {
        self.sysmem.len()
    }

    pub fn read_sysmem(&self, addr: u32, size: u32) -> Result<&[u8], String> {
        bounds_check("sysmem", self.sysmem.len(), addr, size)?;
        Ok(&self.sysmem[addr as usize..(addr + size) as usize])
    }

    pub fn write_sysmem(&mut self, addr: u32, size: u32) -> Result<&mut [u8], String> {
        bounds_check("sysmem", self.sysmem.len(), addr, size)?;
        Ok(&mut self.sysmem[addr as usize..(addr + size) as usize])
    }

    /// Zero-copy cursor into sysmem from `offset` to the end of the
    /// buffer, for a host DMA producer/consumer.
    pub fn host_dma_slice(&mut self, offset: u32) -> Result<&mut [u8], String> {
        if offset as usize > self.sysmem.len() {
            return Err(format!("sysmem offset {offset} exceeds size {}", self.sysmem.len()));
        }
        Ok(&mut self.sysmem[offset as usize..])
    }

    pub fn read_dram(&self, channel: i32, addr: u32, size: u32) -> Result<&[u8], String> {
        let bank = self.dram_bank(channel)?;
        bounds_check("dram", bank.len(), addr, size)?;
        Ok(&bank[addr as usize..(addr + size) as usize])
    }

    pub fn write_dram(&mut self, channel: i32, addr: u32, size: u32) -> Result<&mut [u8], String> {
        let bank = self.dram_bank_mut(channel)?;
        bounds_check("dram", bank.len(), addr, size)?;
        Ok(&mut bank[addr as usize..(addr + size) as usize])
    }

    fn dram_bank(&self, channel: i32) -> Result<&Vec<u8>, String> {
        if channel < 0 || channel >= self.soc.num_dram_channels() {
            return Err(format!("DRAM channel {channel} is out of range"));
        }
        Ok(&self.dram_banks[channel as usize])
    }

    fn dram_bank_mut(&mut self, channel: i32) -> Result<&mut Vec<u8>, String> {
        if channel < 0 || channel >= self.soc.num_dram_channels() {
            return Err(format!("DRAM channel {channel} is out of range"));
        }
        Ok(&mut self.dram_banks[channel as usize])
    }

    fn worker_index(&self, x: i32, y: i32) -> Result<usize, String> {
        match self.soc.core_type(x, y)? {
            CoreType::Worker => Ok((x * self.soc.y_size() + y) as usize),
            other => Err(format!("no worker core at ({x}, {y}) (found {other:?})")),
        }
    }

    /// Installs the caller-constructed L1 buffer for a worker cell. The
    /// buffer's size must be at least `worker_l1_size`; it may be larger.
    pub fn set_worker_l1(&mut self, x: i32, y: i32, buf: Vec<u8>) -> Result<(), String> {
        let idx = self.worker_index(x, y)?;
        if (buf.len() as u32) < self.soc.worker_l1_size() {
            return Err(format!(
                "L1 buffer for ({x}, {y}) is {} bytes, need at least {}",
                buf.len(),
                self.soc.worker_l1_size()
            ));
        }
        self.worker_l1[idx] = Some(buf);
        Ok(())
    }

    pub fn read_l1(&self, x: i32, y: i32, addr: u32, size: u32) -> Result<&[u8], String> {
        let idx = self.worker_index(x, y)?;
        let l1 = self.worker_l1[idx]
            .as_ref()
            .ok_or_else(|| format!("L1 at ({x}, {y}) has not been installed"))?;
        bounds_check("l1", l1.len(), addr, size)?;
        Ok(&l1[addr as usize..(addr + size) as usize])
    }

    pub fn write_l1(&mut self, x: i32, y: i32, addr: u32, size: u32) -> Result<&mut [u8], String> {
        let idx = self.worker_index(x, y)?;
        let l1 = self.worker_l1[idx]
            .as_mut()
            .ok_or_else(|| format!("L1 at ({x}, {y}) has not been installed"))?;
        bounds_check("l1", l1.len(), addr, size)?;
        Ok(&mut l1[addr as usize..(addr + size) as usize])
    }
}
