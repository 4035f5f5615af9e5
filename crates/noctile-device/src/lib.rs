//! The thin wrapper host software actually talks to: architecture
//! selection, lifecycle no-ops, direct (boot-time) memory I/O, and the
//! command-queue entry points that drive [`noctile_cq::Prefetch`] and
//! [`noctile_cq::Dispatch`].
//!
//! `Device` owns one [`MemoryFabric`], one `Prefetch`, and one `Dispatch`,
//! mirroring the reference `DeviceImpl`'s ownership of one `Soc`, one
//! `Prefetch`, and one `Dispatch` — except here there is no shared raw
//! pointer: `Device::run_commands` passes its own `&mut MemoryFabric` and
//! `&mut Dispatch` into `Prefetch::run` on every call.

use noctile_cq::{Dispatch, Prefetch, ReadBufferDescriptor};
use noctile_memory::MemoryFabric;
use noctile_noc::{Grayskull, NocArch, WormholeB0};
use noctile_soc::{soc_arch_grayskull, soc_arch_wormhole_b0, CoreType, SocArch};

/// Selects which paired SoC/NoC architecture tables a [`Device`] is built
/// from. Plays the role `emu-c64::config::C64Model` plays for the C64
/// crate: a plain enum over immutable, hand-built descriptions, with no
/// config-file layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Grayskull,
    WormholeB0,
}

static GRAYSKULL_NOC: Grayskull = Grayskull;
static WORMHOLE_B0_NOC: WormholeB0 = WormholeB0;

/// Sysmem offsets host software polls as doorbells. Reads of these two
/// offsets are stubbed (see [`Device::read_from_sysmem`]) so that host
/// busy-wait loops observe progress; writes to them are otherwise
/// ordinary sysmem writes. These are emulator-internal constants, not
/// addresses recovered from the reference's `mem_map.hpp` (not present
/// in the retrieved source pack) — see DESIGN.md.
pub const HOST_CQ_READ_PTR: u32 = 0x0000_1000;
pub const HOST_CQ_FINISH_PTR: u32 = 0x0000_1004;

/// The device: one memory fabric plus the Prefetch/Dispatch pipeline
/// that drives it.
pub struct Device {
    soc: &'static SocArch,
    noc: &'static dyn NocArch,
    fabric: MemoryFabric,
    prefetch: Prefetch,
    dispatch: Dispatch,
}

impl Device {
    /// Builds a device for `arch`, with an empty memory fabric (no
    /// worker L1 buffers installed yet — see [`Device::install_worker_l1`]).
    #[must_use]
    pub fn create(arch: Arch) -> Self {
        let (soc, noc): (&'static SocArch, &'static dyn NocArch) = match arch {
            Arch::Grayskull => (soc_arch_grayskull(), &GRAYSKULL_NOC),
            Arch::WormholeB0 => (soc_arch_wormhole_b0(), &WORMHOLE_B0_NOC),
        };
        Device {
            soc,
            noc,
            fabric: MemoryFabric::new(soc),
            prefetch: Prefetch::new(soc, noc),
            dispatch: Dispatch::new(soc, noc),
        }
    }

    #[must_use]
    pub fn soc(&self) -> &'static SocArch {
        self.soc
    }

    /// Installs the L1 buffer for a worker cell. Must be called before
    /// any command targets that cell; mirrors the reference's
    /// caller-supplied L1 buffer ownership at the wrapper boundary.
    pub fn install_worker_l1(&mut self, x: i32, y: i32, buf: Vec<u8>) -> Result<(), String> {
        self.fabric.set_worker_l1(x, y, buf)
    }

    /// No-op lifecycle hooks; the core models no clocks, resets, or
    /// power domains.
    pub fn start(&mut self) {}
    pub fn stop(&mut self) {}
    pub fn assert_risc_reset(&mut self) {}
    pub fn deassert_risc_reset(&mut self) {}

    /// Opaque stand-in for signaling the compute collaborator. No-op:
    /// this core models memory transport, not kernel execution.
    pub fn launch_kernels(&mut self) {}

    /// Direct (boot-time) write, routed by the target cell's core type:
    /// DRAM cells go through the resolved DRAM channel, WORKER cells
    /// through L1. Any other core type is a fatal "unsupported core
    /// type" error.
    pub fn write(&mut self, data: &[u8], x: i32, y: i32, addr: u32) -> Result<(), String> {
        match self.soc.core_type(x, y)? {
            CoreType::Dram => {
                let channel = self.soc.get_core_dram_channel(x, y)?;
                self.fabric.write_dram(channel, addr, data.len() as u32)?.copy_from_slice(data);
                Ok(())
            }
            CoreType::Worker => {
                self.fabric.write_l1(x, y, addr, data.len() as u32)?.copy_from_slice(data);
                Ok(())
            }
            other => Err(format!("unsupported core type for direct write at ({x}, {y}): {other:?}")),
        }
    }

    /// Direct (boot-time) read, symmetric to [`Device::write`].
    pub fn read(&self, dst: &mut [u8], x: i32, y: i32, addr: u32) -> Result<(), String> {
        match self.soc.core_type(x, y)? {
            CoreType::Dram => {
                let channel = self.soc.get_core_dram_channel(x, y)?;
                dst.copy_from_slice(self.fabric.read_dram(channel, addr, dst.len() as u32)?);
                Ok(())
            }
            CoreType::Worker => {
                dst.copy_from_slice(self.fabric.read_l1(x, y, addr, dst.len() as u32)?);
                Ok(())
            }
            other => Err(format!("unsupported core type for direct read at ({x}, {y}): {other:?}")),
        }
    }

    pub fn write_to_sysmem(&mut self, data: &[u8], addr: u32) -> Result<(), String> {
        self.fabric.write_sysmem(addr, data.len() as u32)?.copy_from_slice(data);
        Ok(())
    }

    /// Reads from sysmem. [`HOST_CQ_READ_PTR`]/[`HOST_CQ_FINISH_PTR`]
    /// (4-byte reads only) are stubbed to `0`/`1` so that host busy-wait
    /// loops observe progress, regardless of what was last written
    /// there — spec.md §6, §8 invariant 8.
    pub fn read_from_sysmem(&self, dst: &mut [u8], addr: u32) -> Result<(), String> {
        if dst.len() == 4 && addr == HOST_CQ_READ_PTR {
            dst.copy_from_slice(&0u32.to_le_bytes());
            return Ok(());
        }
        if dst.len() == 4 && addr == HOST_CQ_FINISH_PTR {
            dst.copy_from_slice(&1u32.to_le_bytes());
            return Ok(());
        }
        dst.copy_from_slice(self.fabric.read_sysmem(addr, dst.len() as u32)?);
        Ok(())
    }

    /// Zero-copy cursor into sysmem from `offset` to the end of the
    /// buffer, for a host DMA producer/consumer.
    pub fn host_dma_address(&mut self, offset: u32) -> Result<&mut [u8], String> {
        self.fabric.host_dma_slice(offset)
    }

    /// Registers the Dispatch read-buffer descriptor. Must be called
    /// before issuing a command stream that includes
    /// `WRITE_LINEAR_H_HOST`.
    pub fn configure_read_buffer(&mut self, desc: ReadBufferDescriptor) {
        self.dispatch.configure_read_buffer(desc);
    }

    /// Drives Prefetch over `cmd_reg`; blocks until the entire command
    /// stream has been interpreted. Completion implies all effects are
    /// observable (spec.md §5).
    pub fn run_commands(&mut self, cmd_reg: &[u8]) -> Result<(), String> {
        self.prefetch.run(cmd_reg, &mut self.fabric, &mut self.dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_hooks_are_callable_no_ops() {
        let mut device = Device::create(Arch::WormholeB0);
        device.start();
        device.assert_risc_reset();
        device.deassert_risc_reset();
        device.launch_kernels();
        device.stop();
    }

    #[test]
    fn direct_write_read_round_trips_through_l1() {
        let mut device = Device::create(Arch::WormholeB0);
        let size = device.soc().worker_l1_size() as usize;
        device.install_worker_l1(1, 1, vec![0u8; size]).expect("valid");
        device.write(&[1, 2, 3, 4], 1, 1, 0x100).expect("valid");
        let mut out = [0u8; 4];
        device.read(&mut out, 1, 1, 0x100).expect("valid");
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn direct_io_rejects_unsupported_core_type() {
        let device = Device::create(Arch::WormholeB0);
        let mut out = [0u8; 4];
        assert!(device.read(&mut out, 0, 10, 0).is_err());
    }

    #[test]
    fn host_cq_doorbells_are_stubbed_regardless_of_prior_writes() {
        let mut device = Device::create(Arch::WormholeB0);
        device.write_to_sysmem(&[0xFF, 0xFF, 0xFF, 0xFF], HOST_CQ_READ_PTR).expect("valid");
        device.write_to_sysmem(&[0xFF, 0xFF, 0xFF, 0xFF], HOST_CQ_FINISH_PTR).expect("valid");
        let mut read_ptr = [0u8; 4];
        let mut finish_ptr = [0u8; 4];
        device.read_from_sysmem(&mut read_ptr, HOST_CQ_READ_PTR).expect("valid");
        device.read_from_sysmem(&mut finish_ptr, HOST_CQ_FINISH_PTR).expect("valid");
        assert_eq!(u32::from_le_bytes(read_ptr), 0);
        assert_eq!(u32::from_le_bytes(finish_ptr), 1);
    }

    #[test]
    fn host_dma_address_spans_to_end_of_sysmem() {
        let mut device = Device::create(Arch::WormholeB0);
        let len = device.host_dma_address(8).expect("valid").len();
        assert!(len > 0);
    }
}
