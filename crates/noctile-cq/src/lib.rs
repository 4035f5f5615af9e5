//! The command-queue pipeline: Prefetch and Dispatch, the two-stage
//! interpreter that turns a host-supplied byte stream into NoC reads and
//! writes.
//!
//! Prefetch walks `CQPrefetchCmd`s, either copying bytes inline or
//! pulling them from a NoC-addressed source into its staging buffer
//! (`dispatch_data`), and periodically flushes that buffer to Dispatch.
//! Dispatch walks the flushed `CQDispatchCmd`s and performs the actual
//! writes (or, for `WRITE_LINEAR_H_HOST`, copies into the host read
//! buffer). Neither stage owns the [`MemoryFabric`] it operates on or the
//! other stage directly — both are passed in explicitly on each call, the
//! same "pass the fabric in" shape `noctile-transport` uses, since
//! Prefetch driving Dispatch while both also need `&mut MemoryFabric`
//! has no safe direct analogue of the reference's two objects sharing a
//! raw `Soc *`.

pub mod wire;

use noctile_memory::MemoryFabric;
use noctile_noc::NocArch;
use noctile_soc::SocArch;
use noctile_transport::NocTransport;
use wire::{CQDispatchCmd, CQPrefetchCmd};

/// `CQ_PREFETCH_CMD_BARE_MIN_SIZE`: the fixed command header size, also
/// the stride for header-only commands (`STALL`, `TERMINATE`, `RELAY_LINEAR`,
/// `RELAY_PAGED`).
pub const CQ_PREFETCH_CMD_BARE_MIN_SIZE: u32 = wire::HEADER_SIZE as u32;

/// Byte alignment `WRITE_PACKED` pads its sub-command table and data
/// records to.
pub const L1_NOC_ALIGNMENT: u32 = 16;

/// Maximum `WRITE_PACKED` destination count for unicast; half that for
/// multicast.
pub const MAX_WRITE_PACKED_CORES: u32 = 108;

/// `flags & PACKED_WRITE_FLAG_MCAST` selects the multicast sub-command
/// layout (`noc_xy_addr`, `num_mcast_dests`) over the unicast one
/// (`noc_xy_addr` only).
pub const PACKED_WRITE_FLAG_MCAST: u32 = 1 << 0;
/// `flags & PACKED_WRITE_FLAG_NO_STRIDE` makes every destination read
/// the same data record instead of advancing to the next one.
pub const PACKED_WRITE_FLAG_NO_STRIDE: u32 = 1 << 1;

fn align_up_pow2(v: u32, a: u32) -> u32 {
    (v + (a - 1)) & !(a - 1)
}

/// Host-side sink for Dispatch's `WRITE_LINEAR_H_HOST`: a `(page_size,
/// dst, dst_offset, num_pages_read)` tuple configured out of band before
/// issuing a command stream that reads data back.
///
/// `dst` is modeled as an offset into [`MemoryFabric`]'s sysmem buffer
/// rather than an arbitrary raw host pointer (see DESIGN.md): sysmem is
/// the only host-visible memory region the fabric owns, and the common
/// case — a `host_dma_address` slice handed back to the caller and then
/// registered here — is exactly a sysmem offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadBufferDescriptor {
    pub padded_page_size: u32,
    pub dst_sysmem_offset: u32,
    pub dst_offset: u32,
    pub num_pages_read: u32,
}

/// Prefetch: consumes host commands, assembling a Dispatch-bound byte
/// stream in `dispatch_data` and flushing it on `RELAY_INLINE`.
pub struct Prefetch {
    transport: NocTransport,
    dispatch_data: Vec<u8>,
}

impl Prefetch {
    #[must_use]
    pub fn new(soc: &'static SocArch, noc: &'static dyn NocArch) -> Self {
        Prefetch { transport: NocTransport::new(soc, noc), dispatch_data: Vec::new() }
    }

    /// Bytes currently staged for the next flush to Dispatch. Non-empty
    /// only between a `RELAY_INLINE_NOFLUSH` and the flush that follows
    /// it; a successful `run()` always leaves this empty.
    #[must_use]
    pub fn dispatch_data(&self) -> &[u8] {
        &self.dispatch_data
    }

    /// Consumes exactly `cmd_reg.len()` bytes as a Prefetch command
    /// sequence, invoking `dispatch.run` on every flush. On success the
    /// walk cursor lands exactly at the end of `cmd_reg`; any residue, an
    /// unknown command, an out-of-bounds payload, or an invalid field is
    /// a fatal error that aborts the call without invoking Dispatch on
    /// partial state. `dispatch_data` is left as-is on failure.
    pub fn run(
        &mut self,
        cmd_reg: &[u8],
        fabric: &mut MemoryFabric,
        dispatch: &mut Dispatch,
    ) -> Result<(), String> {
        let mut cmd_ptr = 0usize;
        while cmd_ptr < cmd_reg.len() {
            let stride = self.process_cmd(cmd_reg, cmd_ptr, fabric, dispatch)?;
            cmd_ptr += stride as usize;
        }
        if cmd_ptr != cmd_reg.len() {
            return Err(format!(
                "prefetch command stream residue: cursor {cmd_ptr} != end {}",
                cmd_reg.len()
            ));
        }
        Ok(())
    }

    fn process_cmd(
        &mut self,
        cmd_reg: &[u8],
        cmd_ptr: usize,
        fabric: &mut MemoryFabric,
        dispatch: &mut Dispatch,
    ) -> Result<u32, String> {
        match wire::decode_prefetch(cmd_reg, cmd_ptr)? {
            CQPrefetchCmd::RelayLinear { noc_xy_addr, addr, length } => {
                let noc_addr = noctile_noc::noc_addr_helper(noc_xy_addr, addr);
                let offset = self.dispatch_data.len();
                self.dispatch_data.resize(offset + length as usize, 0);
                self.transport.read(fabric, noc_addr, &mut self.dispatch_data[offset..])?;
                Ok(CQ_PREFETCH_CMD_BARE_MIN_SIZE)
            }
            CQPrefetchCmd::RelayPaged { is_dram, start_page, base_addr, page_size, pages, length_adjust } => {
                if length_adjust >= page_size {
                    return Err(format!(
                        "RELAY_PAGED length_adjust {length_adjust} must be less than page_size {page_size}"
                    ));
                }
                let read_length = (pages * page_size) as usize;
                let offset = self.dispatch_data.len();
                self.dispatch_data.resize(offset + read_length, 0);
                let mut page_id = start_page;
                let mut written = 0usize;
                while written < read_length {
                    let noc_addr = self.transport.get_noc_addr_interleaved(is_dram, base_addr, page_size, page_id, 0)?;
                    let dst = &mut self.dispatch_data[offset + written..offset + written + page_size as usize];
                    self.transport.read(fabric, noc_addr, dst)?;
                    page_id += 1;
                    written += page_size as usize;
                }
                self.dispatch_data.truncate(self.dispatch_data.len() - length_adjust as usize);
                Ok(CQ_PREFETCH_CMD_BARE_MIN_SIZE)
            }
            CQPrefetchCmd::RelayPagedPacked { count, total_length, stride } => {
                self.process_relay_paged_packed(cmd_reg, cmd_ptr, count, total_length, fabric)?;
                Ok(stride)
            }
            CQPrefetchCmd::RelayInline { length, stride } => {
                self.copy_inline_payload(cmd_reg, cmd_ptr, length)?;
                self.flush(fabric, dispatch)?;
                Ok(stride)
            }
            CQPrefetchCmd::RelayInlineNoflush { length, stride } => {
                self.copy_inline_payload(cmd_reg, cmd_ptr, length)?;
                Ok(stride)
            }
            CQPrefetchCmd::Stall | CQPrefetchCmd::Terminate => Ok(CQ_PREFETCH_CMD_BARE_MIN_SIZE),
        }
    }

    /// Reads `count` sub-commands directly out of `cmd_reg` (no
    /// intermediate "L1 cache" scratch copy, no sentinel sub-command — a
    /// bounded loop over the sub-commands replaces it per spec.md §9's
    /// explicit license that the observable behavior is identical).
    fn process_relay_paged_packed(
        &mut self,
        cmd_reg: &[u8],
        cmd_ptr: usize,
        count: u32,
        total_length: u32,
        fabric: &mut MemoryFabric,
    ) -> Result<(), String> {
        let sub_cmds_start = cmd_ptr + wire::HEADER_SIZE;
        let offset = self.dispatch_data.len();
        self.dispatch_data.resize(offset + total_length as usize, 0);

        let mut amt_to_read = total_length;
        let mut amt_read = 0u32;
        for i in 0..count {
            if amt_read >= amt_to_read {
                break;
            }
            let sub_cmd = wire::decode_relay_paged_packed_sub_cmd(
                cmd_reg,
                sub_cmds_start + i as usize * wire::RELAY_PAGED_PACKED_SUB_CMD_SIZE,
            )?;
            let page_size = 1u32 << sub_cmd.log_page_size;
            let mut page_id = sub_cmd.start_page;
            let read_length = sub_cmd.length.min(amt_to_read - amt_read);
            let mut read_so_far = 0u32;
            while read_so_far < read_length {
                let noc_addr = self.transport.get_noc_addr_interleaved(
                    true,
                    sub_cmd.base_addr,
                    page_size,
                    page_id,
                    0,
                )?;
                let read_size = (read_length - read_so_far).min(page_size);
                let dst_start = offset + (amt_read + read_so_far) as usize;
                let dst = &mut self.dispatch_data[dst_start..dst_start + read_size as usize];
                self.transport.read(fabric, noc_addr, dst)?;
                page_id += 1;
                read_so_far += read_size;
            }
            amt_read += read_so_far;
        }
        Ok(())
    }

    fn copy_inline_payload(&mut self, cmd_reg: &[u8], cmd_ptr: usize, length: u32) -> Result<(), String> {
        let data_start = cmd_ptr + wire::HEADER_SIZE;
        wire::check_cmd_reg_limit(cmd_reg, data_start, length)?;
        self.dispatch_data.extend_from_slice(&cmd_reg[data_start..data_start + length as usize]);
        Ok(())
    }

    fn flush(&mut self, fabric: &mut MemoryFabric, dispatch: &mut Dispatch) -> Result<(), String> {
        dispatch.run(&self.dispatch_data, fabric)?;
        self.dispatch_data.clear();
        Ok(())
    }
}

/// Dispatch: executes write-family commands against NoC targets, or
/// copies results into a previously registered host read buffer.
pub struct Dispatch {
    transport: NocTransport,
    read_buffer: Option<ReadBufferDescriptor>,
}

impl Dispatch {
    #[must_use]
    pub fn new(soc: &'static SocArch, noc: &'static dyn NocArch) -> Self {
        Dispatch { transport: NocTransport::new(soc, noc), read_buffer: None }
    }

    pub fn configure_read_buffer(&mut self, desc: ReadBufferDescriptor) {
        self.read_buffer = Some(desc);
    }

    /// Consumes exactly `cmd_reg.len()` bytes as a Dispatch command
    /// sequence. Same failure posture as [`Prefetch::run`].
    pub fn run(&mut self, cmd_reg: &[u8], fabric: &mut MemoryFabric) -> Result<(), String> {
        let mut cmd_ptr = 0usize;
        while cmd_ptr < cmd_reg.len() {
            cmd_ptr = self.process_cmd(cmd_reg, cmd_ptr, fabric)?;
        }
        if cmd_ptr != cmd_reg.len() {
            return Err(format!(
                "dispatch command stream residue: cursor {cmd_ptr} != end {}",
                cmd_reg.len()
            ));
        }
        Ok(())
    }

    fn process_cmd(&mut self, cmd_reg: &[u8], cmd_ptr: usize, fabric: &mut MemoryFabric) -> Result<usize, String> {
        match wire::decode_dispatch(cmd_reg, cmd_ptr)? {
            CQDispatchCmd::WriteLinear { noc_xy_addr, addr, length, num_mcast_dests } => {
                let data_start = cmd_ptr + wire::HEADER_SIZE;
                wire::check_cmd_reg_limit(cmd_reg, data_start, length)?;
                let payload = &cmd_reg[data_start..data_start + length as usize];
                let dst = noctile_noc::noc_addr_helper(noc_xy_addr, addr);
                if num_mcast_dests == 0 {
                    self.transport.write(fabric, payload, dst)?;
                } else {
                    self.transport.write_multicast(fabric, payload, dst, num_mcast_dests)?;
                }
                Ok(data_start + length as usize)
            }
            CQDispatchCmd::WritePaged { is_dram, start_page, base_addr, page_size, pages } => {
                let write_length = pages * page_size;
                let data_start = cmd_ptr + wire::HEADER_SIZE;
                wire::check_cmd_reg_limit(cmd_reg, data_start, write_length)?;
                let mut page_id = start_page;
                let mut written = 0u32;
                while written < write_length {
                    let dst = self.transport.get_noc_addr_interleaved(is_dram, base_addr, page_size, page_id, 0)?;
                    let page_start = data_start + written as usize;
                    let page = &cmd_reg[page_start..page_start + page_size as usize];
                    self.transport.write(fabric, page, dst)?;
                    page_id += 1;
                    written += page_size;
                }
                Ok(data_start + write_length as usize)
            }
            CQDispatchCmd::WritePacked { flags, count, size, addr } => {
                self.process_write_packed(cmd_reg, cmd_ptr, flags, count, size, addr, fabric)
            }
            CQDispatchCmd::WriteLinearHHost { length } => self.process_write_host(cmd_reg, cmd_ptr, length, fabric),
            CQDispatchCmd::Wait | CQDispatchCmd::Terminate => Ok(cmd_ptr + wire::HEADER_SIZE),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_write_packed(
        &mut self,
        cmd_reg: &[u8],
        cmd_ptr: usize,
        flags: u32,
        count: u32,
        size: u32,
        addr: u32,
        fabric: &mut MemoryFabric,
    ) -> Result<usize, String> {
        let mcast = flags & PACKED_WRITE_FLAG_MCAST != 0;
        let max_count = if mcast { MAX_WRITE_PACKED_CORES / 2 } else { MAX_WRITE_PACKED_CORES };
        if count > max_count {
            return Err(format!("WRITE_PACKED count {count} exceeds max {max_count}"));
        }
        // Unicast sub-cmd: noc_xy_addr (u32). Multicast sub-cmd: noc_xy_addr, num_mcast_dests (2x u32).
        let sub_cmd_size: usize = if mcast { 8 } else { 4 };
        let sub_cmds_start = cmd_ptr + wire::HEADER_SIZE;
        let data_start = align_up_pow2((wire::HEADER_SIZE + count as usize * sub_cmd_size) as u32, L1_NOC_ALIGNMENT) as usize;
        let padded_size = align_up_pow2(size, L1_NOC_ALIGNMENT);
        let no_stride = flags & PACKED_WRITE_FLAG_NO_STRIDE != 0;
        let stride = if no_stride { 0 } else { padded_size };

        let region_len = if count == 0 {
            0
        } else if no_stride {
            padded_size
        } else {
            stride as usize * (count as usize - 1) + padded_size as usize
        };
        wire::check_cmd_reg_limit(cmd_reg, cmd_ptr + data_start, region_len as u32)?;

        let mut data_ptr = cmd_ptr + data_start;
        for i in 0..count as usize {
            let sub_cmd_offset = sub_cmds_start + i * sub_cmd_size;
            let noc_xy_addr = wire::read_u32(cmd_reg, sub_cmd_offset)?;
            let num_dests = if mcast { wire::read_u32(cmd_reg, sub_cmd_offset + 4)? } else { 1 };
            let dst = noctile_noc::noc_addr_helper(noc_xy_addr, addr);
            let payload = &cmd_reg[data_ptr..data_ptr + size as usize];
            if mcast {
                self.transport.write_multicast(fabric, payload, dst, num_dests)?;
            } else {
                self.transport.write(fabric, payload, dst)?;
            }
            data_ptr += stride as usize;
        }
        if no_stride {
            data_ptr += padded_size as usize;
        }
        Ok(data_ptr)
    }

    fn process_write_host(
        &mut self,
        cmd_reg: &[u8],
        cmd_ptr: usize,
        length: u32,
        fabric: &mut MemoryFabric,
    ) -> Result<usize, String> {
        let desc = self
            .read_buffer
            .ok_or_else(|| "WRITE_LINEAR_H_HOST fired with no read buffer configured".to_string())?;
        wire::check_cmd_reg_limit(cmd_reg, cmd_ptr, length)?;
        let data_start = cmd_ptr + wire::HEADER_SIZE;
        let payload_len = length - wire::HEADER_SIZE as u32;
        if desc.padded_page_size * desc.num_pages_read != payload_len {
            return Err(format!(
                "WRITE_LINEAR_H_HOST payload {payload_len} does not match padded_page_size {} * num_pages_read {}",
                desc.padded_page_size, desc.num_pages_read
            ));
        }
        let payload = &cmd_reg[data_start..data_start + payload_len as usize];
        let dst_offset = desc.dst_sysmem_offset + desc.dst_offset;
        fabric.write_sysmem(dst_offset, payload_len)?.copy_from_slice(payload);
        Ok(cmd_ptr + length as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noctile_noc::{NocArch, WormholeB0};
    use noctile_soc::soc_arch_wormhole_b0;

    static NOC: WormholeB0 = WormholeB0;

    fn fabric() -> MemoryFabric {
        MemoryFabric::with_sysmem_size(soc_arch_wormhole_b0(), 8192)
    }

    fn header(cmd_id: u8, fields: [u32; 5]) -> Vec<u8> {
        let mut buf = vec![cmd_id, 0, 0, 0];
        for f in fields {
            buf.extend_from_slice(&f.to_le_bytes());
        }
        buf
    }

    fn install_l1(fabric: &mut MemoryFabric, x: i32, y: i32) {
        let size = fabric.soc().worker_l1_size() as usize;
        fabric.set_worker_l1(x, y, vec![0u8; size]).expect("valid");
    }

    #[test]
    fn relay_inline_flushes_and_clears_staging_buffer() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let (wx, wy) = soc.get_dram_preferred_worker_endpoint(1).expect("valid");
        install_l1(&mut fabric, wx, wy);

        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);

        let noc_xy_addr = NOC.noc_xy_encoding(wx as u32, wy as u32);
        let mut dispatch_cmd = header(0 /* WRITE_LINEAR */, [noc_xy_addr, 0x2000, 8, 0, 0]);
        dispatch_cmd.extend_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);

        let stride = wire::HEADER_SIZE as u32 + dispatch_cmd.len() as u32;
        let mut stream = header(3 /* RELAY_INLINE */, [dispatch_cmd.len() as u32, stride, 0, 0, 0]);
        stream.extend_from_slice(&dispatch_cmd);

        prefetch.run(&stream, &mut fabric, &mut dispatch).expect("valid");
        assert!(prefetch.dispatch_data().is_empty());
        assert_eq!(fabric.read_l1(wx, wy, 0x2000, 8).expect("valid"), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn relay_inline_noflush_leaves_staging_buffer_populated() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);

        let stride = wire::HEADER_SIZE as u32 + 4;
        let mut stream = header(4 /* RELAY_INLINE_NOFLUSH */, [4, stride, 0, 0, 0]);
        stream.extend_from_slice(&[9, 9, 9, 9]);
        // followed by a TERMINATE so run() completes with residue intentionally absent
        stream.extend_from_slice(&header(6, [0; 5]));

        prefetch.run(&stream, &mut fabric, &mut dispatch).expect("valid");
        assert_eq!(prefetch.dispatch_data(), &[9, 9, 9, 9]);
    }

    #[test]
    fn relay_paged_truncates_by_length_adjust() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);

        let transport = NocTransport::new(soc, &NOC);
        for page in 0..2u32 {
            let noc_addr = transport.get_noc_addr_interleaved(true, 0, 64, page, 0).expect("valid");
            let bytes = vec![page as u8; 64];
            transport.write(&mut fabric, &bytes, noc_addr).expect("valid");
        }

        // is_dram flag in bit 0, start_page in remaining bits of packed_page_flags (field 0).
        let packed_page_flags = 1u32;
        let stream = header(1 /* RELAY_PAGED */, [packed_page_flags, 0, 64, 2, 10]);
        prefetch.process_cmd(&stream, 0, &mut fabric, &mut dispatch).expect("valid");
        assert_eq!(prefetch.dispatch_data().len(), 64 * 2 - 10);
    }

    #[test]
    fn relay_paged_rejects_length_adjust_past_page_size() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);
        let stream = header(1, [0, 0, 64, 1, 64]);
        assert!(prefetch.process_cmd(&stream, 0, &mut fabric, &mut dispatch).is_err());
    }

    #[test]
    fn write_paged_then_interleaved_read_round_trips() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut dispatch = Dispatch::new(soc, &NOC);

        let mut payload = Vec::new();
        for page in 0..4u8 {
            payload.extend(std::iter::repeat(page).take(64));
        }
        let mut stream = header(1 /* WRITE_PAGED */, [1 /* is_dram */, 0, 64, 4, 0]);
        stream.extend_from_slice(&payload);
        dispatch.run(&stream, &mut fabric).expect("valid");

        let transport = NocTransport::new(soc, &NOC);
        for page in 0..4u32 {
            let noc_addr = transport.get_noc_addr_interleaved(true, 0, 64, page, 0).expect("valid");
            let mut out = [0u8; 64];
            transport.read(&fabric, noc_addr, &mut out).expect("valid");
            assert_eq!(out, [page as u8; 64]);
        }
    }

    #[test]
    fn write_packed_no_stride_sends_same_payload_to_all() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut dispatch = Dispatch::new(soc, &NOC);

        let (x0, y0) = (1, 1);
        let (x1, y1) = (1, 2);
        install_l1(&mut fabric, x0, y0);
        install_l1(&mut fabric, x1, y1);

        let flags = PACKED_WRITE_FLAG_NO_STRIDE;
        let count = 2u32;
        let size = 4u32;
        let addr = 0x10;
        let mut stream = header(2 /* WRITE_PACKED */, [flags, count, size, addr, 0]);
        stream.extend_from_slice(&NOC.noc_xy_encoding(x0 as u32, y0 as u32).to_le_bytes());
        stream.extend_from_slice(&NOC.noc_xy_encoding(x1 as u32, y1 as u32).to_le_bytes());
        // pad sub-cmd table to 16-byte alignment
        let sub_cmds_len = wire::HEADER_SIZE + count as usize * 4;
        let padded = align_up_pow2(sub_cmds_len as u32, L1_NOC_ALIGNMENT) as usize;
        stream.resize(padded, 0);
        // NO_STRIDE: a single padded_size(=16) record shared by every destination.
        let mut record = vec![0u8; L1_NOC_ALIGNMENT as usize];
        record[..4].copy_from_slice(&[7, 7, 7, 7]);
        stream.extend_from_slice(&record);

        dispatch.run(&stream, &mut fabric).expect("valid");
        assert_eq!(fabric.read_l1(x0, y0, addr, 4).expect("valid"), &[7, 7, 7, 7]);
        assert_eq!(fabric.read_l1(x1, y1, addr, 4).expect("valid"), &[7, 7, 7, 7]);
    }

    #[test]
    fn write_packed_with_stride_sends_ith_slot_to_ith_destination() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut dispatch = Dispatch::new(soc, &NOC);

        let (x0, y0) = (1, 1);
        let (x1, y1) = (1, 2);
        install_l1(&mut fabric, x0, y0);
        install_l1(&mut fabric, x1, y1);

        let flags = 0u32;
        let count = 2u32;
        let size = 4u32;
        let addr = 0x10;
        let mut stream = header(2, [flags, count, size, addr, 0]);
        stream.extend_from_slice(&NOC.noc_xy_encoding(x0 as u32, y0 as u32).to_le_bytes());
        stream.extend_from_slice(&NOC.noc_xy_encoding(x1 as u32, y1 as u32).to_le_bytes());
        let sub_cmds_len = wire::HEADER_SIZE + count as usize * 4;
        let padded = align_up_pow2(sub_cmds_len as u32, L1_NOC_ALIGNMENT) as usize;
        stream.resize(padded, 0);
        // stride is padded_size(=16): two full 16-byte records, 4 real bytes each.
        let mut record0 = vec![0u8; L1_NOC_ALIGNMENT as usize];
        record0[..4].copy_from_slice(&[1, 1, 1, 1]);
        let mut record1 = vec![0u8; L1_NOC_ALIGNMENT as usize];
        record1[..4].copy_from_slice(&[2, 2, 2, 2]);
        stream.extend_from_slice(&record0);
        stream.extend_from_slice(&record1);

        dispatch.run(&stream, &mut fabric).expect("valid");
        assert_eq!(fabric.read_l1(x0, y0, addr, 4).expect("valid"), &[1, 1, 1, 1]);
        assert_eq!(fabric.read_l1(x1, y1, addr, 4).expect("valid"), &[2, 2, 2, 2]);
    }

    #[test]
    fn write_linear_h_host_copies_into_sysmem() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut dispatch = Dispatch::new(soc, &NOC);
        dispatch.configure_read_buffer(ReadBufferDescriptor {
            padded_page_size: 32,
            dst_sysmem_offset: 0,
            dst_offset: 0,
            num_pages_read: 2,
        });

        let payload: Vec<u8> = (0..64).collect();
        let mut stream = header(3 /* WRITE_LINEAR_H_HOST */, [(wire::HEADER_SIZE + 64) as u32, 0, 0, 0, 0]);
        stream.extend_from_slice(&payload);

        dispatch.run(&stream, &mut fabric).expect("valid");
        assert_eq!(fabric.read_sysmem(0, 64).expect("valid"), payload.as_slice());
    }

    #[test]
    fn write_linear_h_host_without_configured_buffer_is_fatal() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut dispatch = Dispatch::new(soc, &NOC);
        let mut stream = header(3, [(wire::HEADER_SIZE + 4) as u32, 0, 0, 0, 0]);
        stream.extend_from_slice(&[0, 0, 0, 0]);
        assert!(dispatch.run(&stream, &mut fabric).is_err());
    }

    #[test]
    fn unknown_prefetch_command_aborts_without_partial_dispatch() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);
        let stream = header(200, [0; 5]);
        assert!(prefetch.run(&stream, &mut fabric, &mut dispatch).is_err());
    }

    #[test]
    fn relay_paged_packed_reads_each_sub_command_worth_of_pages() {
        let soc = soc_arch_wormhole_b0();
        let mut fabric = fabric();
        let mut prefetch = Prefetch::new(soc, &NOC);
        let mut dispatch = Dispatch::new(soc, &NOC);

        let transport = NocTransport::new(soc, &NOC);
        // sub-cmd 0: 1 page of 64 bytes at DRAM page id 0, filled with 0xAA.
        let addr0 = transport.get_noc_addr_interleaved(true, 0, 64, 0, 0).expect("valid");
        transport.write(&mut fabric, &[0xAAu8; 64], addr0).expect("valid");
        // sub-cmd 1: 1 page of 32 bytes at DRAM page id 0 (base 0x1000), filled with 0xBB.
        let addr1 = transport.get_noc_addr_interleaved(true, 0x1000, 32, 0, 0).expect("valid");
        transport.write(&mut fabric, &[0xBBu8; 32], addr1).expect("valid");

        let count = 2u32;
        let total_length = 64 + 32;
        let stride = wire::HEADER_SIZE as u32 + count * wire::RELAY_PAGED_PACKED_SUB_CMD_SIZE as u32;
        let mut stream = header(2 /* RELAY_PAGED_PACKED */, [count, total_length, stride, 0, 0]);
        // sub-cmd 0: (start_page, log_page_size=6 -> 64, base_addr, length)
        for f in [0u32, 6, 0, 64] {
            stream.extend_from_slice(&f.to_le_bytes());
        }
        // sub-cmd 1: (start_page, log_page_size=5 -> 32, base_addr, length)
        for f in [0u32, 5, 0x1000, 32] {
            stream.extend_from_slice(&f.to_le_bytes());
        }
        stream.extend_from_slice(&header(6 /* TERMINATE */, [0; 5]));

        prefetch.run(&stream, &mut fabric, &mut dispatch).expect("valid");
        let staged = prefetch.dispatch_data();
        assert_eq!(&staged[0..64], &[0xAAu8; 64][..]);
        assert_eq!(&staged[64..96], &[0xBBu8; 32][..]);
    }
}
