//! Wire layout for `CQPrefetchCmd`/`CQDispatchCmd`: a one-byte discriminant
//! followed by five little-endian `u32` payload slots, 24 bytes total.
//! Every command type fits its fields into those five slots; unused slots
//! are simply not read back out by the matching variant.

/// Size of the fixed command header shared by every Prefetch and Dispatch
/// command, regardless of which variant it carries.
pub const HEADER_SIZE: usize = 24;

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, String> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or_else(|| format!("command stream overflow reading u32 at offset {offset}"))?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Checks that `needed` bytes starting at `cmd_ptr` fit within `buf`,
/// with the reference implementation's error message shape.
pub fn check_cmd_reg_limit(buf: &[u8], cmd_ptr: usize, needed: u32) -> Result<(), String> {
    let available = buf.len().saturating_sub(cmd_ptr) as u32;
    if available < needed {
        return Err(format!(
            "command region overflow: got {available} want {needed}"
        ));
    }
    Ok(())
}

fn read_header(buf: &[u8], cmd_ptr: usize) -> Result<(u8, [u32; 5]), String> {
    check_cmd_reg_limit(buf, cmd_ptr, HEADER_SIZE as u32)?;
    let cmd_id = buf[cmd_ptr];
    let mut fields = [0u32; 5];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = read_u32(buf, cmd_ptr + 4 + i * 4)?;
    }
    Ok((cmd_id, fields))
}

const PREFETCH_RELAY_LINEAR: u8 = 0;
const PREFETCH_RELAY_PAGED: u8 = 1;
const PREFETCH_RELAY_PAGED_PACKED: u8 = 2;
const PREFETCH_RELAY_INLINE: u8 = 3;
const PREFETCH_RELAY_INLINE_NOFLUSH: u8 = 4;
const PREFETCH_STALL: u8 = 5;
const PREFETCH_TERMINATE: u8 = 6;
const PREFETCH_EXEC_BUF: u8 = 7;
const PREFETCH_EXEC_BUF_END: u8 = 8;
const PREFETCH_DEBUG: u8 = 9;

/// `packed_page_flags` bit layout for `RELAY_PAGED`/`WRITE_PAGED`'s combined
/// is-DRAM/start-page field: `CQ_PREFETCH_RELAY_PAGED_IS_DRAM_SHIFT`,
/// `_START_PAGE_SHIFT`, `_START_PAGE_MASK` (spec.md §6 names these as real
/// hardware flag bits the core interprets). The header defining their actual
/// numeric values was never retrieved into `examples/original_source/` (no
/// `grep` hit for any of the three names), so these are this crate's own
/// assignment — is-DRAM in bit 0, start-page in the remaining 31 bits — not
/// hardware-matched. Same category of guess as
/// `PACKED_WRITE_FLAG_MCAST`/`PACKED_WRITE_FLAG_NO_STRIDE` below; see
/// DESIGN.md.
const CQ_PREFETCH_RELAY_PAGED_IS_DRAM_SHIFT: u32 = 0;
const CQ_PREFETCH_RELAY_PAGED_START_PAGE_SHIFT: u32 = 1;
const CQ_PREFETCH_RELAY_PAGED_START_PAGE_MASK: u32 = 0x7fff_ffff;

fn decode_packed_page_flags(packed_page_flags: u32) -> (bool, u32) {
    let is_dram = (packed_page_flags >> CQ_PREFETCH_RELAY_PAGED_IS_DRAM_SHIFT) & 1 != 0;
    let start_page =
        (packed_page_flags >> CQ_PREFETCH_RELAY_PAGED_START_PAGE_SHIFT) & CQ_PREFETCH_RELAY_PAGED_START_PAGE_MASK;
    (is_dram, start_page)
}

#[derive(Debug, Clone, Copy)]
pub enum CQPrefetchCmd {
    RelayLinear { noc_xy_addr: u32, addr: u32, length: u32 },
    RelayPaged { is_dram: bool, start_page: u32, base_addr: u32, page_size: u32, pages: u32, length_adjust: u32 },
    RelayPagedPacked { count: u32, total_length: u32, stride: u32 },
    RelayInline { length: u32, stride: u32 },
    RelayInlineNoflush { length: u32, stride: u32 },
    Stall,
    Terminate,
}

/// Decodes the Prefetch command header at `cmd_ptr`. Does not read any
/// variable-length payload that follows the header (sub-commands or
/// inline data) — callers read that separately, since its size depends on
/// the decoded fields.
pub fn decode_prefetch(buf: &[u8], cmd_ptr: usize) -> Result<CQPrefetchCmd, String> {
    let (cmd_id, f) = read_header(buf, cmd_ptr)?;
    match cmd_id {
        PREFETCH_RELAY_LINEAR => Ok(CQPrefetchCmd::RelayLinear { noc_xy_addr: f[0], addr: f[1], length: f[2] }),
        PREFETCH_RELAY_PAGED => {
            let (is_dram, start_page) = decode_packed_page_flags(f[0]);
            Ok(CQPrefetchCmd::RelayPaged {
                is_dram,
                start_page,
                base_addr: f[1],
                page_size: f[2],
                pages: f[3],
                length_adjust: f[4],
            })
        }
        PREFETCH_RELAY_PAGED_PACKED => {
            Ok(CQPrefetchCmd::RelayPagedPacked { count: f[0], total_length: f[1], stride: f[2] })
        }
        PREFETCH_RELAY_INLINE => Ok(CQPrefetchCmd::RelayInline { length: f[0], stride: f[1] }),
        PREFETCH_RELAY_INLINE_NOFLUSH => Ok(CQPrefetchCmd::RelayInlineNoflush { length: f[0], stride: f[1] }),
        PREFETCH_STALL => Ok(CQPrefetchCmd::Stall),
        PREFETCH_TERMINATE => Ok(CQPrefetchCmd::Terminate),
        PREFETCH_EXEC_BUF | PREFETCH_EXEC_BUF_END | PREFETCH_DEBUG => {
            Err(format!("prefetch command {cmd_id} at offset {cmd_ptr} is recognized but out of scope"))
        }
        other => Err(format!("invalid prefetch command: {other} at offset {cmd_ptr}")),
    }
}

/// Size of one `RELAY_PAGED_PACKED` sub-command: four little-endian `u32`
/// fields, no padding.
pub const RELAY_PAGED_PACKED_SUB_CMD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct RelayPagedPackedSubCmd {
    pub start_page: u32,
    pub log_page_size: u32,
    pub base_addr: u32,
    pub length: u32,
}

/// Decodes one `RELAY_PAGED_PACKED` sub-command at `offset`.
pub fn decode_relay_paged_packed_sub_cmd(buf: &[u8], offset: usize) -> Result<RelayPagedPackedSubCmd, String> {
    Ok(RelayPagedPackedSubCmd {
        start_page: read_u32(buf, offset)?,
        log_page_size: read_u32(buf, offset + 4)?,
        base_addr: read_u32(buf, offset + 8)?,
        length: read_u32(buf, offset + 12)?,
    })
}

const DISPATCH_WRITE_LINEAR: u8 = 0;
const DISPATCH_WRITE_PAGED: u8 = 1;
const DISPATCH_WRITE_PACKED: u8 = 2;
const DISPATCH_WRITE_LINEAR_H_HOST: u8 = 3;
const DISPATCH_WAIT: u8 = 4;
const DISPATCH_TERMINATE: u8 = 5;
const DISPATCH_WRITE_LINEAR_H: u8 = 6;
const DISPATCH_GO: u8 = 7;
const DISPATCH_SINK: u8 = 8;
const DISPATCH_DEBUG: u8 = 9;
const DISPATCH_DELAY: u8 = 10;

#[derive(Debug, Clone, Copy)]
pub enum CQDispatchCmd {
    WriteLinear { noc_xy_addr: u32, addr: u32, length: u32, num_mcast_dests: u32 },
    WritePaged { is_dram: bool, start_page: u32, base_addr: u32, page_size: u32, pages: u32 },
    WritePacked { flags: u32, count: u32, size: u32, addr: u32 },
    WriteLinearHHost { length: u32 },
    Wait,
    Terminate,
}

pub fn decode_dispatch(buf: &[u8], cmd_ptr: usize) -> Result<CQDispatchCmd, String> {
    let (cmd_id, f) = read_header(buf, cmd_ptr)?;
    match cmd_id {
        DISPATCH_WRITE_LINEAR => Ok(CQDispatchCmd::WriteLinear {
            noc_xy_addr: f[0],
            addr: f[1],
            length: f[2],
            num_mcast_dests: f[3],
        }),
        DISPATCH_WRITE_PAGED => {
            let (is_dram, start_page) = decode_packed_page_flags(f[0]);
            Ok(CQDispatchCmd::WritePaged { is_dram, start_page, base_addr: f[1], page_size: f[2], pages: f[3] })
        }
        DISPATCH_WRITE_PACKED => Ok(CQDispatchCmd::WritePacked { flags: f[0], count: f[1], size: f[2], addr: f[3] }),
        DISPATCH_WRITE_LINEAR_H_HOST => Ok(CQDispatchCmd::WriteLinearHHost { length: f[0] }),
        DISPATCH_WAIT => Ok(CQDispatchCmd::Wait),
        DISPATCH_TERMINATE => Ok(CQDispatchCmd::Terminate),
        DISPATCH_WRITE_LINEAR_H | DISPATCH_GO | DISPATCH_SINK | DISPATCH_DEBUG | DISPATCH_DELAY => {
            Err(format!("dispatch command {cmd_id} at offset {cmd_ptr} is recognized but out of scope"))
        }
        other => Err(format!("invalid dispatch command: {other} at offset {cmd_ptr}")),
    }
}
