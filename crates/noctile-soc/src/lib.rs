//! SoC-wide topology: which grid cell is which kind of core, which workers
//! are the preferred NoC endpoint for each DRAM channel, and the
//! logical/routing coordinate translation workers are addressed by.
//!
//! A [`SocArch`] is built once via [`SocArch::new`] plus a sequence of
//! `set_*` calls and [`SocArch::finalize`], then used read-only for the
//! rest of the process. [`soc_arch_grayskull`] and [`soc_arch_wormhole_b0`]
//! hand back the two architecture tables this crate ships, built exactly
//! this way and shared by `'static` reference.

use std::sync::OnceLock;

/// What kind of silicon occupies a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreType {
    Arc,
    Dram,
    Eth,
    Pcie,
    Worker,
    Harvested,
    RouterOnly,
    Invalid,
}

/// Sub-role of a [`CoreType::Worker`] cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCoreType {
    None,
    ComputeAndStorage,
    StorageOnly,
    Dispatch,
}

/// Builder and read-only table for one chip's core-type grid.
///
/// Coordinates throughout are "routing" coordinates: raw `(x, y)` grid
/// positions as the NoC addresses them. A worker core additionally has a
/// "logical" coordinate: its index among workers only, in routing order,
/// computed by [`SocArch::finalize`].
pub struct SocArch {
    x_size: i32,
    y_size: i32,
    worker_l1_size: u32,
    storage_core_l1_bank_size: u32,
    dram_bank_size: u32,
    eth_l1_size: u32,
    num_dram_channels: i32,

    core_types: Vec<CoreType>,
    worker_core_types: Vec<WorkerCoreType>,
    dram_preferred_worker_endpoints: Vec<(i32, i32)>,

    worker_x_size: i32,
    worker_y_size: i32,
    compute_and_storage_x_size: i32,
    compute_and_storage_y_size: i32,
    worker_logical_to_routing_x: Vec<i32>,
    worker_logical_to_routing_y: Vec<i32>,
    worker_routing_to_logical_x: Vec<i32>,
    worker_routing_to_logical_y: Vec<i32>,
    finalized: bool,
}

fn xy_to_string(x: i32, y: i32) -> String {
    format!("({x}, {y})")
}

impl SocArch {
    #[must_use]
    pub fn new(
        x_size: i32,
        y_size: i32,
        worker_l1_size: u32,
        storage_core_l1_bank_size: u32,
        dram_bank_size: u32,
        eth_l1_size: u32,
        num_dram_channels: i32,
    ) -> Self {
        let cells = (x_size * y_size) as usize;
        SocArch {
            x_size,
            y_size,
            worker_l1_size,
            storage_core_l1_bank_size,
            dram_bank_size,
            eth_l1_size,
            num_dram_channels,
            core_types: vec![CoreType::Invalid; cells],
            worker_core_types: vec![WorkerCoreType::None; cells],
            dram_preferred_worker_endpoints: vec![(0, 0); num_dram_channels as usize],
            worker_x_size: 0,
            worker_y_size: 0,
            compute_and_storage_x_size: 0,
            compute_and_storage_y_size: 0,
            worker_logical_to_routing_x: Vec::new(),
            worker_logical_to_routing_y: Vec::new(),
            worker_routing_to_logical_x: Vec::new(),
            worker_routing_to_logical_y: Vec::new(),
            finalized: false,
        }
    }

    fn get_xy(&self, x: i32, y: i32) -> usize {
        (x * self.y_size + y) as usize
    }

    fn check_coord(&self, x: i32, y: i32) -> Result<(), String> {
        if x < 0 || x >= self.x_size || y < 0 || y >= self.y_size {
            return Err(format!("core coordinates {} are out of range", xy_to_string(x, y)));
        }
        Ok(())
    }

    /// Assigns a single cell's core type. Errors if already assigned.
    pub fn set_core_type(&mut self, core_type: CoreType, x: i32, y: i32) -> Result<(), String> {
        self.check_coord(x, y)?;
        let xy = self.get_xy(x, y);
        if self.core_types[xy] != CoreType::Invalid {
            return Err(format!("core type at {} is already set", xy_to_string(x, y)));
        }
        self.core_types[xy] = core_type;
        Ok(())
    }

    /// Assigns a column range `[y0, y1]` at a fixed `x` to one core type.
    pub fn set_core_type_column(
        &mut self,
        core_type: CoreType,
        x: i32,
        y0: i32,
        y1: i32,
    ) -> Result<(), String> {
        for y in y0..=y1 {
            self.set_core_type(core_type, x, y)?;
        }
        Ok(())
    }

    /// Assigns a worker sub-role to an already-WORKER cell.
    pub fn set_worker_core_type(
        &mut self,
        worker_core_type: WorkerCoreType,
        x: i32,
        y: i32,
    ) -> Result<(), String> {
        self.check_coord(x, y)?;
        let xy = self.get_xy(x, y);
        if self.core_types[xy] != CoreType::Worker {
            return Err(format!("core at {} is not worker", xy_to_string(x, y)));
        }
        if self.worker_core_types[xy] != WorkerCoreType::None {
            return Err(format!("worker core type at {} is already set", xy_to_string(x, y)));
        }
        self.worker_core_types[xy] = worker_core_type;
        Ok(())
    }

    pub fn set_worker_core_type_column(
        &mut self,
        worker_core_type: WorkerCoreType,
        x: i32,
        y0: i32,
        y1: i32,
    ) -> Result<(), String> {
        for y in y0..=y1 {
            self.set_worker_core_type(worker_core_type, x, y)?;
        }
        Ok(())
    }

    /// Records which worker cell is the preferred NoC endpoint for a DRAM
    /// channel. Later calls for the same channel silently overwrite, as in
    /// the reference builder sequence.
    pub fn set_dram_preferred_worker_endpoint(
        &mut self,
        dram_channel: i32,
        x: i32,
        y: i32,
    ) -> Result<(), String> {
        if dram_channel < 0 || dram_channel >= self.num_dram_channels {
            return Err(format!("DRAM channel {dram_channel} is out of range"));
        }
        self.dram_preferred_worker_endpoints[dram_channel as usize] = (x, y);
        Ok(())
    }

    /// Computes the logical/routing coordinate bijections from the core
    /// types assigned so far. Must be called once, after all `set_*` calls.
    pub fn finalize(&mut self) {
        let mut is_worker_x = vec![false; self.x_size as usize];
        let mut is_worker_y = vec![false; self.y_size as usize];
        let mut is_cs_x = vec![false; self.x_size as usize];
        let mut is_cs_y = vec![false; self.y_size as usize];

        for x in 0..self.x_size {
            for y in 0..self.y_size {
                let xy = self.get_xy(x, y);
                if self.core_types[xy] == CoreType::Worker {
                    is_worker_x[x as usize] = true;
                    is_worker_y[y as usize] = true;
                    if self.worker_core_types[xy] == WorkerCoreType::ComputeAndStorage {
                        is_cs_x[x as usize] = true;
                        is_cs_y[y as usize] = true;
                    }
                }
            }
        }

        self.worker_x_size = 0;
        self.worker_y_size = 0;
        self.compute_and_storage_x_size = 0;
        self.compute_and_storage_y_size = 0;
        self.worker_routing_to_logical_x = vec![-1; self.x_size as usize];
        self.worker_routing_to_logical_y = vec![-1; self.y_size as usize];

        for x in 0..self.x_size as usize {
            if is_worker_x[x] {
                self.worker_routing_to_logical_x[x] = self.worker_x_size;
                self.worker_x_size += 1;
                if is_cs_x[x] {
                    self.compute_and_storage_x_size += 1;
                }
            }
        }
        for y in 0..self.y_size as usize {
            if is_worker_y[y] {
                self.worker_routing_to_logical_y[y] = self.worker_y_size;
                self.worker_y_size += 1;
                if is_cs_y[y] {
                    self.compute_and_storage_y_size += 1;
                }
            }
        }

        self.worker_logical_to_routing_x = vec![0; self.worker_x_size as usize];
        self.worker_logical_to_routing_y = vec![0; self.worker_y_size as usize];
        for x in 0..self.x_size as usize {
            let logical_x = self.worker_routing_to_logical_x[x];
            if logical_x >= 0 {
                self.worker_logical_to_routing_x[logical_x as usize] = x as i32;
            }
        }
        for y in 0..self.y_size as usize {
            let logical_y = self.worker_routing_to_logical_y[y];
            if logical_y >= 0 {
                self.worker_logical_to_routing_y[logical_y as usize] = y as i32;
            }
        }

        self.finalized = true;
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn x_size(&self) -> i32 {
        self.x_size
    }

    #[must_use]
    pub fn y_size(&self) -> i32 {
        self.y_size
    }

    #[must_use]
    pub fn worker_l1_size(&self) -> u32 {
        self.worker_l1_size
    }

    #[must_use]
    pub fn storage_core_l1_bank_size(&self) -> u32 {
        self.storage_core_l1_bank_size
    }

    #[must_use]
    pub fn dram_bank_size(&self) -> u32 {
        self.dram_bank_size
    }

    #[must_use]
    pub fn eth_l1_size(&self) -> u32 {
        self.eth_l1_size
    }

    #[must_use]
    pub fn num_dram_channels(&self) -> i32 {
        self.num_dram_channels
    }

    #[must_use]
    pub fn worker_x_size(&self) -> i32 {
        self.worker_x_size
    }

    #[must_use]
    pub fn worker_y_size(&self) -> i32 {
        self.worker_y_size
    }

    #[must_use]
    pub fn compute_and_storage_x_size(&self) -> i32 {
        self.compute_and_storage_x_size
    }

    #[must_use]
    pub fn compute_and_storage_y_size(&self) -> i32 {
        self.compute_and_storage_y_size
    }

    pub fn core_type(&self, x: i32, y: i32) -> Result<CoreType, String> {
        self.check_coord(x, y)?;
        Ok(self.core_types[self.get_xy(x, y)])
    }

    pub fn worker_core_type(&self, x: i32, y: i32) -> Result<WorkerCoreType, String> {
        self.check_coord(x, y)?;
        Ok(self.worker_core_types[self.get_xy(x, y)])
    }

    /// Finds which DRAM channel's preferred worker endpoint is `(x, y)`.
    ///
    /// ACHTUNG: only preferred workers are considered here; it is assumed
    /// callers always route DRAM traffic through the preferred worker, as
    /// in the reference implementation.
    pub fn get_core_dram_channel(&self, x: i32, y: i32) -> Result<i32, String> {
        self.dram_preferred_worker_endpoints
            .iter()
            .position(|&(ex, ey)| ex == x && ey == y)
            .map(|i| i as i32)
            .ok_or_else(|| format!("DRAM channel not found for core at {}", xy_to_string(x, y)))
    }

    pub fn get_dram_preferred_worker_endpoint(&self, dram_channel: i32) -> Result<(i32, i32), String> {
        if dram_channel < 0 || dram_channel >= self.num_dram_channels {
            return Err(format!("DRAM channel {dram_channel} is out of range"));
        }
        Ok(self.dram_preferred_worker_endpoints[dram_channel as usize])
    }

    pub fn worker_logical_to_routing_x(&self, logical_x: i32) -> Result<i32, String> {
        if logical_x < 0 || logical_x >= self.worker_x_size {
            return Err(format!("logical core x coordinate {logical_x} is out of range"));
        }
        Ok(self.worker_logical_to_routing_x[logical_x as usize])
    }

    pub fn worker_logical_to_routing_y(&self, logical_y: i32) -> Result<i32, String> {
        if logical_y < 0 || logical_y >= self.worker_y_size {
            return Err(format!("logical core y coordinate {logical_y} is out of range"));
        }
        Ok(self.worker_logical_to_routing_y[logical_y as usize])
    }

    /// Returns the logical worker column index for a routing `x`, or `-1`
    /// if that column has no worker cells.
    pub fn worker_routing_to_logical_x(&self, x: i32) -> Result<i32, String> {
        if x < 0 || x >= self.x_size {
            return Err(format!("core x coordinate {x} is out of range"));
        }
        Ok(self.worker_routing_to_logical_x[x as usize])
    }

    pub fn worker_routing_to_logical_y(&self, y: i32) -> Result<i32, String> {
        if y < 0 || y >= self.y_size {
            return Err(format!("core y coordinate {y} is out of range"));
        }
        Ok(self.worker_routing_to_logical_y[y as usize])
    }
}

fn build_grayskull() -> SocArch {
    let mut soc = SocArch::new(13, 12, 1_048_576, 524_288, 1_073_741_824, 0, 8);

    soc.set_core_type(CoreType::Arc, 0, 2).unwrap();
    soc.set_core_type(CoreType::Pcie, 0, 4).unwrap();

    for &x in &[1, 4, 7, 10] {
        soc.set_core_type(CoreType::Dram, x, 0).unwrap();
        soc.set_core_type(CoreType::Dram, x, 6).unwrap();
    }

    for x in 1..=12 {
        soc.set_core_type_column(CoreType::Worker, x, 1, 5).unwrap();
        soc.set_core_type_column(CoreType::Worker, x, 7, 11).unwrap();
        soc.set_worker_core_type_column(WorkerCoreType::ComputeAndStorage, x, 1, 5)
            .unwrap();
        soc.set_worker_core_type_column(WorkerCoreType::ComputeAndStorage, x, 7, 10)
            .unwrap();
    }

    for &x in &[2, 3, 4, 5, 6, 8, 9, 10, 11, 12] {
        soc.set_worker_core_type(WorkerCoreType::StorageOnly, x, 11).unwrap();
    }
    soc.set_worker_core_type(WorkerCoreType::Dispatch, 1, 11).unwrap();
    soc.set_worker_core_type(WorkerCoreType::Dispatch, 7, 11).unwrap();

    for &(x, y) in &[
        (0, 0), (0, 11), (0, 1), (0, 10), (0, 9), (0, 3), (0, 8), (0, 7), (0, 5), (0, 6),
        (12, 0), (11, 0), (2, 0), (3, 0), (9, 0), (8, 0), (5, 0), (6, 0),
        (12, 6), (11, 6), (2, 6), (3, 6), (9, 6), (8, 6), (5, 6), (6, 6),
    ] {
        soc.set_core_type(CoreType::RouterOnly, x, y).unwrap();
    }

    let endpoints = [(1, 0), (1, 6), (4, 0), (4, 6), (7, 0), (7, 6), (10, 0), (10, 6)];
    for (channel, &(x, y)) in endpoints.iter().enumerate() {
        soc.set_dram_preferred_worker_endpoint(channel as i32, x, y).unwrap();
    }

    soc.finalize();
    soc
}

fn build_wormhole_b0() -> SocArch {
    let mut soc = SocArch::new(10, 12, 1_499_136, 1_499_136, 1_073_741_824, 262_144, 12);

    soc.set_core_type(CoreType::Arc, 0, 10).unwrap();
    soc.set_core_type(CoreType::Pcie, 0, 3).unwrap();

    for &(x, y) in &[
        (0, 0), (0, 1), (0, 11), (0, 5), (0, 6), (0, 7),
        (5, 0), (5, 1), (5, 11), (5, 2), (5, 9), (5, 10),
        (5, 3), (5, 4), (5, 8), (5, 5), (5, 6), (5, 7),
    ] {
        soc.set_core_type(CoreType::Dram, x, y).unwrap();
    }

    for &x in &[1, 2, 3, 4, 6, 7, 8, 9] {
        soc.set_core_type(CoreType::Eth, x, 0).unwrap();
        soc.set_core_type(CoreType::Eth, x, 6).unwrap();
    }

    for &x in &[1, 2, 3, 4, 6, 7, 8, 9] {
        soc.set_core_type_column(CoreType::Worker, x, 1, 5).unwrap();
        soc.set_core_type_column(CoreType::Worker, x, 7, 11).unwrap();
    }

    // Per reference (see soc_arch_wormhole_b0.cpp): only one dispatch core
    // is currently wired up, the rest of the bottom routing row is left
    // commented out pending a revisit of worker routing there.
    soc.set_worker_core_type(WorkerCoreType::Dispatch, 1, 11).unwrap();

    for &y in &[2, 4, 8, 9] {
        soc.set_core_type(CoreType::RouterOnly, 0, y).unwrap();
    }

    let endpoints = [
        (0, 11), (0, 1), (0, 5), (0, 7), (5, 1), (5, 11),
        (5, 2), (5, 9), (5, 8), (5, 3), (5, 5), (5, 7),
    ];
    for (channel, &(x, y)) in endpoints.iter().enumerate() {
        soc.set_dram_preferred_worker_endpoint(channel as i32, x, y).unwrap();
    }

    soc.finalize();
    soc
}

static GRAYSKULL: OnceLock<SocArch> = OnceLock::new();
static WORMHOLE_B0: OnceLock<SocArch> = OnceLock::new();

/// The GRAYSKULL architecture table, built once and shared for the life
/// of the process.
#[must_use]
pub fn soc_arch_grayskull() -> &'static SocArch {
    GRAYSKULL.get_or_init(build_grayskull)
}

/// The WORMHOLE_B0 architecture table, built once and shared for the life
/// of the process.
#[must_use]
pub fn soc_arch_wormhole_b0() -> &'static SocArch {
    WORMHOLE_B0.get_or_init(build_wormhole_b0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayskull_grid_size_and_channel_count() {
        let soc = soc_arch_grayskull();
        assert_eq!(soc.x_size(), 13);
        assert_eq!(soc.y_size(), 12);
        assert_eq!(soc.num_dram_channels(), 8);
        assert!(soc.is_finalized());
    }

    #[test]
    fn grayskull_dispatch_cores_are_workers() {
        let soc = soc_arch_grayskull();
        assert_eq!(soc.core_type(1, 11).expect("valid"), CoreType::Worker);
        assert_eq!(soc.worker_core_type(1, 11).expect("valid"), WorkerCoreType::Dispatch);
        assert_eq!(soc.worker_core_type(7, 11).expect("valid"), WorkerCoreType::Dispatch);
    }

    #[test]
    fn grayskull_dram_channel_resolves_preferred_worker() {
        let soc = soc_arch_grayskull();
        assert_eq!(soc.get_core_dram_channel(1, 0).expect("valid"), 0);
        assert_eq!(soc.get_core_dram_channel(10, 6).expect("valid"), 7);
        assert!(soc.get_core_dram_channel(1, 1).is_err());
    }

    #[test]
    fn wormhole_b0_dram_channel_zero_is_0_11() {
        let soc = soc_arch_wormhole_b0();
        let (x, y) = soc.get_dram_preferred_worker_endpoint(0).expect("valid");
        assert_eq!((x, y), (0, 11));
        assert_eq!(soc.get_core_dram_channel(0, 11).expect("valid"), 0);
    }

    #[test]
    fn worker_logical_routing_round_trips() {
        let soc = soc_arch_grayskull();
        assert!(soc.worker_x_size() > 0);
        for logical_x in 0..soc.worker_x_size() {
            let routing_x = soc.worker_logical_to_routing_x(logical_x).expect("valid");
            assert_eq!(soc.worker_routing_to_logical_x(routing_x).expect("valid"), logical_x);
        }
    }

    #[test]
    fn non_worker_column_has_sentinel_logical_coordinate() {
        let soc = soc_arch_grayskull();
        // x = 0 is ARC/PCIE/ROUTER_ONLY only, never WORKER.
        assert_eq!(soc.worker_routing_to_logical_x(0).expect("valid"), -1);
    }

    #[test]
    fn duplicate_core_type_assignment_is_rejected() {
        let mut soc = SocArch::new(4, 4, 1024, 1024, 4096, 0, 1);
        soc.set_core_type(CoreType::Worker, 1, 1).expect("valid");
        let err = soc.set_core_type(CoreType::Dram, 1, 1).unwrap_err();
        assert!(err.contains("already set"));
    }

    #[test]
    fn out_of_range_coordinate_is_rejected() {
        let soc = soc_arch_grayskull();
        assert!(soc.core_type(13, 0).is_err());
        assert!(soc.core_type(0, 12).is_err());
    }

    #[test]
    fn worker_core_type_requires_worker_cell() {
        let mut soc = SocArch::new(4, 4, 1024, 1024, 4096, 0, 1);
        soc.set_core_type(CoreType::Dram, 1, 1).expect("valid");
        let err = soc
            .set_worker_core_type(WorkerCoreType::Dispatch, 1, 1)
            .unwrap_err();
        assert!(err.contains("not worker"));
    }

    #[test]
    fn compute_and_storage_axis_excludes_storage_only_row() {
        let soc = soc_arch_grayskull();
        // Row y=11 holds STORAGE_ONLY/DISPATCH workers, never COMPUTE_AND_STORAGE,
        // so the compute-and-storage y-axis size is one shorter than the full
        // worker y-axis size.
        assert_eq!(soc.compute_and_storage_y_size(), soc.worker_y_size() - 1);
    }
}
