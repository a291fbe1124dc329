//! The typed configuration surface: every tunable in §6's configuration
//! key list, grouped the way the keys are namespaced (`sim.chp.*`,
//! `sim.device.*`, `lint.*`, `net.*`) into one struct per namespace and
//! threaded through the engine as plain fields rather than looked up by
//! string at runtime, mirroring how the lineage crate centralizes its
//! scattered tunables into a single `Clone + PartialEq` params struct.

use hashbrown::HashMap;

/// `sim.chp.*`: defaults for statement cost annotations and a couple of
/// CHP-lowering feature toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChpConfig {
    pub default_delay: u64,
    pub default_energy: u64,
    pub default_area: u64,
    pub default_leakage: u64,
    pub detailed_delay_annotation: bool,
    pub inf_loop_opt: bool,
}

impl Default for ChpConfig {
    fn default() -> Self {
        Self {
            default_delay: 10,
            default_energy: 0,
            default_area: 0,
            default_leakage: 0,
            detailed_delay_annotation: false,
            inf_loop_opt: true,
        }
    }
}

/// `sim.device.*`: the analog bridge's timing and waveform-dump knobs.
/// Carried even though this crate does not itself run an analog solver,
/// since the bridge contract in [`crate::glue::analog`] is configured
/// through these values.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub timescale: f64,
    pub analog_window: u64,
    pub settling_time: u64,
    pub waveform_time: u64,
    pub waveform_steps: u32,
    pub dump_all: bool,
    pub output_format: String,
    pub outfile: Option<String>,
    pub stop_time: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timescale: 1e-12,
            analog_window: 100,
            settling_time: 10,
            waveform_time: 0,
            waveform_steps: 0,
            dump_all: false,
            output_format: "vcd".to_string(),
            outfile: None,
            stop_time: None,
        }
    }
}

/// `lint.*`: thresholds consulted by the exclusivity/timing-fork monitors
/// when judging whether a transition is "fast" or "slow" relative to
/// supply voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LintConfig {
    pub vdd: f64,
    pub slewrate_fast_threshold: f64,
    pub slewrate_slow_threshold: f64,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            vdd: 1.0,
            slewrate_fast_threshold: 0.1,
            slewrate_slow_threshold: 0.9,
        }
    }
}

/// `net.*`: netlist-wide elaboration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    pub black_box_mode: bool,
    pub global_vdd: bool,
    pub global_gnd: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            black_box_mode: false,
            global_vdd: true,
            global_gnd: true,
        }
    }
}

/// Identifies one CHP statement for the per-statement annotation
/// override map: a process name plus the statement id assigned during
/// graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    pub process: String,
    pub statement_id: u32,
}

/// A per-statement override for `sim.chp.<process>.<id>.D`, `.D_bw`, `.E`,
/// `.<process>.leakage`, `.<process>.area`. Any field left `None` falls
/// back to [`ChpConfig`]'s process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementCostOverride {
    pub delay: Option<u64>,
    pub bw_cost: Option<u64>,
    pub energy: Option<u64>,
    pub leakage: Option<u64>,
    pub area: Option<u64>,
}

/// The full typed configuration surface, assembled once at simulator
/// construction and never mutated mid-run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimConfig {
    pub chp: ChpConfig,
    pub device: DeviceConfig,
    pub lint: LintConfig,
    pub net: NetConfig,
    /// The dynamic-key annotation overrides from §6's last configuration
    /// bullet, consulted at CHP-graph-build time rather than at runtime.
    pub statement_overrides: HashMap<StatementKey, StatementCostOverride>,
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement_override(&self, process: &str, statement_id: u32) -> StatementCostOverride {
        self.statement_overrides
            .get(&StatementKey {
                process: process.to_string(),
                statement_id,
            })
            .copied()
            .unwrap_or_default()
    }
}
