//! Two-phase instance-tree traversal: port binding plus `spec` directive
//! installation (phase 1), then fanout precomputation (phase 2).
//!
//! Elaboration itself (expanding parameterized process definitions into
//! concrete instances) is out of scope; this module consumes an already
//! expanded [`InstanceSpec`] tree, which is as far as a front end would
//! need to go before handing off to the simulator.

use actsim_types::GlobalOffset;

use crate::constraints::{Direction, EdgeSelector, ExclusivityTables, Policy, TimingFork, TimingForkTable};
use crate::hierarchy::SimLevel;
use crate::state::fanout::{ActorId, FanoutTable};

/// A `spec` body directive attached to one instance, applied during
/// phase 1 before recursing into children.
#[derive(Debug, Clone)]
pub enum SpecDirective {
    ExclHi(Vec<GlobalOffset>),
    ExclLo(Vec<GlobalOffset>),
    MkExclHi(Vec<GlobalOffset>),
    MkExclLo(Vec<GlobalOffset>),
    /// Booleans that start `X` and must be randomly resolved during
    /// `runInit` step 3.
    RandInit(Vec<GlobalOffset>),
    /// Marks a boolean as subject to hazard detection.
    Hazard(GlobalOffset),
    TimingFork {
        name: String,
        root: GlobalOffset,
        a: GlobalOffset,
        b: GlobalOffset,
        margin: u64,
        root_edge: EdgeSelector,
        a_edge: EdgeSelector,
        b_edge: EdgeSelector,
    },
}

/// One instance's port-offset tables: its own ports, reversed per the
/// calling convention, appended after the ports it inherited from its
/// parent.
#[derive(Debug, Clone, Default)]
pub struct PortBinding {
    pub abs_bool: Vec<GlobalOffset>,
    pub abs_int: Vec<GlobalOffset>,
    pub abs_chan: Vec<GlobalOffset>,
}

impl PortBinding {
    fn bind(
        parent: Option<&PortBinding>,
        own_bool: &[GlobalOffset],
        own_int: &[GlobalOffset],
        own_chan: &[GlobalOffset],
    ) -> Self {
        let mut abs_bool = parent.map(|p| p.abs_bool.clone()).unwrap_or_default();
        let mut rev_bool = own_bool.to_vec();
        rev_bool.reverse();
        abs_bool.extend(rev_bool);

        let mut abs_int = parent.map(|p| p.abs_int.clone()).unwrap_or_default();
        let mut rev_int = own_int.to_vec();
        rev_int.reverse();
        abs_int.extend(rev_int);

        let mut abs_chan = parent.map(|p| p.abs_chan.clone()).unwrap_or_default();
        let mut rev_chan = own_chan.to_vec();
        rev_chan.reverse();
        abs_chan.extend(rev_chan);

        Self { abs_bool, abs_int, abs_chan }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum HierarchyError {
    #[display(
        fmt = "instance `{instance}` has no body at level `{requested}` or any fallback level"
    )]
    NoLevelAvailable { instance: String, requested: SimLevel },
}

/// One node of an already-elaborated instance tree, as produced by
/// whatever front end expanded parameterized process definitions into
/// concrete instances (out of scope here).
#[derive(Debug, Clone, Default)]
pub struct InstanceSpec {
    pub name: String,
    pub requested_level: Option<SimLevel>,
    pub available_levels: Vec<SimLevel>,
    pub own_bool_ports: Vec<GlobalOffset>,
    pub own_int_ports: Vec<GlobalOffset>,
    pub own_chan_ports: Vec<GlobalOffset>,
    pub directives: Vec<SpecDirective>,
    pub children: Vec<InstanceSpec>,
    /// Every boolean/int global this instance's compiled body reads, per
    /// static analysis of its CHP graph, PRS expressions, or pass-gate
    /// pins (level-specific, so computed by the caller).
    pub static_bool_reads: Vec<GlobalOffset>,
    pub static_int_reads: Vec<GlobalOffset>,
}

/// One actor produced by phase 1: its resolved level and bound ports.
#[derive(Debug, Clone)]
pub struct WiredActor {
    pub id: ActorId,
    pub name: String,
    pub level: SimLevel,
    pub ports: PortBinding,
}

fn resolve_level(node: &InstanceSpec) -> Result<SimLevel, HierarchyError> {
    let requested = node.requested_level.unwrap_or(SimLevel::Chp);
    for candidate in SimLevel::substitution_order(requested) {
        if node.available_levels.contains(candidate) {
            return Ok(*candidate);
        }
    }
    Err(HierarchyError::NoLevelAvailable {
        instance: node.name.clone(),
        requested,
    })
}

fn apply_directives(
    node: &InstanceSpec,
    exclusivity: &mut ExclusivityTables,
    timing_forks: &mut TimingForkTable,
    hazard_cells: &mut Vec<GlobalOffset>,
    rand_init_cells: &mut Vec<GlobalOffset>,
) {
    for directive in &node.directives {
        match directive {
            SpecDirective::ExclHi(members) => {
                exclusivity.add_group(format!("{}/exclhi", node.name), Direction::Hi, Policy::Observe, members.clone());
            }
            SpecDirective::ExclLo(members) => {
                exclusivity.add_group(format!("{}/excllo", node.name), Direction::Lo, Policy::Observe, members.clone());
            }
            SpecDirective::MkExclHi(members) => {
                exclusivity.add_group(format!("{}/mk_exclhi", node.name), Direction::Hi, Policy::Enforce, members.clone());
            }
            SpecDirective::MkExclLo(members) => {
                exclusivity.add_group(format!("{}/mk_excllo", node.name), Direction::Lo, Policy::Enforce, members.clone());
            }
            SpecDirective::RandInit(members) => rand_init_cells.extend(members.iter().copied()),
            SpecDirective::Hazard(g) => hazard_cells.push(*g),
            SpecDirective::TimingFork {
                name,
                root,
                a,
                b,
                margin,
                root_edge,
                a_edge,
                b_edge,
            } => {
                timing_forks.push(TimingFork::new(
                    name.clone(),
                    *root,
                    *a,
                    *b,
                    *margin,
                    *root_edge,
                    *a_edge,
                    *b_edge,
                ));
            }
        }
    }
}

struct Flattened {
    actor: WiredActor,
    static_bool_reads: Vec<GlobalOffset>,
    static_int_reads: Vec<GlobalOffset>,
}

fn phase1(
    node: &InstanceSpec,
    parent_ports: Option<&PortBinding>,
    next_id: &mut impl FnMut() -> ActorId,
    exclusivity: &mut ExclusivityTables,
    timing_forks: &mut TimingForkTable,
    hazard_cells: &mut Vec<GlobalOffset>,
    rand_init_cells: &mut Vec<GlobalOffset>,
    out: &mut Vec<Flattened>,
) -> Result<(), HierarchyError> {
    let level = resolve_level(node)?;
    let ports = PortBinding::bind(
        parent_ports,
        &node.own_bool_ports,
        &node.own_int_ports,
        &node.own_chan_ports,
    );
    apply_directives(node, exclusivity, timing_forks, hazard_cells, rand_init_cells);
    let id = next_id();
    out.push(Flattened {
        actor: WiredActor {
            id,
            name: node.name.clone(),
            level,
            ports: ports.clone(),
        },
        static_bool_reads: node.static_bool_reads.clone(),
        static_int_reads: node.static_int_reads.clone(),
    });
    if level != SimLevel::Device {
        for child in &node.children {
            phase1(
                child,
                Some(&ports),
                next_id,
                exclusivity,
                timing_forks,
                hazard_cells,
                rand_init_cells,
            out,
            )?;
        }
    }
    Ok(())
}

fn phase2(flattened: &[Flattened], bool_fanout: &mut FanoutTable, int_fanout: &mut FanoutTable) {
    for f in flattened {
        for &g in &f.static_bool_reads {
            bool_fanout.register(g.0, f.actor.id);
        }
        for &g in &f.static_int_reads {
            int_fanout.register(g.0, f.actor.id);
        }
    }
}

/// What wiring an instance tree produces beyond the actor list: the
/// `rand_init`/`hazard` cell sets `runInit` needs, since those are
/// collected here but acted on later.
pub struct WiringResult {
    pub actors: Vec<WiredActor>,
    pub hazard_cells: Vec<GlobalOffset>,
    pub rand_init_cells: Vec<GlobalOffset>,
}

/// Run both phases over `root`, allocating one actor id per instance via
/// `next_id`, installing exclusivity/timing-fork constraints along the
/// way, and registering every actor's static reads in the fanout tables.
pub fn wire_hierarchy(
    root: &InstanceSpec,
    next_id: &mut impl FnMut() -> ActorId,
    exclusivity: &mut ExclusivityTables,
    timing_forks: &mut TimingForkTable,
    bool_fanout: &mut FanoutTable,
    int_fanout: &mut FanoutTable,
) -> Result<WiringResult, HierarchyError> {
    let mut flattened = Vec::new();
    let mut hazard_cells = Vec::new();
    let mut rand_init_cells = Vec::new();
    phase1(
        root,
        None,
        next_id,
        exclusivity,
        timing_forks,
        &mut hazard_cells,
        &mut rand_init_cells,
        &mut flattened,
    )?;
    phase2(&flattened, bool_fanout, int_fanout);
    Ok(WiringResult {
        actors: flattened.into_iter().map(|f| f.actor).collect(),
        hazard_cells,
        rand_init_cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, bool_ports: Vec<GlobalOffset>) -> InstanceSpec {
        InstanceSpec {
            name: name.to_string(),
            requested_level: Some(SimLevel::Chp),
            available_levels: vec![SimLevel::Chp],
            own_bool_ports: bool_ports,
            static_bool_reads: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn child_ports_append_after_reversed_parent_ports() {
        let mut child = leaf("child", vec![GlobalOffset(10), GlobalOffset(11)]);
        child.static_bool_reads = vec![GlobalOffset(10)];
        let root = InstanceSpec {
            name: "root".to_string(),
            requested_level: Some(SimLevel::Chp),
            available_levels: vec![SimLevel::Chp],
            own_bool_ports: vec![GlobalOffset(0), GlobalOffset(1)],
            children: vec![child],
            ..Default::default()
        };
        let mut counter = 0u32;
        let mut next_id = || {
            let id = ActorId(counter);
            counter += 1;
            id
        };
        let mut excl = ExclusivityTables::new();
        let mut forks = TimingForkTable::new();
        let mut bf = FanoutTable::default();
        let mut intf = FanoutTable::default();
        let result = wire_hierarchy(&root, &mut next_id, &mut excl, &mut forks, &mut bf, &mut intf).unwrap();
        assert_eq!(result.actors.len(), 2);
        assert_eq!(result.actors[0].ports.abs_bool, vec![GlobalOffset(1), GlobalOffset(0)]);
        assert_eq!(
            result.actors[1].ports.abs_bool,
            vec![GlobalOffset(1), GlobalOffset(0), GlobalOffset(11), GlobalOffset(10)]
        );
    }

    #[test]
    fn level_falls_back_and_device_subtree_is_skipped() {
        let mut grandchild_visited = leaf("never", vec![]);
        grandchild_visited.static_bool_reads = vec![GlobalOffset(99)];
        let mut child = InstanceSpec {
            name: "dev_child".to_string(),
            requested_level: Some(SimLevel::Prs),
            available_levels: vec![SimLevel::Chp],
            children: vec![grandchild_visited],
            ..Default::default()
        };
        child.requested_level = Some(SimLevel::Device);
        child.available_levels = vec![SimLevel::Device];
        let root = InstanceSpec {
            name: "root".to_string(),
            requested_level: Some(SimLevel::Prs),
            available_levels: vec![SimLevel::Chp],
            children: vec![child],
            ..Default::default()
        };
        let mut counter = 0u32;
        let mut next_id = || {
            let id = ActorId(counter);
            counter += 1;
            id
        };
        let mut excl = ExclusivityTables::new();
        let mut forks = TimingForkTable::new();
        let mut bf = FanoutTable::default();
        let mut intf = FanoutTable::default();
        let result = wire_hierarchy(&root, &mut next_id, &mut excl, &mut forks, &mut bf, &mut intf).unwrap();
        // root fell back prs -> chp; device child has no grandchild visited.
        assert_eq!(result.actors.len(), 2);
        assert_eq!(result.actors[0].level, SimLevel::Chp);
        assert_eq!(result.actors[1].level, SimLevel::Device);
    }

    #[test]
    fn missing_level_is_reported() {
        let root = InstanceSpec {
            name: "orphan".to_string(),
            requested_level: Some(SimLevel::Chp),
            available_levels: vec![SimLevel::Prs],
            ..Default::default()
        };
        let mut counter = 0u32;
        let mut next_id = || {
            let id = ActorId(counter);
            counter += 1;
            id
        };
        let mut excl = ExclusivityTables::new();
        let mut forks = TimingForkTable::new();
        let mut bf = FanoutTable::default();
        let mut intf = FanoutTable::default();
        let err = wire_hierarchy(&root, &mut next_id, &mut excl, &mut forks, &mut bf, &mut intf).unwrap_err();
        assert!(matches!(err, HierarchyError::NoLevelAvailable { .. }));
    }
}
