//! The generational variable collector.
//!
//! Variables live in a pool partitioned into three generations by
//! allocation age. Allocation registers the cell in the newest generation;
//! a generation sweeps when its counter crosses its threshold, and sweeping
//! an older generation always pre-sweeps the younger ones first.
//!
//! A sweep decides liveness per candidate cell by comparing its real handle
//! count against the handles the sweep can account for: the pool entry, the
//! generation entry, the iteration snapshot, and every edge from another
//! candidate's stored value (shared payloads are walked once, so the count
//! never exceeds the real number of internal handles). Any cell with
//! handles beyond that is reachable from outside (a context, an evaluation
//! stack, a deferred expression, a packed tail call or a propagating
//! exception) and is marked together with everything reachable from it.
//! Unmarked cells are destroyed in place, which resets their values and
//! thereby breaks reference cycles; survivors are promoted one generation.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::variable::{Variable, VarHandle, VariableEnumerator};

/// A partition of the pool by allocation age.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generation {
    Newest,
    Middle,
    Oldest,
}

impl Generation {
    fn index(self) -> usize {
        match self {
            Generation::Newest => 0,
            Generation::Middle => 1,
            Generation::Oldest => 2,
        }
    }
}

/// An address-keyed set of owning variable handles.
#[derive(Default)]
pub(crate) struct VariableSet {
    map: HashMap<usize, VarHandle>,
}

impl VariableSet {
    fn key(var: &VarHandle) -> usize {
        Rc::as_ptr(var) as usize
    }

    pub(crate) fn insert(&mut self, var: &VarHandle) -> bool {
        self.map.insert(Self::key(var), Rc::clone(var)).is_none()
    }

    pub(crate) fn remove(&mut self, var: &VarHandle) -> Option<VarHandle> {
        self.map.remove(&Self::key(var))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<VarHandle> {
        self.map.values().cloned().collect()
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(&VarHandle)) {
        for var in self.map.values() {
            f(var);
        }
    }
}

struct Collector {
    threshold: usize,
    counter: usize,
    tracked: VariableSet,
}

impl Collector {
    fn new(threshold: usize) -> Self {
        Self {
            threshold,
            counter: 0,
            tracked: VariableSet::default(),
        }
    }
}

// Handles a sweep can always account for per candidate: the pool entry,
// the generation entry and the iteration snapshot.
const BOOKKEEPING_HANDLES: usize = 3;

/// The pool plus its three tied generation collectors.
pub struct GenerationalCollector {
    pool: VariableSet,
    gens: [Collector; 3],
}

impl GenerationalCollector {
    /// Thresholds per generation: newest sweeps after 800 registrations,
    /// middle after 60 promotions, oldest after 10.
    pub fn new() -> Self {
        Self {
            pool: VariableSet::default(),
            gens: [Collector::new(800), Collector::new(60), Collector::new(10)],
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Create a fresh uninitialized variable, registered in the newest
    /// generation. This is the only allocation boundary, so it is also the
    /// only place a collection can trigger.
    pub fn create_variable(&mut self) -> VarHandle {
        let var = Variable::new_uninitialized();
        self.pool.insert(&var);
        self.gens[0].tracked.insert(&var);
        self.gens[0].counter += 1;

        if self.gens[0].counter >= self.gens[0].threshold {
            let mut limit = Generation::Newest;
            if self.gens[1].counter + 1 >= self.gens[1].threshold {
                limit = Generation::Middle;
                if self.gens[2].counter + 1 >= self.gens[2].threshold {
                    limit = Generation::Oldest;
                }
            }
            self.collect_variables(limit);
        }
        var
    }

    /// Sweep every generation from the newest up to `limit`, youngest
    /// first. Returns the number of variables destroyed.
    pub fn collect_variables(&mut self, limit: Generation) -> usize {
        let mut destroyed = 0;
        for index in 0..=limit.index() {
            destroyed += self.collect_generation(index);
        }
        destroyed
    }

    fn collect_generation(&mut self, gen_index: usize) -> usize {
        // Scratch state is pool-wide: marking may run through cells of any
        // generation, and stale colors from an earlier sweep must not
        // short-circuit this one.
        self.pool.for_each(|var| {
            var.set_gc_ref(0);
            var.set_gc_reachable(false);
        });

        let candidates = self.gens[gen_index].tracked.snapshot();

        // Phase 1: count intra-generation edges. Shared payloads are
        // entered once, so a cell's count never exceeds its real number of
        // internal handles.
        {
            let mut counter = |child: &VarHandle| {
                child.add_gc_ref();
                false
            };
            let mut enumerator = VariableEnumerator::new(&mut counter);
            for var in &candidates {
                var.value().enumerate_variables(&mut enumerator);
            }
        }

        // Phase 2: any candidate with handles beyond the accounted internal
        // ones is reachable from outside this generation. Mark it and
        // everything reachable from it; already-colored cells
        // short-circuit, which makes the walk safe over cycles.
        {
            let mut marker = |child: &VarHandle| {
                if child.is_gc_reachable() {
                    false
                } else {
                    child.set_gc_reachable(true);
                    true
                }
            };
            let mut enumerator = VariableEnumerator::new(&mut marker);
            for var in &candidates {
                if var.is_gc_reachable() {
                    continue;
                }
                if Rc::strong_count(var) > var.gc_ref() + BOOKKEEPING_HANDLES {
                    var.set_gc_reachable(true);
                    var.value().enumerate_variables(&mut enumerator);
                }
            }
        }

        // Phase 3: destroy the unmarked in place, promote the survivors.
        let older_index = (gen_index + 1).min(2);
        let mut destroyed = 0;
        let mut promoted = 0;
        for var in candidates {
            if var.is_gc_reachable() {
                if older_index != gen_index && self.gens[gen_index].tracked.remove(&var).is_some()
                {
                    self.gens[older_index].tracked.insert(&var);
                    self.gens[older_index].counter += 1;
                    promoted += 1;
                }
            } else {
                var.uninitialize();
                self.gens[gen_index].tracked.remove(&var);
                self.pool.remove(&var);
                destroyed += 1;
            }
        }
        self.gens[gen_index].counter = 0;

        debug!(
            generation = gen_index,
            destroyed = destroyed,
            promoted = promoted,
            pool = self.pool.len(),
            "collection finished"
        );
        destroyed
    }

    /// Reset every cell to uninitialized null and drop the whole pool.
    /// Cycles are broken by the reset; handles held elsewhere read null
    /// afterwards.
    pub fn wipe_out_variables(&mut self) {
        debug!(pool = self.pool.len(), "wiping out variables");
        self.pool.for_each(|var| var.uninitialize());
        for gen in &mut self.gens {
            gen.tracked.clear();
            gen.counter = 0;
        }
        self.pool.clear();
    }
}

impl Default for GenerationalCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn unreferenced_variables_are_collected() {
        let mut collector = GenerationalCollector::new();
        {
            let a = collector.create_variable();
            a.initialize(Value::Integer(1), false);
            let b = collector.create_variable();
            b.initialize(Value::Integer(2), false);
        }
        assert_eq!(collector.pool_size(), 2);
        assert_eq!(collector.collect_variables(Generation::Oldest), 2);
        assert_eq!(collector.pool_size(), 0);
    }

    #[test]
    fn held_variables_survive_and_promote() {
        let mut collector = GenerationalCollector::new();
        let kept = collector.create_variable();
        kept.initialize(Value::Integer(7), false);
        collector.collect_variables(Generation::Oldest);
        assert_eq!(collector.pool_size(), 1);
        assert_eq!(*kept.value(), Value::Integer(7));
    }

    #[test]
    fn second_sweep_collects_nothing_new() {
        let mut collector = GenerationalCollector::new();
        let kept = collector.create_variable();
        kept.initialize(Value::from("stay"), false);
        for _ in 0..10 {
            let dead = collector.create_variable();
            dead.initialize(Value::from("go"), false);
        }
        let first = collector.collect_variables(Generation::Oldest);
        assert_eq!(first, 10);
        let second = collector.collect_variables(Generation::Oldest);
        assert_eq!(second, 0);
    }

    #[test]
    fn wipe_resets_cells_in_place() {
        let mut collector = GenerationalCollector::new();
        let var = collector.create_variable();
        var.initialize(Value::Integer(5), true);
        collector.wipe_out_variables();
        assert_eq!(collector.pool_size(), 0);
        assert!(!var.is_initialized());
        assert!(matches!(*var.value(), Value::Null));
    }
}
