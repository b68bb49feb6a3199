//! The global context: the root heap every execution shares.
//!
//! Owns the variable pool and its generational collectors, the mounted
//! `std` object that the standard library and embedders install members
//! into, and the recursion guard that turns runaway non-tail recursion into
//! a recoverable error instead of a native stack fault.

use tracing::debug;

use crate::collector::{Generation, GenerationalCollector};
use crate::error::{Exception, RuntimeError};
use crate::reference::{Modifier, Reference};
use crate::source::SourceLocation;
use crate::value::Value;
use crate::variable::VarHandle;

const DEFAULT_RECURSION_LIMIT: usize = 1_000;

/// The root heap: variable pool, collectors, the `std` mount point and the
/// recursion guard.
pub struct GlobalContext {
    collector: GenerationalCollector,
    std_variable: VarHandle,
    recursion_limit: usize,
    call_depth: usize,
    peak_call_depth: usize,
}

impl GlobalContext {
    pub fn new() -> Self {
        let mut collector = GenerationalCollector::new();
        let std_variable = collector.create_variable();
        std_variable.initialize(Value::object(Default::default()), false);
        Self {
            collector,
            std_variable,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            call_depth: 0,
            peak_call_depth: 0,
        }
    }

    /// Create a fresh variable in the pool. This is an allocation boundary:
    /// a collection may trigger here, and only here.
    pub fn create_variable(&mut self) -> VarHandle {
        self.collector.create_variable()
    }

    /// Sweep generations youngest-first up to `limit`; returns how many
    /// variables were destroyed.
    pub fn collect_variables(&mut self, limit: Generation) -> usize {
        self.collector.collect_variables(limit)
    }

    pub fn pool_size(&self) -> usize {
        self.collector.pool_size()
    }

    /// Shutdown escape hatch: reset and drop every cell unconditionally.
    pub fn wipe_out_variables(&mut self) {
        debug!("global context wiping variable pool");
        self.collector.wipe_out_variables();
    }

    /// A reference to the mounted `std` object variable.
    pub fn std_variable(&self) -> Reference {
        Reference::variable(self.std_variable.clone())
    }

    /// A reference to one member of the `std` object, for reading or
    /// writing through.
    pub fn open_std_member(&self, name: &str) -> Reference {
        let mut refr = self.std_variable();
        refr.zoom_in(Modifier::ObjectKey(name.to_string()));
        refr
    }

    pub fn set_std_member(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.open_std_member(name).write(value)
    }

    pub fn get_std_member(&self, name: &str) -> Result<Value, RuntimeError> {
        self.open_std_member(name).read()
    }

    /// Unmount a member, returning what was there.
    pub fn remove_std_member(&mut self, name: &str) -> Result<Value, RuntimeError> {
        self.open_std_member(name).unset()
    }

    /// Guarded entry into a script function invocation.
    pub(crate) fn enter_call(&mut self, sloc: &SourceLocation) -> Result<(), Exception> {
        if self.call_depth >= self.recursion_limit {
            return Err(Exception::from_runtime_error(
                sloc.clone(),
                RuntimeError::StackOverflow,
            ));
        }
        self.call_depth += 1;
        if self.call_depth > self.peak_call_depth {
            self.peak_call_depth = self.call_depth;
        }
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// The deepest nesting of script invocations observed so far. Bounded
    /// tail recursion shows up here as a small constant.
    pub fn peak_call_depth(&self) -> usize {
        self.peak_call_depth
    }

    pub fn reset_peak_call_depth(&mut self) {
        self.peak_call_depth = self.call_depth;
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}
