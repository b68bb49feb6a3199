//! The AVMC queue: the flat, solidified program representation that
//! executive contexts run.
//!
//! Each node carries an executor function pointer, 48 bits of inline
//! immediates, optional symbols (a source location used to append backtrace
//! frames), and an optional boxed payload. Payload types provide their own
//! variable enumerator through the `AvmcParams` trait and their own
//! destructor through `Drop`; destruction runs in reverse append order.
//!
//! Appending is two-phase: `request` grows a reservation counter per
//! upcoming node, and `append` consumes one reserved slot. The backing
//! storage is reserved exactly once, so a failing allocation cannot leave a
//! half-built node behind.

use std::any::Any;

use crate::context::ExecutiveContext;
use crate::error::{Exception, FrameKind};
use crate::global::GlobalContext;
use crate::source::SourceLocation;
use crate::variable::VariableEnumerator;

/// Result of one executor step, controlling local flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirStatus {
    Next,
    Return,
    BreakSwitch,
    BreakWhile,
    BreakFor,
    ContinueWhile,
    ContinueFor,
}

/// 48 bits of inline immediates packed into a queue node. Accessor pairs
/// overlay the same storage; a node uses one layout consistently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamU(u64);

const PARAMU_MASK: u64 = (1 << 48) - 1;

impl ParamU {
    pub fn new() -> Self {
        Self(0)
    }

    /// Low 16 bits.
    pub fn x16(self) -> u16 {
        self.0 as u16
    }

    pub fn with_x16(self, value: u16) -> Self {
        Self((self.0 & !0xFFFF) | u64::from(value))
    }

    /// High 32 bits.
    pub fn x32(self) -> u32 {
        (self.0 >> 16) as u32
    }

    pub fn with_x32(self, value: u32) -> Self {
        Self((self.0 & 0xFFFF) | (u64::from(value) << 16))
    }

    /// One of six byte lanes.
    pub fn u8s(self, index: usize) -> u8 {
        debug_assert!(index < 6);
        (self.0 >> (index * 8)) as u8
    }

    pub fn with_u8s(self, index: usize, value: u8) -> Self {
        debug_assert!(index < 6);
        let shift = index * 8;
        Self(((self.0 & !(0xFF << shift)) | (u64::from(value) << shift)) & PARAMU_MASK)
    }
}

/// Per-type payload contract: an enumerator over embedded variables. The
/// destructor is the type's `Drop`; trivial payload-free nodes record
/// neither.
pub trait AvmcParams: Any {
    fn enumerate_variables(&self, _enumerator: &mut VariableEnumerator<'_>) {}
}

/// Downcast a node payload to its concrete type. Executors are appended
/// together with their payload type, so a mismatch is queue corruption.
pub fn params_as<T: AvmcParams>(params: Option<&dyn AvmcParams>) -> &T {
    let params = params.expect("queue node is missing its payload");
    let any: &dyn Any = params;
    any.downcast_ref::<T>()
        .expect("queue node payload has the wrong type")
}

/// Executor callback: one step of the program.
pub type Executor = fn(
    &mut ExecutiveContext<'_>,
    &mut GlobalContext,
    ParamU,
    Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception>;

struct Node {
    exec: Executor,
    paramu: ParamU,
    symbols: Option<SourceLocation>,
    params: Option<Box<dyn AvmcParams>>,
}

/// The queue itself: a packed sequence of executable nodes.
#[derive(Default)]
pub struct AvmcQueue {
    nodes: Vec<Node>,
    reserved: usize,
}

impl AvmcQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        // Nodes drop in reverse append order.
        while self.nodes.pop().is_some() {}
        self.reserved = 0;
    }

    /// Phase one: reserve room for one more node. All requests for a queue
    /// must precede its first append.
    pub fn request(&mut self, _symbols: Option<&SourceLocation>) {
        assert!(
            self.nodes.is_empty(),
            "request() must precede all append() calls"
        );
        self.reserved += 1;
    }

    fn do_append(&mut self, node: Node) {
        assert!(
            self.nodes.len() < self.reserved,
            "append() without a matching request()"
        );
        if self.nodes.capacity() == 0 {
            self.nodes.reserve_exact(self.reserved);
        }
        self.nodes.push(node);
    }

    /// Phase two: append a node with no payload.
    pub fn append_trivial(
        &mut self,
        exec: Executor,
        paramu: ParamU,
        symbols: Option<SourceLocation>,
    ) {
        self.do_append(Node {
            exec,
            paramu,
            symbols,
            params: None,
        });
    }

    /// Phase two: append a node with a payload. The payload's enumerator
    /// and destructor are recorded through its type.
    pub fn append<P: AvmcParams>(
        &mut self,
        exec: Executor,
        paramu: ParamU,
        symbols: Option<SourceLocation>,
        params: P,
    ) {
        self.do_append(Node {
            exec,
            paramu,
            symbols,
            params: Some(Box::new(params)),
        });
    }

    /// Run the program. Executors see nodes strictly in order; the first
    /// non-`Next` status or error stops the walk. When a failing node
    /// carries symbols, one plain frame is appended before propagation.
    pub fn execute(
        &self,
        ctx: &mut ExecutiveContext<'_>,
        global: &mut GlobalContext,
    ) -> Result<AirStatus, Exception> {
        for node in &self.nodes {
            match (node.exec)(ctx, global, node.paramu, node.params.as_deref()) {
                Ok(AirStatus::Next) => {}
                Ok(status) => return Ok(status),
                Err(mut error) => {
                    if let Some(sloc) = &node.symbols {
                        error.push_frame(FrameKind::Plain, sloc.clone());
                    }
                    return Err(error);
                }
            }
        }
        Ok(AirStatus::Next)
    }

    /// Visit every variable embedded in any node's payload.
    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        for node in &self.nodes {
            if let Some(params) = &node.params {
                params.enumerate_variables(enumerator);
            }
        }
    }
}

impl Drop for AvmcQueue {
    fn drop(&mut self) {
        // Reverse append order; trivial nodes have nothing to run.
        while self.nodes.pop().is_some() {}
    }
}
