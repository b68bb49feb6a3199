//! Executive contexts: lexical frames binding names to references.
//!
//! A context owns its name table, an evaluation stack for the queue
//! executing against it, and a deferred-expression stack that drains in
//! LIFO order on every exit path. Parent contexts are borrowed, never
//! owned; name lookup walks the chain innermost-outward.

use std::rc::Rc;

use crate::avmc::AvmcQueue;
use crate::dictionary::ReferenceDictionary;
use crate::error::{Exception, FrameKind, RuntimeError};
use crate::global::GlobalContext;
use crate::reference::Reference;
use crate::source::SourceLocation;
use crate::variable::VariableEnumerator;

/// What kind of frame a context represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextFlavor {
    Plain,
    Function,
    Catch,
    Defer,
}

/// A deferred expression, scheduled for scope exit.
///
/// The names the expression needs are bound when it is scheduled, so the
/// body stays runnable after its defining frame is gone. That is what
/// happens when a frame exits through a tail call and its deferred stack
/// travels with the argument pack.
#[derive(Clone)]
pub struct DeferredExpression {
    sloc: SourceLocation,
    body: Rc<AvmcQueue>,
    bindings: Vec<(String, Reference)>,
}

impl DeferredExpression {
    pub fn new(
        sloc: SourceLocation,
        body: Rc<AvmcQueue>,
        bindings: Vec<(String, Reference)>,
    ) -> Self {
        Self {
            sloc,
            body,
            bindings,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.sloc
    }

    /// Run the expression in a fresh defer frame with no parent. Used by
    /// the trampoline, where the defining frame has already exited.
    pub fn run_detached(&self, global: &mut GlobalContext) -> Result<(), Exception> {
        let mut ctx = ExecutiveContext::new_root(ContextFlavor::Defer);
        self.run_in(&mut ctx, global)
    }

    fn run_in(
        &self,
        ctx: &mut ExecutiveContext<'_>,
        global: &mut GlobalContext,
    ) -> Result<(), Exception> {
        for (name, refr) in &self.bindings {
            ctx.insert_named(name, refr.clone());
        }
        self.body.execute(ctx, global)?;
        ctx.finish(global)
    }

    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        if enumerator.enter_payload(Rc::as_ptr(&self.body) as usize) {
            self.body.enumerate_variables(enumerator);
        }
        for (_, refr) in &self.bindings {
            refr.enumerate_variables(enumerator);
        }
    }
}

/// A lexical frame.
pub struct ExecutiveContext<'p> {
    flavor: ContextFlavor,
    parent: Option<&'p ExecutiveContext<'p>>,
    names: ReferenceDictionary,
    stack: Vec<Reference>,
    defer: Vec<DeferredExpression>,
}

impl<'p> ExecutiveContext<'p> {
    /// A frame with no parent: the entry frame of a function body, a
    /// deferred expression, or an embedder-driven program.
    pub fn new_root(flavor: ContextFlavor) -> Self {
        Self {
            flavor,
            parent: None,
            names: ReferenceDictionary::new(),
            stack: Vec::new(),
            defer: Vec::new(),
        }
    }

    /// A child frame chained to `parent`.
    pub fn new_child(parent: &'p ExecutiveContext<'p>, flavor: ContextFlavor) -> Self {
        Self {
            flavor,
            parent: Some(parent),
            names: ReferenceDictionary::new(),
            stack: Vec::new(),
            defer: Vec::new(),
        }
    }

    pub fn flavor(&self) -> ContextFlavor {
        self.flavor
    }

    /// Walk the chain from the innermost frame outward; first hit wins.
    pub fn get_named(&self, name: &str) -> Option<&Reference> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(refr) = ctx.names.get(name) {
                return Some(refr);
            }
            current = ctx.parent;
        }
        None
    }

    /// Bind a name in this frame, shadowing any outer binding.
    pub fn insert_named(&mut self, name: &str, refr: Reference) {
        self.names.insert(name, refr);
    }

    pub fn push_reference(&mut self, refr: Reference) {
        self.stack.push(refr);
    }

    pub fn pop_reference(&mut self) -> Result<Reference, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn top_reference(&self) -> Result<&Reference, RuntimeError> {
        self.stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Schedule a deferred expression for scope exit.
    pub fn defer_expression(&mut self, deferred: DeferredExpression) {
        self.defer.push(deferred);
    }

    pub(crate) fn take_defers(&mut self) -> Vec<DeferredExpression> {
        std::mem::take(&mut self.defer)
    }

    fn run_deferred(
        &self,
        global: &mut GlobalContext,
        deferred: &DeferredExpression,
    ) -> Result<(), Exception> {
        let mut dctx = ExecutiveContext::new_child(self, ContextFlavor::Defer);
        deferred.run_in(&mut dctx, global)
    }

    /// Normal scope exit: run deferred expressions in LIFO order. The first
    /// failure propagates (with a defer frame); later failures attach to it
    /// as notes.
    pub fn finish(&mut self, global: &mut GlobalContext) -> Result<(), Exception> {
        let defers = self.take_defers();
        let mut pending: Option<Exception> = None;
        for deferred in defers.iter().rev() {
            if let Err(mut error) = self.run_deferred(global, deferred) {
                match &mut pending {
                    None => {
                        error.push_frame(FrameKind::Defer, deferred.location().clone());
                        pending = Some(error);
                    }
                    Some(outer) => outer.push_note(error.to_string()),
                }
            }
        }
        match pending {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Unwinding scope exit: deferred expressions still run in LIFO order,
    /// but their failures never replace the in-flight exception; they are
    /// attached to it as notes.
    pub fn finish_unwinding(&mut self, global: &mut GlobalContext, error: &mut Exception) {
        let defers = self.take_defers();
        for deferred in defers.iter().rev() {
            if let Err(defer_error) = self.run_deferred(global, deferred) {
                error.push_note(defer_error.to_string());
            }
        }
    }

    /// Everything reachable from this frame and its ancestors: named
    /// references, the evaluation stack, and pending deferred expressions.
    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        let mut current = Some(self);
        while let Some(ctx) = current {
            ctx.names.enumerate_variables(enumerator);
            for refr in &ctx.stack {
                refr.enumerate_variables(enumerator);
            }
            for deferred in &ctx.defer {
                deferred.enumerate_variables(enumerator);
            }
            current = ctx.parent;
        }
    }
}
