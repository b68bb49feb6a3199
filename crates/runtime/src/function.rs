//! Function values, the callable contract, instantiated script functions
//! and packed tail-call arguments.
//!
//! A function value is either a bare native function pointer with a
//! description, or a shared callable object (an instantiated closure).
//! Invocation always goes through `invoke_ptc_aware`, which may hand back a
//! tail-call-rooted reference instead of a result; `invoke` composes that
//! with the trampoline's resolve loop so ordinary call sites never observe
//! an unresolved tail call.

use std::cell::RefCell;
use std::rc::Rc;

use crate::avmc::{AirStatus, AvmcQueue};
use crate::context::{ContextFlavor, DeferredExpression, ExecutiveContext};
use crate::error::{ErrorClass, Exception, FrameKind};
use crate::global::GlobalContext;
use crate::reference::Reference;
use crate::source::SourceLocation;
use crate::value::Value;
use crate::variable::VariableEnumerator;

/// What the caller expects from a proper tail call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtcAware {
    ByValue,
    ByReference,
    Void,
}

/// Signature of a standard (native) function. The argument vector carries
/// the self reference appended as its last element for zoom-in patterns;
/// the function returns by mutating `self_ref` to a temporary carrying the
/// result, or to null for void.
pub type NativeFnPtr =
    fn(&mut Reference, &mut Vec<Reference>, &mut GlobalContext) -> Result<(), Exception>;

/// A native function pointer plus its human-readable description.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    description: &'static str,
    fptr: NativeFnPtr,
}

impl NativeFunction {
    pub const fn new(description: &'static str, fptr: NativeFnPtr) -> Self {
        Self { description, fptr }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// The callable contract implemented by script-instantiated functions (and
/// anything else an embedder wants to make invocable).
pub trait Callable {
    fn describe(&self) -> String;

    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>);

    /// Invoke, possibly leaving a tail-call-rooted reference in `self_ref`.
    /// `args` excludes self; self travels in `self_ref`.
    fn invoke_ptc_aware(
        &self,
        self_ref: &mut Reference,
        global: &mut GlobalContext,
        args: Vec<Reference>,
    ) -> Result<(), Exception>;
}

/// A `function` value.
#[derive(Clone)]
pub enum FunctionValue {
    Native(NativeFunction),
    Scripted(Rc<dyn Callable>),
}

impl FunctionValue {
    pub fn native(description: &'static str, fptr: NativeFnPtr) -> Self {
        FunctionValue::Native(NativeFunction::new(description, fptr))
    }

    pub fn scripted(callable: Rc<dyn Callable>) -> Self {
        FunctionValue::Scripted(callable)
    }

    pub fn describe(&self) -> String {
        match self {
            FunctionValue::Native(n) => format!("native function `{}`", n.description),
            FunctionValue::Scripted(c) => c.describe(),
        }
    }

    /// Identity equality: two function values are equal when they name the
    /// same native pointer or share the same callable object.
    pub fn ptr_eq(&self, other: &FunctionValue) -> bool {
        match (self, other) {
            (FunctionValue::Native(l), FunctionValue::Native(r)) => {
                l.fptr as usize == r.fptr as usize
            }
            (FunctionValue::Scripted(l), FunctionValue::Scripted(r)) => Rc::ptr_eq(l, r),
            _ => false,
        }
    }

    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        if let FunctionValue::Scripted(callable) = self {
            if enumerator.enter_payload(Rc::as_ptr(callable) as *const () as usize) {
                callable.enumerate_variables(enumerator);
            }
        }
    }

    /// Invoke without resolving tail calls; `self_ref` receives the result
    /// or a packed tail call.
    pub fn invoke_ptc_aware(
        &self,
        self_ref: &mut Reference,
        global: &mut GlobalContext,
        mut args: Vec<Reference>,
    ) -> Result<(), Exception> {
        match self {
            FunctionValue::Native(native) => {
                args.push(self_ref.clone());
                (native.fptr)(self_ref, &mut args, global)
            }
            FunctionValue::Scripted(callable) => {
                callable.invoke_ptc_aware(self_ref, global, args)
            }
        }
    }

    /// Invoke and run the trampoline's resolve loop, so `self_ref` holds a
    /// plain result afterwards.
    pub fn invoke(
        &self,
        self_ref: &mut Reference,
        global: &mut GlobalContext,
        args: Vec<Reference>,
    ) -> Result<(), Exception> {
        self.invoke_ptc_aware(self_ref, global, args)?;
        self_ref.finish_call(global)
    }
}

/// Arguments packed for the trampoline: everything needed to re-enter the
/// target once the packing frame has been popped off the native stack.
pub struct PtcArguments {
    sloc: SourceLocation,
    ptc: PtcAware,
    target: FunctionValue,
    // The last reference is self.
    args_self: RefCell<Vec<Reference>>,
    // Deferred expressions of the exited frame, to run on completion.
    defer: RefCell<Vec<DeferredExpression>>,
}

impl PtcArguments {
    pub fn new(
        sloc: SourceLocation,
        ptc: PtcAware,
        target: FunctionValue,
        args_self: Vec<Reference>,
    ) -> Self {
        Self {
            sloc,
            ptc,
            target,
            args_self: RefCell::new(args_self),
            defer: RefCell::new(Vec::new()),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.sloc
    }

    pub fn ptc_aware(&self) -> PtcAware {
        self.ptc
    }

    pub fn target(&self) -> &FunctionValue {
        &self.target
    }

    /// Move the exiting frame's deferred stack into this pack.
    pub fn append_defers(&self, defers: Vec<DeferredExpression>) {
        self.defer.borrow_mut().extend(defers);
    }

    pub(crate) fn take_defers(&self) -> Vec<DeferredExpression> {
        std::mem::take(&mut self.defer.borrow_mut())
    }

    pub(crate) fn take_args_self(&self) -> Vec<Reference> {
        std::mem::take(&mut self.args_self.borrow_mut())
    }

    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        for arg in self.args_self.borrow().iter() {
            arg.enumerate_variables(enumerator);
        }
        for deferred in self.defer.borrow().iter() {
            deferred.enumerate_variables(enumerator);
        }
    }
}

/// A script function instantiated by a `DefineFunction` node: parameter
/// names, the references captured from the defining context, and the shared
/// solidified body.
pub struct InstantiatedFunction {
    name: String,
    params: Vec<String>,
    sloc: SourceLocation,
    captures: Vec<(String, Reference)>,
    body: Rc<AvmcQueue>,
}

impl InstantiatedFunction {
    pub fn new(
        name: &str,
        params: Vec<String>,
        sloc: SourceLocation,
        captures: Vec<(String, Reference)>,
        body: Rc<AvmcQueue>,
    ) -> Self {
        Self {
            name: name.to_string(),
            params,
            sloc,
            captures,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn do_invoke(
        &self,
        self_ref: &mut Reference,
        global: &mut GlobalContext,
        args: Vec<Reference>,
    ) -> Result<(), Exception> {
        let mut ctx = ExecutiveContext::new_root(ContextFlavor::Function);
        for (index, param) in self.params.iter().enumerate() {
            let arg = args
                .get(index)
                .cloned()
                .unwrap_or_else(|| Reference::constant(Value::Null));
            ctx.insert_named(param, arg);
        }
        for (name, reference) in &self.captures {
            ctx.insert_named(name, reference.clone());
        }

        let status = match self.body.execute(&mut ctx, global) {
            Ok(status) => status,
            Err(mut error) => {
                ctx.finish_unwinding(global, &mut error);
                error.push_frame(FrameKind::Function, self.sloc.clone());
                return Err(error);
            }
        };

        let result = match status {
            AirStatus::Return => ctx.pop_reference().map_err(|e| {
                Exception::from_runtime_error(self.sloc.clone(), e)
            })?,
            AirStatus::Next => Reference::constant(Value::Null),
            _ => {
                return Err(Exception::new(
                    ErrorClass::Runtime,
                    self.sloc.clone(),
                    Value::from("misplaced break or continue"),
                ));
            }
        };

        if let Some(pack) = result.tail_call_pack() {
            // The frame is exiting through a tail call: its deferred stack
            // runs when the trampoline completes the call.
            pack.append_defers(ctx.take_defers());
        } else if let Err(mut error) = ctx.finish(global) {
            error.push_frame(FrameKind::Function, self.sloc.clone());
            return Err(error);
        }

        *self_ref = result;
        Ok(())
    }
}

impl Callable for InstantiatedFunction {
    fn describe(&self) -> String {
        format!("function `{}({})` at {}", self.name, self.params.join(", "), self.sloc)
    }

    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        for (_, reference) in &self.captures {
            reference.enumerate_variables(enumerator);
        }
        // The body may be shared by several instantiations.
        if enumerator.enter_payload(Rc::as_ptr(&self.body) as usize) {
            self.body.enumerate_variables(enumerator);
        }
    }

    fn invoke_ptc_aware(
        &self,
        self_ref: &mut Reference,
        global: &mut GlobalContext,
        args: Vec<Reference>,
    ) -> Result<(), Exception> {
        global.enter_call(&self.sloc)?;
        let result = self.do_invoke(self_ref, global, args);
        global.leave_call();
        result
    }
}
