//! References: access paths combining a root location with a chain of
//! modifiers, plus the tail-call resolve loop.
//!
//! Reading through a missing element yields null; writing materializes the
//! missing intermediates. Constants reject writes, temporaries reject writes
//! until materialized into an anonymous variable, and a tail-call root must
//! be resolved by the trampoline before any access.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Exception, FrameKind, RuntimeError};
use crate::function::{PtcArguments, PtcAware};
use crate::global::GlobalContext;
use crate::value::Value;
use crate::variable::{VarHandle, VariableEnumerator};

/// The root of an access path.
#[derive(Clone)]
pub enum ReferenceRoot {
    Null,
    Constant(Value),
    Temporary(Value),
    Variable(VarHandle),
    TailCall(Rc<PtcArguments>),
}

/// One step of an access path, applied left to right from the root.
#[derive(Clone, Debug, PartialEq)]
pub enum Modifier {
    /// Signed index; negative values count from the tail.
    ArrayIndex(i64),
    ObjectKey(String),
    ArrayHead,
    ArrayTail,
}

/// An access path locating a sub-value.
#[derive(Clone)]
pub struct Reference {
    root: ReferenceRoot,
    modifiers: SmallVec<[Modifier; 2]>,
}

impl Reference {
    pub fn null() -> Self {
        Self {
            root: ReferenceRoot::Null,
            modifiers: SmallVec::new(),
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            root: ReferenceRoot::Constant(value),
            modifiers: SmallVec::new(),
        }
    }

    pub fn temporary(value: Value) -> Self {
        Self {
            root: ReferenceRoot::Temporary(value),
            modifiers: SmallVec::new(),
        }
    }

    pub fn variable(var: VarHandle) -> Self {
        Self {
            root: ReferenceRoot::Variable(var),
            modifiers: SmallVec::new(),
        }
    }

    pub fn tail_call(pack: Rc<PtcArguments>) -> Self {
        Self {
            root: ReferenceRoot::TailCall(pack),
            modifiers: SmallVec::new(),
        }
    }

    pub fn root(&self) -> &ReferenceRoot {
        &self.root
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.root, ReferenceRoot::Variable(_))
    }

    pub fn has_modifiers(&self) -> bool {
        !self.modifiers.is_empty()
    }

    pub fn tail_call_pack(&self) -> Option<Rc<PtcArguments>> {
        match &self.root {
            ReferenceRoot::TailCall(pack) => Some(Rc::clone(pack)),
            _ => None,
        }
    }

    /// Push a modifier onto the access path.
    pub fn zoom_in(&mut self, modifier: Modifier) -> &mut Self {
        self.modifiers.push(modifier);
        self
    }

    /// Pop the innermost modifier, if any.
    pub fn zoom_out(&mut self) -> Option<Modifier> {
        self.modifiers.pop()
    }

    fn root_value(&self) -> Result<Option<std::cell::Ref<'_, Value>>, RuntimeError> {
        match &self.root {
            ReferenceRoot::Null => Ok(None),
            ReferenceRoot::Constant(_) | ReferenceRoot::Temporary(_) => Ok(None),
            ReferenceRoot::Variable(var) => {
                if !var.is_initialized() {
                    return Err(RuntimeError::UninitializedRead);
                }
                Ok(Some(var.value()))
            }
            ReferenceRoot::TailCall(_) => Err(RuntimeError::UnresolvedTailCall),
        }
    }

    /// Read the value this path locates. Missing keys and out-of-range
    /// indices yield null; a non-container intermediate is a type error.
    pub fn read(&self) -> Result<Value, RuntimeError> {
        match &self.root {
            ReferenceRoot::Null => apply_read(&Value::Null, &self.modifiers),
            ReferenceRoot::Constant(value) | ReferenceRoot::Temporary(value) => {
                apply_read(value, &self.modifiers)
            }
            ReferenceRoot::Variable(_) => {
                let guard = self.root_value()?.expect("variable root has a value");
                apply_read(&guard, &self.modifiers)
            }
            ReferenceRoot::TailCall(_) => Err(RuntimeError::UnresolvedTailCall),
        }
    }

    /// Write through this path, materializing missing intermediates.
    pub fn write(&self, value: Value) -> Result<(), RuntimeError> {
        match &self.root {
            ReferenceRoot::Null => Err(RuntimeError::WriteThroughNull),
            ReferenceRoot::Constant(_) => Err(RuntimeError::WriteToConstant),
            ReferenceRoot::Temporary(_) => Err(RuntimeError::WriteToTemporary),
            ReferenceRoot::TailCall(_) => Err(RuntimeError::UnresolvedTailCall),
            ReferenceRoot::Variable(var) => {
                if var.is_immutable() {
                    return Err(RuntimeError::WriteToConstant);
                }
                if !var.is_initialized() {
                    var.initialize(Value::Null, false);
                }
                let mut guard = var.value_mut();
                let slot = apply_write(&mut guard, &self.modifiers)?;
                *slot = value;
                Ok(())
            }
        }
    }

    /// Remove the located array element or object member, returning the
    /// previous value (null when nothing was there).
    pub fn unset(&self) -> Result<Value, RuntimeError> {
        let (last, leading) = match self.modifiers.split_last() {
            Some(parts) => parts,
            None => return Err(RuntimeError::UnsetNotAllowed),
        };
        match &self.root {
            ReferenceRoot::Null => Ok(Value::Null),
            ReferenceRoot::Constant(_) => Err(RuntimeError::WriteToConstant),
            ReferenceRoot::Temporary(_) => Err(RuntimeError::WriteToTemporary),
            ReferenceRoot::TailCall(_) => Err(RuntimeError::UnresolvedTailCall),
            ReferenceRoot::Variable(var) => {
                if var.is_immutable() {
                    return Err(RuntimeError::WriteToConstant);
                }
                if !var.is_initialized() {
                    return Ok(Value::Null);
                }
                let mut guard = var.value_mut();
                let parent = match apply_peek_mut(&mut guard, leading)? {
                    Some(parent) => parent,
                    None => return Ok(Value::Null),
                };
                apply_unset(parent, last)
            }
        }
    }

    /// Promote a temporary (or null) root into a fresh anonymous variable so
    /// subsequent writes persist and the cell is collectable. Idempotent for
    /// variable- and constant-rooted references.
    pub fn materialize(&mut self, global: &mut GlobalContext) -> Result<&mut Self, RuntimeError> {
        match &mut self.root {
            ReferenceRoot::Temporary(value) => {
                let value = std::mem::take(value);
                let var = global.create_variable();
                var.initialize(value, false);
                self.root = ReferenceRoot::Variable(var);
                Ok(self)
            }
            ReferenceRoot::Null => {
                let var = global.create_variable();
                var.initialize(Value::Null, false);
                self.root = ReferenceRoot::Variable(var);
                Ok(self)
            }
            ReferenceRoot::Constant(_) | ReferenceRoot::Variable(_) => Ok(self),
            ReferenceRoot::TailCall(_) => Err(RuntimeError::UnresolvedTailCall),
        }
    }

    /// The trampoline's resolve loop: while this reference is tail-call
    /// rooted, drain the pack's deferred stack in reverse push order, then
    /// re-enter the target with the packed arguments. Native stack use is
    /// O(1) in the tail-recursion depth.
    pub fn finish_call(&mut self, global: &mut GlobalContext) -> Result<(), Exception> {
        let mut flavors: Vec<PtcAware> = Vec::new();
        while let Some(pack) = self.tail_call_pack() {
            flavors.push(pack.ptc_aware());

            for deferred in pack.take_defers().iter().rev() {
                if let Err(mut error) = deferred.run_detached(global) {
                    // The in-flight tail call is abandoned; one frame is
                    // appended for the tail-call site.
                    error.push_frame(FrameKind::Defer, deferred.location().clone());
                    error.push_frame(FrameKind::Function, pack.location().clone());
                    return Err(error);
                }
            }

            let mut args_self = pack.take_args_self();
            let mut self_ref = args_self.pop().unwrap_or_else(Reference::null);
            let target = pack.target().clone();
            target.invoke_ptc_aware(&mut self_ref, global, args_self)?;
            *self = self_ref;
        }

        for flavor in flavors {
            match flavor {
                PtcAware::ByReference => {}
                PtcAware::ByValue => {
                    let value = self
                        .read()
                        .map_err(|e| Exception::from_runtime_error(Default::default(), e))?;
                    *self = Reference::temporary(value);
                }
                PtcAware::Void => {
                    *self = Reference::constant(Value::Null);
                }
            }
        }
        Ok(())
    }

    /// Visit the root's variable (if any) and everything reachable through a
    /// packed tail call. Modifiers carry no variables.
    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        match &self.root {
            ReferenceRoot::Null => {}
            ReferenceRoot::Constant(value) | ReferenceRoot::Temporary(value) => {
                value.enumerate_variables(enumerator);
            }
            ReferenceRoot::Variable(var) => enumerator.visit_variable(var),
            ReferenceRoot::TailCall(pack) => {
                if enumerator.enter_payload(Rc::as_ptr(pack) as usize) {
                    pack.enumerate_variables(enumerator);
                }
            }
        }
    }
}

fn subscript_error(modifier: &Modifier, value: &Value) -> RuntimeError {
    let expected = match modifier {
        Modifier::ArrayIndex(_) | Modifier::ArrayHead | Modifier::ArrayTail => "array",
        Modifier::ObjectKey(_) => "object",
    };
    RuntimeError::TypeMismatch {
        expected,
        got: value.type_name(),
    }
}

fn apply_read(root: &Value, modifiers: &[Modifier]) -> Result<Value, RuntimeError> {
    let mut current = root;
    for modifier in modifiers {
        current = match (modifier, current) {
            (_, Value::Null) => return Ok(Value::Null),
            (Modifier::ArrayIndex(index), Value::Array(elements)) => {
                let wrapped = if *index < 0 {
                    index + elements.len() as i64
                } else {
                    *index
                };
                if wrapped < 0 || wrapped as usize >= elements.len() {
                    return Ok(Value::Null);
                }
                &elements[wrapped as usize]
            }
            (Modifier::ObjectKey(key), Value::Object(map)) => match map.get(key.as_str()) {
                Some(value) => value,
                None => return Ok(Value::Null),
            },
            (Modifier::ArrayHead, Value::Array(elements)) => match elements.first() {
                Some(value) => value,
                None => return Ok(Value::Null),
            },
            (Modifier::ArrayTail, Value::Array(elements)) => match elements.last() {
                Some(value) => value,
                None => return Ok(Value::Null),
            },
            (modifier, other) => return Err(subscript_error(modifier, other)),
        };
    }
    Ok(current.clone())
}

/// Descend for writing, materializing missing intermediates.
fn apply_write<'v>(
    root: &'v mut Value,
    modifiers: &[Modifier],
) -> Result<&'v mut Value, RuntimeError> {
    let mut current = root;
    for modifier in modifiers {
        // A null intermediate materializes into the container the modifier
        // expects.
        if current.is_null() {
            *current = match modifier {
                Modifier::ObjectKey(_) => Value::object(Default::default()),
                _ => Value::array(Vec::new()),
            };
        }
        current = match (modifier, current) {
            (Modifier::ArrayIndex(index), Value::Array(elements)) => {
                let elements = Rc::make_mut(elements);
                let mut wrapped = if *index < 0 {
                    index + elements.len() as i64
                } else {
                    *index
                };
                if wrapped < 0 {
                    // Extend at the front so the requested slot becomes the
                    // new head.
                    let shortfall = (-wrapped) as usize;
                    elements.splice(0..0, std::iter::repeat(Value::Null).take(shortfall));
                    wrapped = 0;
                } else if wrapped as usize >= elements.len() {
                    elements.resize(wrapped as usize + 1, Value::Null);
                }
                &mut elements[wrapped as usize]
            }
            (Modifier::ObjectKey(key), Value::Object(map)) => Rc::make_mut(map)
                .entry(key.clone())
                .or_insert(Value::Null),
            (Modifier::ArrayHead, Value::Array(elements)) => {
                let elements = Rc::make_mut(elements);
                elements.insert(0, Value::Null);
                &mut elements[0]
            }
            (Modifier::ArrayTail, Value::Array(elements)) => {
                let elements = Rc::make_mut(elements);
                elements.push(Value::Null);
                elements.last_mut().expect("array was just extended")
            }
            (modifier, other) => return Err(subscript_error(modifier, other)),
        };
    }
    Ok(current)
}

/// Descend without materializing; `None` means a missing intermediate.
fn apply_peek_mut<'v>(
    root: &'v mut Value,
    modifiers: &[Modifier],
) -> Result<Option<&'v mut Value>, RuntimeError> {
    let mut current = root;
    for modifier in modifiers {
        if current.is_null() {
            return Ok(None);
        }
        current = match (modifier, current) {
            (Modifier::ArrayIndex(index), Value::Array(elements)) => {
                let len = elements.len() as i64;
                let wrapped = if *index < 0 { index + len } else { *index };
                if wrapped < 0 || wrapped >= len {
                    return Ok(None);
                }
                &mut Rc::make_mut(elements)[wrapped as usize]
            }
            (Modifier::ObjectKey(key), Value::Object(map)) => {
                match Rc::make_mut(map).get_mut(key.as_str()) {
                    Some(value) => value,
                    None => return Ok(None),
                }
            }
            (Modifier::ArrayHead, Value::Array(elements)) => {
                if elements.is_empty() {
                    return Ok(None);
                }
                &mut Rc::make_mut(elements)[0]
            }
            (Modifier::ArrayTail, Value::Array(elements)) => {
                match Rc::make_mut(elements).last_mut() {
                    Some(value) => value,
                    None => return Ok(None),
                }
            }
            (modifier, other) => return Err(subscript_error(modifier, other)),
        };
    }
    Ok(Some(current))
}

fn apply_unset(parent: &mut Value, last: &Modifier) -> Result<Value, RuntimeError> {
    if parent.is_null() {
        return Ok(Value::Null);
    }
    match (last, parent) {
        (Modifier::ArrayIndex(index), Value::Array(elements)) => {
            let len = elements.len() as i64;
            let wrapped = if *index < 0 { index + len } else { *index };
            if wrapped < 0 || wrapped >= len {
                return Ok(Value::Null);
            }
            Ok(Rc::make_mut(elements).remove(wrapped as usize))
        }
        (Modifier::ObjectKey(key), Value::Object(map)) => {
            Ok(Rc::make_mut(map).shift_remove(key.as_str()).unwrap_or(Value::Null))
        }
        (Modifier::ArrayHead, Value::Array(elements)) => {
            if elements.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Rc::make_mut(elements).remove(0))
            }
        }
        (Modifier::ArrayTail, Value::Array(elements)) => {
            Ok(Rc::make_mut(elements).pop().unwrap_or(Value::Null))
        }
        (modifier, other) => Err(subscript_error(modifier, other)),
    }
}
