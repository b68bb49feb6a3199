//! Positional argument reading for standard functions.
//!
//! A reader consumes the argument vector a native function receives (self
//! appended last, per the binding convention), coerces each positional
//! argument to the requested kind, and raises the standard "no matching
//! function call" error naming the function and the parameter list it was
//! matched against.

use std::rc::Rc;

use asteria_runtime::{Exception, Reference, RuntimeError, SourceLocation, Value};

pub struct ArgumentReader {
    name: String,
    args: Vec<Reference>,
    self_arg: Reference,
    index: usize,
    signature: Vec<&'static str>,
}

impl ArgumentReader {
    /// Take over a native call's argument vector. The trailing self
    /// reference is split off and kept accessible separately.
    pub fn start(name: &str, args: &mut Vec<Reference>) -> Self {
        let self_arg = args.pop().unwrap_or_else(Reference::null);
        Self {
            name: name.to_string(),
            args: std::mem::take(args),
            self_arg,
            index: 0,
            signature: Vec::new(),
        }
    }

    /// The self reference the function was called on.
    pub fn self_argument(&self) -> &Reference {
        &self.self_arg
    }

    fn no_matching_call(&self) -> Exception {
        Exception::from_runtime_error(
            SourceLocation::native(),
            RuntimeError::NoMatchingCall {
                name: self.name.clone(),
                signature: format!("({})", self.signature.join(", ")),
            },
        )
    }

    fn next_value(&mut self) -> Result<Option<Value>, Exception> {
        match self.args.get(self.index) {
            None => Ok(None),
            Some(refr) => {
                let value = refr
                    .read()
                    .map_err(|e| Exception::from_runtime_error(SourceLocation::native(), e))?;
                self.index += 1;
                Ok(Some(value))
            }
        }
    }

    /// A required string argument.
    pub fn required_string(&mut self) -> Result<Rc<str>, Exception> {
        self.signature.push("string");
        match self.next_value()? {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(self.no_matching_call()),
        }
    }

    /// A required integer argument.
    pub fn required_integer(&mut self) -> Result<i64, Exception> {
        self.signature.push("integer");
        match self.next_value()? {
            Some(Value::Integer(i)) => Ok(i),
            _ => Err(self.no_matching_call()),
        }
    }

    /// An optional integer argument; absent or null selects the default.
    pub fn optional_integer(&mut self, default: i64) -> Result<i64, Exception> {
        self.signature.push("[integer]");
        match self.next_value()? {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Integer(i)) => Ok(i),
            _ => Err(self.no_matching_call()),
        }
    }

    /// Reject any unconsumed positional arguments.
    pub fn finish(self) -> Result<(), Exception> {
        if self.index < self.args.len() {
            return Err(self.no_matching_call());
        }
        Ok(())
    }
}
