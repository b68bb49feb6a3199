//! Error vocabulary of the execution core.
//!
//! Two layers:
//! - `RuntimeError` is the low-level, value-free error enum produced by
//!   operator and reference primitives. It carries no location.
//! - `Exception` is what actually propagates through executing code: a
//!   thrown `Value`, the source location of the raise site, and an
//!   append-only list of backtrace frames. Script-level `catch` recovers
//!   catchable exceptions; resource exhaustion passes through.

use std::fmt;

use crate::source::SourceLocation;
use crate::value::Value;

/// Broad classification used only to decide catchability and reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Parse,
    Type,
    Range,
    Runtime,
    Resource,
}

/// Low-level errors raised by value operations and reference primitives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("operator `{op}` not defined for {vtype}")]
    UndefinedUnary {
        op: &'static str,
        vtype: &'static str,
    },

    #[error("operator `{op}` not defined for {lhs} and {rhs}")]
    UndefinedBinary {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("values of {lhs} and {rhs} are unordered")]
    UnorderedComparison {
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("integer overflow in `{op}`")]
    IntegerOverflow { op: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("negative shift count: {count}")]
    InvalidShiftCount { count: i64 },

    #[error("negative repetition count: {count}")]
    NegativeRepetition { count: i64 },

    #[error("attempt to modify a constant reference")]
    WriteToConstant,

    #[error("attempt to modify a temporary value; materialize it first")]
    WriteToTemporary,

    #[error("attempt to write through a null reference")]
    WriteThroughNull,

    #[error("use of an uninitialized variable")]
    UninitializedRead,

    #[error("unbound name `{name}`")]
    UnboundName { name: String },

    #[error("attempt to call a value of {got}")]
    NotCallable { got: &'static str },

    #[error("tail call not resolved before use")]
    UnresolvedTailCall,

    #[error("only array elements or object members can be unset")]
    UnsetNotAllowed,

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("stack overflow: recursion too deep")]
    StackOverflow,

    #[error("no matching function call for `{name}{signature}`")]
    NoMatchingCall { name: String, signature: String },
}

impl RuntimeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RuntimeError::IntegerOverflow { .. }
            | RuntimeError::DivisionByZero
            | RuntimeError::InvalidShiftCount { .. }
            | RuntimeError::NegativeRepetition { .. } => ErrorClass::Range,
            RuntimeError::StackOverflow => ErrorClass::Resource,
            _ => ErrorClass::Type,
        }
    }
}

/// Kinds of backtrace frames, one appended per unwind boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Native,
    Throw,
    Catch,
    Plain,
    Function,
    Defer,
    Assert,
}

impl FrameKind {
    pub fn describe(self) -> &'static str {
        match self {
            FrameKind::Native => "native code",
            FrameKind::Throw => "throw statement",
            FrameKind::Catch => "catch clause",
            FrameKind::Plain => "frame",
            FrameKind::Function => "function",
            FrameKind::Defer => "defer statement",
            FrameKind::Assert => "assertion failure",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One backtrace frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    kind: FrameKind,
    sloc: SourceLocation,
}

impl Frame {
    pub fn new(kind: FrameKind, sloc: SourceLocation) -> Self {
        Self { kind, sloc }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn location(&self) -> &SourceLocation {
        &self.sloc
    }
}

/// A traceable exception: the unit of error propagation through queues,
/// contexts and function calls.
#[derive(Clone, Debug)]
pub struct Exception {
    class: ErrorClass,
    value: Value,
    sloc: SourceLocation,
    frames: Vec<Frame>,
    notes: Vec<String>,
}

impl Exception {
    pub fn new(class: ErrorClass, sloc: SourceLocation, value: Value) -> Self {
        Self {
            class,
            value,
            sloc,
            frames: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// An exception raised by a script-level `throw`. Carries one `Throw`
    /// frame from the outset.
    pub fn throw(sloc: SourceLocation, value: Value) -> Self {
        let mut this = Self::new(ErrorClass::Runtime, sloc.clone(), value);
        this.push_frame(FrameKind::Throw, sloc);
        this
    }

    /// Promote a low-level error raised at `sloc` into an exception whose
    /// thrown value is the error message.
    pub fn from_runtime_error(sloc: SourceLocation, error: RuntimeError) -> Self {
        Self::new(error.class(), sloc, Value::from(error.to_string()))
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn location(&self) -> &SourceLocation {
        &self.sloc
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Whether a script-level `catch` clause may recover this exception.
    pub fn is_catchable(&self) -> bool {
        self.class != ErrorClass::Resource
    }

    pub fn push_frame(&mut self, kind: FrameKind, sloc: SourceLocation) {
        self.frames.push(Frame::new(kind, sloc));
    }

    /// Attach a failure from a deferred expression or destructor. Such
    /// failures never replace the in-flight exception.
    pub fn push_note(&mut self, note: String) {
        self.notes.push(note);
    }

    /// The backtrace as an immutable script value: an array of
    /// `{ frame, file, line }` objects, oldest frame first.
    pub fn backtrace_value(&self) -> Value {
        let frames = self
            .frames
            .iter()
            .map(|f| {
                Value::object_from_pairs([
                    ("frame", Value::from(f.kind().describe())),
                    ("file", Value::from(f.location().file())),
                    ("line", Value::Integer(i64::from(f.location().line()))),
                ])
            })
            .collect();
        Value::array(frames)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uncaught exception at {}: {}", self.sloc, self.value)?;
        for frame in &self.frames {
            write!(f, "\n  [{} at {}]", frame.kind(), frame.location())?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

impl From<RuntimeError> for Exception {
    fn from(error: RuntimeError) -> Self {
        Self::from_runtime_error(SourceLocation::native(), error)
    }
}
