//! Asteria execution core.
//!
//! The runtime half of an embeddable interpreter for a dynamically-typed,
//! C-family scripting language:
//! - the nine-type value model with deterministic operator semantics
//! - references: access paths over variables, temporaries and constants
//! - the AVMC queue and its AIR node set, the solidified program form
//! - executive contexts with LIFO deferred expressions
//! - a three-generation cycle collector over the variable pool
//! - proper tail calls resolved by a trampoline, bounded native stack
//! - traceable exceptions with append-only backtraces
//!
//! Parsing and lowering from source text are external collaborators;
//! programs enter the core as AIR node lists.

pub mod air;
pub mod avmc;
pub mod collector;
pub mod context;
pub mod dictionary;
pub mod error;
pub mod function;
pub mod global;
pub mod operators;
pub mod reference;
pub mod script;
pub mod source;
pub mod value;
pub mod variable;

pub use air::{solidify, AirNode, SwitchClause, Xop};
pub use avmc::{AirStatus, AvmcParams, AvmcQueue, Executor, ParamU};
pub use collector::{Generation, GenerationalCollector};
pub use context::{ContextFlavor, DeferredExpression, ExecutiveContext};
pub use dictionary::ReferenceDictionary;
pub use error::{ErrorClass, Exception, Frame, FrameKind, RuntimeError};
pub use function::{
    Callable, FunctionValue, InstantiatedFunction, NativeFnPtr, NativeFunction, PtcArguments,
    PtcAware,
};
pub use global::GlobalContext;
pub use reference::{Modifier, Reference, ReferenceRoot};
pub use script::Script;
pub use source::SourceLocation;
pub use value::{Compare, OpaqueData, Value, Vtype};
pub use variable::{VarHandle, Variable, VariableEnumerator, VariableVisitor};
