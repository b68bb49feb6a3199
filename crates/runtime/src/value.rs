//! Value representation for the Asteria execution core.
//!
//! Design goals:
//! - exactly the nine scripting types, no hidden extras
//! - cheap clones: heap payloads are shared copy-on-write handles
//! - cyclic graphs are representable (closures capturing their own cell)
//!   and left to the collector, never to reference counting alone
//! - a zero-argument `Value::default()` is `null`

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::function::FunctionValue;
use crate::variable::VariableEnumerator;

/// Discriminator for the nine scripting types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vtype {
    Null,
    Boolean,
    Integer,
    Real,
    Str,
    Opaque,
    Function,
    Array,
    Object,
}

impl Vtype {
    /// The name used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            Vtype::Null => "null",
            Vtype::Boolean => "boolean",
            Vtype::Integer => "integer",
            Vtype::Real => "real",
            Vtype::Str => "string",
            Vtype::Opaque => "opaque",
            Vtype::Function => "function",
            Vtype::Array => "array",
            Vtype::Object => "object",
        }
    }
}

impl fmt::Display for Vtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Result of a three-way comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compare {
    Unordered,
    Less,
    Equal,
    Greater,
}

/// Contract for user payloads stored in `opaque` values.
///
/// Clones of opaque values share the payload; a deep copy happens only when
/// `clone_deep` is implemented and explicitly requested.
pub trait OpaqueData: Any {
    fn describe(&self) -> String;

    fn clone_deep(&self) -> Option<Rc<dyn OpaqueData>> {
        None
    }

    fn enumerate_variables(&self, _enumerator: &mut VariableEnumerator<'_>) {}
}

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Str(Rc<str>),
    Opaque(Rc<dyn OpaqueData>),
    Function(FunctionValue),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(elements))
    }

    pub fn object(map: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(map))
    }

    pub fn object_from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Value::Object(Rc::new(map))
    }

    pub fn opaque(data: Rc<dyn OpaqueData>) -> Self {
        Value::Opaque(data)
    }

    pub fn vtype(&self) -> Vtype {
        match self {
            Value::Null => Vtype::Null,
            Value::Boolean(_) => Vtype::Boolean,
            Value::Integer(_) => Vtype::Integer,
            Value::Real(_) => Vtype::Real,
            Value::Str(_) => Vtype::Str,
            Value::Opaque(_) => Vtype::Opaque,
            Value::Function(_) => Vtype::Function,
            Value::Array(_) => Vtype::Array,
            Value::Object(_) => Vtype::Object,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.vtype().describe()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: null and false are false; zero numbers and empty strings
    /// and arrays are false; opaques, functions and objects are always true.
    pub fn test(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Opaque(_) | Value::Function(_) | Value::Object(_) => true,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionValue> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Downcast an opaque payload to a concrete type.
    pub fn as_opaque_data<T: OpaqueData>(&self) -> Option<&T> {
        match self {
            Value::Opaque(data) => {
                let any: &dyn Any = &**data;
                any.downcast_ref::<T>()
            }
            _ => None,
        }
    }

    /// Three-way comparison. Total over primitives of like kind; unordered
    /// across kinds, against null (except null itself), and with NaN.
    /// Arrays compare element-wise lexicographically.
    pub fn compare(&self, other: &Value) -> Compare {
        match (self, other) {
            (Value::Null, Value::Null) => Compare::Equal,
            (Value::Boolean(l), Value::Boolean(r)) => ordering_to_compare(l.cmp(r)),
            (Value::Integer(l), Value::Integer(r)) => ordering_to_compare(l.cmp(r)),
            (Value::Real(l), Value::Real(r)) => match l.partial_cmp(r) {
                Some(ord) => ordering_to_compare(ord),
                None => Compare::Unordered,
            },
            (Value::Str(l), Value::Str(r)) => ordering_to_compare(l.as_bytes().cmp(r.as_bytes())),
            (Value::Array(l), Value::Array(r)) => {
                for (le, re) in l.iter().zip(r.iter()) {
                    match le.compare(re) {
                        Compare::Equal => continue,
                        other => return other,
                    }
                }
                ordering_to_compare(l.len().cmp(&r.len()))
            }
            _ => Compare::Unordered,
        }
    }

    /// Diagnostic rendering. For null, booleans, integers, reals and strings
    /// the output is a literal that reads back to an equal value.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.do_describe(&mut out);
        out
    }

    fn do_describe(&self, out: &mut String) {
        use std::fmt::Write as _;
        match self {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => {
                let _ = write!(out, "{b}");
            }
            Value::Integer(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Real(r) => {
                if r.is_nan() {
                    out.push_str("nan");
                } else if r.is_infinite() {
                    out.push_str(if *r < 0.0 { "-infinity" } else { "infinity" });
                } else if *r == r.trunc() {
                    let _ = write!(out, "{r:.1}");
                } else {
                    let _ = write!(out, "{r}");
                }
            }
            Value::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c if (c as u32) < 0x20 => {
                            let _ = write!(out, "\\x{:02X}", c as u32);
                        }
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            Value::Opaque(data) => {
                let _ = write!(out, "<opaque: {}>", data.describe());
            }
            Value::Function(f) => {
                let _ = write!(out, "<{}>", f.describe());
            }
            Value::Array(a) => {
                out.push('[');
                for (i, elem) in a.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    elem.do_describe(out);
                }
                out.push(']');
            }
            Value::Object(o) => {
                out.push('{');
                for (i, (key, val)) in o.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "\"{key}\": ");
                    val.do_describe(out);
                }
                out.push('}');
            }
        }
    }

    /// Walk every variable handle embedded in this value. Shared payloads
    /// are entered once per pass; the enumerator dedupes by address.
    pub fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        match self {
            Value::Array(a) => {
                if enumerator.enter_payload(Rc::as_ptr(a) as usize) {
                    for elem in a.iter() {
                        elem.enumerate_variables(enumerator);
                    }
                }
            }
            Value::Object(o) => {
                if enumerator.enter_payload(Rc::as_ptr(o) as usize) {
                    for val in o.values() {
                        val.enumerate_variables(enumerator);
                    }
                }
            }
            Value::Opaque(data) => {
                if enumerator.enter_payload(Rc::as_ptr(data) as *const () as usize) {
                    data.enumerate_variables(enumerator);
                }
            }
            Value::Function(f) => f.enumerate_variables(enumerator),
            _ => {}
        }
    }
}

fn ordering_to_compare(ord: std::cmp::Ordering) -> Compare {
    match ord {
        std::cmp::Ordering::Less => Compare::Less,
        std::cmp::Ordering::Equal => Compare::Equal,
        std::cmp::Ordering::Greater => Compare::Greater,
    }
}

// Structural equality, used by tests and by object/array deep comparison.
// Functions and opaques compare by identity. The script-level `==` operator
// goes through `compare` instead, where objects are unordered.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Real(l), Value::Real(r)) => l == r,
            (Value::Str(l), Value::Str(r)) => l == r,
            (Value::Opaque(l), Value::Opaque(r)) => Rc::ptr_eq(l, r),
            (Value::Function(l), Value::Function(r)) => l.ptr_eq(r),
            (Value::Array(l), Value::Array(r)) => l == r,
            (Value::Object(l), Value::Object(r)) => {
                l.len() == r.len() && l.iter().all(|(k, v)| r.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Integer(i) => write!(f, "Integer({i})"),
            Value::Real(r) => write!(f, "Real({r})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Opaque(data) => write!(f, "Opaque({})", data.describe()),
            Value::Function(func) => write!(f, "Function({})", func.describe()),
            Value::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Value::Object(_) => write!(f, "Object({})", self.describe()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Top-level strings print raw; everything else as `describe`.
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.describe()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}
