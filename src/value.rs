//! Runtime values for the Grace VM.
//!
//! The [`Value`] enum is the central representation of all data at runtime.
//! Scalar values (`Int`, `Float`, `Bool`, `Char`, `Null`) are stored inline;
//! strings share an immutable `Rc<str>`; everything heap-shaped lives behind
//! `Rc<dyn Object>` and is reference counted.  Cloning a value is always
//! cheap.
//!
//! # Objects
//!
//! Heap objects implement the [`Object`] capability trait
//! (`print`/`to_string`/`as_bool`/`type_name`/`equals`) rather than an
//! inheritance hierarchy.  Downcasts are explicit accessors
//! ([`Object::as_list`], [`Object::as_exception`]) driven by
//! [`Object::kind`] tags, keeping the object dimension open for future
//! variants.
//!
//! # Operator dispatch
//!
//! Each binary operator is a match over the `(kind, kind)` pair returning
//! either a result value or a message describing the type mismatch; the VM
//! wraps failures into its runtime error machinery.  Reference cycles are a
//! known limitation of the reference-counting scheme.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Object capability trait
// ─────────────────────────────────────────────────────────────────────────────

/// Tags for the concrete heap-object variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    List,
    Exception,
}

/// Capabilities every Grace heap object provides.
///
/// The trait is object-safe; values hold `Rc<dyn Object>`.
pub trait Object {
    /// The concrete variant tag, used for explicit downcasts and
    /// `instanceof` checks.
    fn kind(&self) -> ObjectKind;

    /// Name shown in diagnostics and `instanceof` failures.
    fn type_name(&self) -> &'static str;

    /// Render for `print`/`String` casts.
    fn to_string(&self) -> String;

    /// Truthiness of the object.
    fn as_bool(&self) -> bool;

    /// Structural equality against another object.
    fn equals(&self, other: &dyn Object) -> bool;

    /// Downcast to a list, if this is one.
    fn as_list(&self) -> Option<&ListObject> {
        None
    }

    /// Downcast to an exception, if this is one.
    fn as_exception(&self) -> Option<&ExceptionObject> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// List object
// ─────────────────────────────────────────────────────────────────────────────

/// An ordered, growable sequence of values.
pub struct ListObject {
    items: RefCell<Vec<Value>>,
}

impl ListObject {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn append(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Replace the element at `index`.  Returns `false` when out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut items = self.items.borrow_mut();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Object for ListObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::List
    }

    fn type_name(&self) -> &'static str {
        "List"
    }

    fn to_string(&self) -> String {
        let items = self.items.borrow();
        let mut out = String::from("[");
        for (i, v) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&v.to_string());
        }
        out.push(']');
        out
    }

    fn as_bool(&self) -> bool {
        !self.is_empty()
    }

    fn equals(&self, other: &dyn Object) -> bool {
        let Some(other) = other.as_list() else {
            return false;
        };
        let a = self.items.borrow();
        let b = other.items.borrow();
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
    }

    fn as_list(&self) -> Option<&ListObject> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exception object
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime exception value: an error kind name plus a message.
pub struct ExceptionObject {
    kind_name: String,
    message: String,
}

impl ExceptionObject {
    pub fn new(kind_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind_name: kind_name.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind_name(&self) -> &str {
        &self.kind_name
    }
}

impl Object for ExceptionObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Exception
    }

    fn type_name(&self) -> &'static str {
        "Exception"
    }

    fn to_string(&self) -> String {
        format!("{}: {}", self.kind_name, self.message)
    }

    fn as_bool(&self) -> bool {
        true
    }

    fn equals(&self, other: &dyn Object) -> bool {
        match other.as_exception() {
            Some(other) => self.kind_name == other.kind_name && self.message == other.message,
            None => false,
        }
    }

    fn as_exception(&self) -> Option<&ExceptionObject> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// Result alias for operations that can fail with a type mismatch message.
pub type OpResult = Result<Value, String>;

/// A runtime value in the Grace VM.
#[derive(Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit IEEE-754 float.
    Float(f64),
    /// A single character.
    Char(char),
    /// An immutable, shared string.
    Str(Rc<str>),
    /// A shared, reference-counted heap object.
    Object(Rc<dyn Object>),
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Build a list object value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::Object(Rc::new(ListObject::new(items)))
    }

    /// The user-facing type name used in error messages and casts.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Char(_) => "Char",
            Value::Str(_) => "String",
            Value::Object(o) => o.type_name(),
        }
    }

    /// Truthiness.  Total: every value has a defined boolean interpretation.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Char(c) => *c != '\0',
            Value::Str(s) => !s.is_empty(),
            Value::Object(o) => o.as_bool(),
        }
    }

    /// Does this value match an `instanceof` type tag?
    ///
    /// Tags: `Bool = 0`, `Char = 1`, `Float = 2`, `Int = 3`, `Null = 4`,
    /// `String = 5`, `List = 6`.
    pub fn matches_type_tag(&self, tag: i64) -> bool {
        match self {
            Value::Bool(_) => tag == 0,
            Value::Char(_) => tag == 1,
            Value::Float(_) => tag == 2,
            Value::Int(_) => tag == 3,
            Value::Null => tag == 4,
            Value::Str(_) => tag == 5,
            Value::Object(o) => tag == 6 && o.kind() == ObjectKind::List,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Equality
    // ─────────────────────────────────────────────────────────────────────────

    /// Value equality: equal iff same kind and same value.  Cross-kind
    /// comparisons (including `Int` vs `Float`) are simply unequal; this
    /// never fails.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a.equals(b.as_ref()),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Arithmetic
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::string(s))
            }
            _ => Err(format!(
                "cannot add {} to {}",
                other.type_name(),
                self.type_name()
            )),
        }
    }

    pub fn subtract(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            _ => Err(format!(
                "cannot subtract {} from {}",
                other.type_name(),
                self.type_name()
            )),
        }
    }

    pub fn multiply(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            _ => Err(format!(
                "cannot multiply {} by {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    pub fn divide(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err("attempted to divide by zero".to_string())
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            _ => Err(format!(
                "cannot divide {} by {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    pub fn modulo(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err("attempted to divide by zero".to_string())
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 % b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a % *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
            _ => Err(format!(
                "cannot divide {} by {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    /// Exponentiation.  `Int ** Int` stays integral for non-negative
    /// exponents and falls back to floats for negative ones.
    pub fn power(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b >= 0 {
                    Ok(Value::Int(a.wrapping_pow(*b as u32)))
                } else {
                    Ok(Value::Float((*a as f64).powf(*b as f64)))
                }
            }
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float((*a as f64).powf(*b))),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a.powf(*b as f64))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a.powf(*b))),
            _ => Err(format!(
                "cannot raise {} to the power of {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ordering comparisons
    // ─────────────────────────────────────────────────────────────────────────

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn ordering_op(&self, other: &Value, accept: fn(Ordering) -> bool) -> OpResult {
        match self.compare(other) {
            Some(ord) => Ok(Value::Bool(accept(ord))),
            None => Err(format!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    pub fn less(&self, other: &Value) -> OpResult {
        self.ordering_op(other, Ordering::is_lt)
    }

    pub fn less_equal(&self, other: &Value) -> OpResult {
        self.ordering_op(other, Ordering::is_le)
    }

    pub fn greater(&self, other: &Value) -> OpResult {
        self.ordering_op(other, Ordering::is_gt)
    }

    pub fn greater_equal(&self, other: &Value) -> OpResult {
        self.ordering_op(other, Ordering::is_ge)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logic and unary
    // ─────────────────────────────────────────────────────────────────────────

    pub fn logical_and(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            _ => Err("`and` can only be used with boolean operands".to_string()),
        }
    }

    pub fn logical_or(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => Err("`or` can only be used with boolean operands".to_string()),
        }
    }

    pub fn negate(&self) -> OpResult {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(n) => Ok(Value::Float(-n)),
            _ => Err(format!("cannot negate {}", self.type_name())),
        }
    }

    /// Logical not.  Total, via truthiness.
    pub fn not(&self) -> Value {
        Value::Bool(!self.is_truthy())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Casts
    // ─────────────────────────────────────────────────────────────────────────

    pub fn cast_int(&self) -> OpResult {
        match self {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(n) => Ok(Value::Int(*n as i64)),
            Value::Char(c) => Ok(Value::Int(*c as i64)),
            Value::Str(s) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("could not parse '{s}' as Int")),
            _ => Err(format!("cannot cast {} to Int", self.type_name())),
        }
    }

    pub fn cast_float(&self) -> OpResult {
        match self {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(n) => Ok(Value::Float(*n)),
            Value::Char(c) => Ok(Value::Float(*c as u32 as f64)),
            Value::Str(s) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("could not parse '{s}' as Float")),
            _ => Err(format!("cannot cast {} to Float", self.type_name())),
        }
    }

    pub fn cast_bool(&self) -> Value {
        Value::Bool(self.is_truthy())
    }

    pub fn cast_string(&self) -> Value {
        Value::string(self.to_string())
    }

    pub fn cast_char(&self) -> OpResult {
        match self {
            Value::Char(c) => Ok(Value::Char(*c)),
            Value::Int(n) => {
                if (0..=127).contains(n) {
                    Ok(Value::Char(*n as u8 as char))
                } else {
                    Err(format!("Int {n} is out of range for Char"))
                }
            }
            Value::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err("only a single-character String can be cast to Char".to_string()),
                }
            }
            _ => Err(format!("cannot cast {} to Char", self.type_name())),
        }
    }

    /// `List` cast: wraps any value in a fresh single-element list.
    pub fn cast_list(&self) -> Value {
        Value::list(vec![self.clone()])
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => {
                // Print integral floats with a trailing .0 so they stay
                // visually distinct from Ints.
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Char(c) => write!(f, "{c}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(o) => write!(f, "{}", o.to_string()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => write!(f, "Object({})", o.to_string()),
            other => write!(f, "{}({other})", other.type_name()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
