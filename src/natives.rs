//! Native (Rust) functions exposed to Grace programs.
//!
//! Natives live in a VM-owned table and are invoked by the `NativeCall`
//! opcode with the same argument-popping discipline as ordinary calls.  The
//! compiler resolves a call to a registered native name at compile time and
//! emits the table index instead of a name hash.
//!
//! Native names use the `__native_` prefix so user functions cannot collide
//! with them.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Value;
use crate::vm::RuntimeErrorKind;

/// Failure from a native call: a runtime error kind plus message, reported
/// through the VM's usual error path.
#[derive(Debug)]
pub struct NativeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl NativeError {
    fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

type NativeResult = Result<Value, NativeError>;

/// A registered native function.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: i64,
    pub func: fn(&[Value]) -> NativeResult,
}

/// The full native table, in registration order.  Indices into this list are
/// the `NativeCall` operands.
pub fn register_all() -> Vec<NativeFunction> {
    vec![
        // Math
        NativeFunction {
            name: "__native_sqrt",
            arity: 1,
            func: native_sqrt,
        },
        // Time
        NativeFunction {
            name: "__native_time_s",
            arity: 0,
            func: native_time_s,
        },
        NativeFunction {
            name: "__native_time_ms",
            arity: 0,
            func: native_time_ms,
        },
        NativeFunction {
            name: "__native_time_ns",
            arity: 0,
            func: native_time_ns,
        },
        // Lists
        NativeFunction {
            name: "__native_append_list",
            arity: 2,
            func: native_append_list,
        },
        NativeFunction {
            name: "__native_set_list_at_index",
            arity: 3,
            func: native_set_list_at_index,
        },
        NativeFunction {
            name: "__native_get_list_at_index",
            arity: 2,
            func: native_get_list_at_index,
        },
        NativeFunction {
            name: "__native_list_length",
            arity: 1,
            func: native_list_length,
        },
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Implementations
// ─────────────────────────────────────────────────────────────────────────────

fn native_sqrt(args: &[Value]) -> NativeResult {
    match &args[0] {
        Value::Int(n) => Ok(Value::Float((*n as f64).sqrt())),
        Value::Float(n) => Ok(Value::Float(n.sqrt())),
        other => Err(NativeError::new(
            RuntimeErrorKind::InvalidType,
            format!("__native_sqrt expected Int or Float but got {}", other.type_name()),
        )),
    }
}

fn epoch_elapsed() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn native_time_s(_args: &[Value]) -> NativeResult {
    Ok(Value::Int(epoch_elapsed().as_secs() as i64))
}

fn native_time_ms(_args: &[Value]) -> NativeResult {
    Ok(Value::Int(epoch_elapsed().as_millis() as i64))
}

fn native_time_ns(_args: &[Value]) -> NativeResult {
    Ok(Value::Int(epoch_elapsed().as_nanos() as i64))
}

fn expect_list<'a>(
    name: &str,
    value: &'a Value,
) -> Result<&'a crate::value::ListObject, NativeError> {
    if let Value::Object(obj) = value {
        if let Some(list) = obj.as_list() {
            return Ok(list);
        }
    }
    Err(NativeError::new(
        RuntimeErrorKind::InvalidType,
        format!("{name} expected a List but got {}", value.type_name()),
    ))
}

fn expect_index(name: &str, value: &Value, len: usize) -> Result<usize, NativeError> {
    let index = match value {
        Value::Int(n) => *n,
        other => {
            return Err(NativeError::new(
                RuntimeErrorKind::InvalidArgument,
                format!("{name} expected an Int index but got {}", other.type_name()),
            ))
        }
    };
    if index < 0 || index as usize >= len {
        return Err(NativeError::new(
            RuntimeErrorKind::IndexOutOfRange,
            format!("index {index} is out of range for a List of length {len}"),
        ));
    }
    Ok(index as usize)
}

fn native_append_list(args: &[Value]) -> NativeResult {
    let list = expect_list("__native_append_list", &args[0])?;
    list.append(args[1].clone());
    Ok(Value::Null)
}

fn native_set_list_at_index(args: &[Value]) -> NativeResult {
    let list = expect_list("__native_set_list_at_index", &args[0])?;
    let index = expect_index("__native_set_list_at_index", &args[1], list.len())?;
    list.set(index, args[2].clone());
    Ok(Value::Null)
}

fn native_get_list_at_index(args: &[Value]) -> NativeResult {
    let list = expect_list("__native_get_list_at_index", &args[0])?;
    let index = expect_index("__native_get_list_at_index", &args[1], list.len())?;
    Ok(list.get(index).unwrap_or(Value::Null))
}

fn native_list_length(args: &[Value]) -> NativeResult {
    let list = expect_list("__native_list_length", &args[0])?;
    Ok(Value::Int(list.len() as i64))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_and_names() {
        let natives = register_all();
        assert!(natives.iter().all(|n| n.name.starts_with("__native_")));
        assert_eq!(natives[0].name, "__native_sqrt");
        // Indices are stable: the compiler bakes them into bytecode.
        let names: Vec<_> = natives.iter().map(|n| n.name).collect();
        assert_eq!(
            names,
            vec![
                "__native_sqrt",
                "__native_time_s",
                "__native_time_ms",
                "__native_time_ns",
                "__native_append_list",
                "__native_set_list_at_index",
                "__native_get_list_at_index",
                "__native_list_length",
            ]
        );
    }

    #[test]
    fn test_sqrt() {
        let v = native_sqrt(&[Value::Int(9)]).unwrap();
        assert!(v.equals(&Value::Float(3.0)));
        let v = native_sqrt(&[Value::Float(2.25)]).unwrap();
        assert!(v.equals(&Value::Float(1.5)));
        let err = native_sqrt(&[Value::string("x")]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidType);
    }

    #[test]
    fn test_list_natives() {
        let list = Value::list(vec![Value::Int(1)]);
        native_append_list(&[list.clone(), Value::Int(2)]).unwrap();
        let len = native_list_length(&[list.clone()]).unwrap();
        assert!(len.equals(&Value::Int(2)));

        let v = native_get_list_at_index(&[list.clone(), Value::Int(1)]).unwrap();
        assert!(v.equals(&Value::Int(2)));

        native_set_list_at_index(&[list.clone(), Value::Int(0), Value::Int(9)]).unwrap();
        let v = native_get_list_at_index(&[list.clone(), Value::Int(0)]).unwrap();
        assert!(v.equals(&Value::Int(9)));
    }

    #[test]
    fn test_list_native_errors() {
        let list = Value::list(vec![]);
        let err = native_get_list_at_index(&[list.clone(), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::IndexOutOfRange);
        let err = native_get_list_at_index(&[list, Value::string("0")]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidArgument);
        let err = native_list_length(&[Value::Int(3)]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::InvalidType);
    }
}
