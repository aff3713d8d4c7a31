// File: src/object.rs
//
// Runtime values for the VM. Every variant carries a type
// tag used verbatim in error messages ("INTEGER", "ARRAY", ...).
//
// Equality/identity: string, array, and hash values compare by reference
// identity, not structural equality — `Rc::ptr_eq` is the mechanism.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type BuiltinFn = fn(&[Object]) -> Object;

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    Null,
    Str(Rc<String>),
    Array(Rc<Vec<Object>>),
    Hash(Rc<HashMap<HashKey, HashPair>>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(BuiltinFn),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

/// (type-tag, 64-bit fingerprint) pair used as a hash map key. Only
/// Integer, Boolean, and String values are hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(u64),
}

impl Object {
    /// Type tag used verbatim in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null => "NULL",
            Object::Str(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION_OBJ",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Error(_) => "ERROR",
        }
    }

    /// Truthiness: the Boolean value itself, false for Null,
    /// true for everything else.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Boolean(b) => *b,
            Object::Null => false,
            _ => true,
        }
    }

    /// Hash-key protocol. `Err` carries the offending type
    /// tag so callers can format "unusable as hash key: <TYPE>".
    pub fn hash_key(&self) -> Result<HashKey, &'static str> {
        match self {
            Object::Integer(i) => Ok(HashKey::Integer(*i)),
            Object::Boolean(b) => Ok(HashKey::Boolean(*b)),
            Object::Str(s) => Ok(HashKey::Str(fnv1a64(s.as_bytes()))),
            other => Err(other.type_name()),
        }
    }

    /// Identity-based equality used by `OpEqual`/`OpNotEqual` for every
    /// non-Integer type.
    pub fn identity_eq(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::Str(a), Object::Str(b)) => Rc::ptr_eq(a, b),
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `inspect()`-style rendering used by `puts` and the REPL to print the
    /// final popped value. Not otherwise semantically load-bearing.
    pub fn inspect(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(i) => write!(f, "{i}"),
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Null => write!(f, "null"),
            Object::Str(s) => write!(f, "{s}"),
            Object::Array(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Object::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Object::CompiledFunction(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Object::Closure(cl) => write!(f, "Closure[{:p}]", Rc::as_ptr(cl)),
            Object::Builtin(_) => write!(f, "builtin function"),
            Object::Error(msg) => write!(f, "ERROR: {msg}"),
        }
    }
}

/// Deterministic 64-bit FNV-1a hash. Used instead of `ahash` for string
/// hash keys so constant ordering — and therefore compiled bytecode — is
/// reproducible across runs; `ahash`
/// seeds itself randomly per process.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
