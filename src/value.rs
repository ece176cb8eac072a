//! Dynamically typed case values and the type tags that formal parameter
//! slots are checked against.
//!
//! A generated case is a sequence of [`Value`]s whose shape is only known at
//! runtime. Formal parameters declare a [`TypeTag`]; compatibility between
//! the two is an explicit tag comparison rather than reflection.

use std::fmt;

/// Type tag of a formal parameter slot, or the runtime type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Accepts every value, including null.
    Any,
    /// Runtime type of [`Value::Null`].
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Bytes,
    /// Homogeneous list; the element tag is `Any` for mixed or empty lists.
    List(Box<TypeTag>),
    /// Fixed-arity composite.
    Tuple(Vec<TypeTag>),
    /// Boxed form of the inner type: accepts what the inner type accepts,
    /// plus null. A plain slot and its boxed form accept the same present
    /// values.
    Optional(Box<TypeTag>),
}

impl TypeTag {
    pub fn list(element: TypeTag) -> Self {
        TypeTag::List(Box::new(element))
    }

    pub fn optional(inner: TypeTag) -> Self {
        TypeTag::Optional(Box::new(inner))
    }

    pub fn tuple<I: IntoIterator<Item = TypeTag>>(components: I) -> Self {
        TypeTag::Tuple(components.into_iter().collect())
    }

    /// Whether a slot of this type may directly hold `value`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeTag::Any, _) => true,
            (TypeTag::Optional(_), Value::Null) => true,
            (TypeTag::Optional(inner), present) => inner.accepts(present),
            (TypeTag::Null, Value::Null) => true,
            (TypeTag::Boolean, Value::Boolean(_)) => true,
            (TypeTag::Integer, Value::Integer(_)) => true,
            (TypeTag::Float, Value::Float(_)) => true,
            (TypeTag::String, Value::String(_)) => true,
            (TypeTag::Bytes, Value::Bytes(_)) => true,
            (TypeTag::List(element), Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (TypeTag::Tuple(components), Value::Tuple(items)) => {
                components.len() == items.len()
                    && components.iter().zip(items).all(|(tag, item)| tag.accepts(item))
            }
            _ => false,
        }
    }

    /// Static counterpart of [`TypeTag::accepts`]: whether every value whose
    /// runtime type is `source` fits a slot of this type.
    pub fn is_assignable_from(&self, source: &TypeTag) -> bool {
        match (self, source) {
            (TypeTag::Any, _) => true,
            (TypeTag::Optional(inner), TypeTag::Optional(other)) => inner.is_assignable_from(other),
            (TypeTag::Optional(_), TypeTag::Null) => true,
            (TypeTag::Optional(inner), other) => inner.is_assignable_from(other),
            (TypeTag::List(element), TypeTag::List(other)) => element.is_assignable_from(other),
            (TypeTag::Tuple(components), TypeTag::Tuple(others)) => {
                components.len() == others.len()
                    && components
                        .iter()
                        .zip(others)
                        .all(|(tag, other)| tag.is_assignable_from(other))
            }
            (_, TypeTag::Any) => false,
            (slot, other) => slot == other,
        }
    }

    pub fn admits_null(&self) -> bool {
        matches!(self, TypeTag::Any | TypeTag::Null | TypeTag::Optional(_))
    }

    /// Arity when this is a tuple tag.
    pub fn tuple_arity(&self) -> Option<usize> {
        match self {
            TypeTag::Tuple(components) => Some(components.len()),
            _ => None,
        }
    }

    /// The narrowest tag covering every tag in `tags`, or `Any` when they
    /// disagree or there are none.
    pub fn common<'a, I: IntoIterator<Item = &'a TypeTag>>(tags: I) -> TypeTag {
        let mut tags = tags.into_iter();
        let first = match tags.next() {
            Some(first) => first.clone(),
            None => return TypeTag::Any,
        };
        if tags.all(|tag| *tag == first) {
            first
        } else {
            TypeTag::Any
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Any => write!(f, "any"),
            TypeTag::Null => write!(f, "null"),
            TypeTag::Boolean => write!(f, "boolean"),
            TypeTag::Integer => write!(f, "integer"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Bytes => write!(f, "bytes"),
            TypeTag::List(element) => write!(f, "list<{}>", element),
            TypeTag::Tuple(components) => {
                write!(f, "tuple{}<", components.len())?;
                for (i, component) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", component)?;
                }
                write!(f, ">")
            }
            TypeTag::Optional(inner) => write!(f, "optional<{}>", inner),
        }
    }
}

/// A generated value. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn tuple<I: IntoIterator<Item = Value>>(components: I) -> Self {
        Value::Tuple(components.into_iter().collect())
    }

    pub fn runtime_type(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Integer(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::List(items) => {
                let element_types: Vec<TypeTag> = items.iter().map(Value::runtime_type).collect();
                TypeTag::list(TypeTag::common(&element_types))
            }
            Value::Tuple(items) => TypeTag::Tuple(items.iter().map(Value::runtime_type).collect()),
        }
    }

    /// Arity when this value is a tuple.
    pub fn tuple_arity(&self) -> Option<usize> {
        match self {
            Value::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::List(items) => write_sequence(f, "[", items, "]"),
            Value::Tuple(items) => write_sequence(f, "(", items, ")"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self {
        Value::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Value {
    fn from((a, b, c): (A, B, C)) -> Self {
        Value::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>, D: Into<Value>> From<(A, B, C, D)> for Value {
    fn from((a, b, c, d): (A, B, C, D)) -> Self {
        Value::Tuple(vec![a.into(), b.into(), c.into(), d.into()])
    }
}
