//! Runtime values as the console sees them.
//!
//! Host bridges translate whatever the page hands to `console.*` or returns
//! from evaluated script into [`Value`]. Containers are shared by reference so
//! a bridge can preserve object identity (and therefore cycles) from the page.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectAccessError {
    #[error("object reference no longer points at a live object")]
    Dangling,
    #[error("object is being mutated")]
    Busy,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision integer in base-10 digits.
    BigInt(String),
    String(String),
    Symbol(String),
    Function(FunctionValue),
    Error(ErrorValue),
    Element(ElementValue),
    Array(ObjectRef),
    Object(ObjectRef),
    /// Host value with no better representation than its string coercion.
    Opaque(String),
}

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(ObjectRef::from_entries(entries))
    }

    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let array = ObjectRef::new();
        for item in items {
            array.push(item);
        }
        Value::Array(array)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(ErrorValue::new("Error", message))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Page-script truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(value) => *value,
            Value::Number(value) => *value != 0.0 && !value.is_nan(),
            Value::BigInt(digits) => !digits.trim_start_matches(['-', '0']).is_empty(),
            Value::String(text) => !text.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Function(_) => "function",
            Value::Error(_) => "error",
            Value::Element(_) => "element",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Value::Number(value) => f.debug_tuple("Number").field(value).finish(),
            Value::BigInt(value) => f.debug_tuple("BigInt").field(value).finish(),
            Value::String(value) => f.debug_tuple("String").field(value).finish(),
            Value::Symbol(value) => f.debug_tuple("Symbol").field(value).finish(),
            Value::Function(value) => f.debug_tuple("Function").field(value).finish(),
            Value::Error(value) => f.debug_tuple("Error").field(value).finish(),
            Value::Element(value) => f.debug_tuple("Element").field(value).finish(),
            // Containers may be cyclic; never recurse here.
            Value::Array(object) => f.debug_tuple("Array").field(object).finish(),
            Value::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Value::Opaque(value) => f.debug_tuple("Opaque").field(value).finish(),
        }
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

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => {
                Value::Number(number.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(text) => Value::String(text),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(key, value)| (key, Value::from(value))))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionValue {
    pub name: Option<String>,
    pub source: Option<String>,
}

impl FunctionValue {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            source: None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "anonymous",
        }
    }

    /// What `String(fn)` yields on the page.
    pub fn coerce_to_string(&self) -> String {
        match self.source.as_deref() {
            Some(source) if !source.is_empty() => source.to_string(),
            _ => format!(
                "function {}() {{ [native code] }}",
                self.name.as_deref().unwrap_or_default()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Trace if present, else the message, else the string form.
    pub fn trace_text(&self) -> String {
        if let Some(stack) = self.stack.as_deref().filter(|stack| !stack.is_empty()) {
            return stack.to_string();
        }
        if !self.message.is_empty() {
            return self.message.clone();
        }
        self.to_string()
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.message.is_empty()) {
            (true, _) => f.write_str(&self.message),
            (false, true) => f.write_str(&self.name),
            (false, false) => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementValue {
    pub tag_name: String,
    pub id: String,
    /// `None` when the node's class attribute is not plain text (SVG nodes).
    pub class_name: Option<String>,
}

impl ElementValue {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// `<tag#id.c1.c2.c3>`, keeping at most three class tokens.
    pub fn descriptor(&self) -> String {
        let mut descriptor = format!("<{}", self.tag_name.to_lowercase());
        if !self.id.is_empty() {
            descriptor.push('#');
            descriptor.push_str(&self.id);
        }
        if let Some(class_name) = self.class_name.as_deref() {
            let classes = class_name.split_whitespace().take(3).collect::<Vec<_>>();
            if !classes.is_empty() {
                descriptor.push('.');
                descriptor.push_str(&classes.join("."));
            }
        }
        descriptor.push('>');
        descriptor
    }
}

#[derive(Default)]
struct ObjectNode {
    entries: RefCell<Vec<(String, Value)>>,
}

#[derive(Clone)]
enum Link {
    Owned(Rc<ObjectNode>),
    Alias(Weak<ObjectNode>),
}

/// Shared, ordered key/value container with pointer identity.
///
/// Arrays use the same storage with their indices as keys. An alias produced
/// by [`ObjectRef::downgrade`] keeps identity without keeping the target
/// alive, which lets bridges express back-references without `Rc` cycles.
#[derive(Clone)]
pub struct ObjectRef {
    link: Link,
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRef {
    pub fn new() -> Self {
        Self {
            link: Link::Owned(Rc::new(ObjectNode::default())),
        }
    }

    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::new();
        for (key, value) in entries {
            object.insert(key, value);
        }
        object
    }

    pub fn downgrade(&self) -> Self {
        let weak = match &self.link {
            Link::Owned(node) => Rc::downgrade(node),
            Link::Alias(weak) => weak.clone(),
        };
        Self {
            link: Link::Alias(weak),
        }
    }

    /// Identity of the referenced object; equal for every reference to it.
    pub fn id(&self) -> usize {
        match &self.link {
            Link::Owned(node) => Rc::as_ptr(node) as usize,
            Link::Alias(weak) => weak.as_ptr() as usize,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.link, Link::Alias(_))
    }

    pub fn is_live(&self) -> bool {
        self.node().is_some()
    }

    /// Sets `key`, replacing an existing entry in place. No-op on a dangling alias.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let Some(node) = self.node() else {
            return;
        };
        let key = key.into();
        let mut entries = node.entries.borrow_mut();
        if let Some(slot) = entries.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    pub fn push(&self, value: Value) {
        let Some(node) = self.node() else {
            return;
        };
        let mut entries = node.entries.borrow_mut();
        let key = entries.len().to_string();
        entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let node = self.node()?;
        let entries = node.entries.try_borrow().ok()?;
        entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.clone())
    }

    pub fn len(&self) -> usize {
        self.node()
            .and_then(|node| node.entries.try_borrow().ok().map(|entries| entries.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, Value)>, ObjectAccessError> {
        let node = self.node().ok_or(ObjectAccessError::Dangling)?;
        let entries = node
            .entries
            .try_borrow()
            .map_err(|_| ObjectAccessError::Busy)?;
        Ok(entries.clone())
    }

    fn node(&self) -> Option<Rc<ObjectNode>> {
        match &self.link {
            Link::Owned(node) => Some(Rc::clone(node)),
            Link::Alias(weak) => weak.upgrade(),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("alias", &self.is_alias())
            .field("len", &self.len())
            .finish()
    }
}
