//! Script values.
//!
//! `Value` is a tagged union over the scripting types. `Clone` is a shallow
//! copy: heap payloads (strings, objects, functions) are reference-counted
//! and aliased. [`Value::deep_clone`] duplicates the payload instead, and is
//! used wherever a value must outlive or diverge from its source, such as
//! marshalling call arguments.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::engine::{HandleKind, NativeCall};
use crate::error::{ScriptError, ScriptResult};
use crate::object::Object;
use crate::token::OpKind;

/// A script value.
#[derive(Clone)]
pub enum Value {
    /// No value.
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean, produced by comparisons.
    Bool(bool),
    /// Native-word integer.
    Int(i32),
    /// Wide integer.
    Wide(i64),
    /// Floating point.
    #[cfg(feature = "float")]
    Float(f64),
    /// String.
    Str(Rc<String>),
    /// Object (property container).
    Object(Rc<RefCell<Object>>),
    /// Script-defined function.
    Function(Rc<Function>),
    /// Host-defined native function.
    Native(Rc<NativeFunction>),
}

/// A script-defined function: parameter names plus the un-parsed body text.
pub struct Function {
    /// Function name; empty for anonymous functions.
    pub name: String,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    /// Body source text, filled in once the declaration's braces have been
    /// scanned. The function value is bound before that happens so recursive
    /// references resolve.
    body: RefCell<String>,
}

impl Function {
    /// Create a function. `body` may be empty and set later.
    pub fn new<S: Into<String>>(name: S, params: Vec<String>, body: String) -> Self {
        Function {
            name: name.into(),
            params,
            body: RefCell::new(body),
        }
    }

    /// Copy of the body source text.
    pub fn body(&self) -> String {
        self.body.borrow().clone()
    }

    pub(crate) fn set_body(&self, text: String) {
        *self.body.borrow_mut() = text;
    }

    fn duplicate(&self) -> Function {
        Function {
            name: self.name.clone(),
            params: self.params.clone(),
            body: RefCell::new(self.body()),
        }
    }
}

/// Callback shape for a native function.
#[derive(Clone)]
pub enum NativeCallback {
    /// Receives the evaluated argument values.
    Values(Rc<dyn Fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value>>),
    /// Receives each argument coerced to its string form.
    Strings(Rc<dyn Fn(&mut NativeCall<'_>, &[String]) -> ScriptResult<Value>>),
}

/// A host-defined native function.
pub struct NativeFunction {
    /// Name the function was registered under.
    pub name: String,
    /// The host callback.
    pub callback: NativeCallback,
    /// Opaque per-registration data handed to every call.
    pub data: Option<Rc<dyn Any>>,
    /// Which instance host handle is routed to the call.
    pub handle: HandleKind,
}

impl NativeFunction {
    /// Native taking evaluated values.
    pub fn values<S, F>(name: S, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value> + 'static,
    {
        NativeFunction {
            name: name.into(),
            callback: NativeCallback::Values(Rc::new(f)),
            data: None,
            handle: HandleKind::Primary,
        }
    }

    /// Native taking string-coerced arguments.
    pub fn strings<S, F>(name: S, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(&mut NativeCall<'_>, &[String]) -> ScriptResult<Value> + 'static,
    {
        NativeFunction {
            name: name.into(),
            callback: NativeCallback::Strings(Rc::new(f)),
            data: None,
            handle: HandleKind::Primary,
        }
    }

    /// Attach opaque registration data.
    pub fn with_data(mut self, data: Rc<dyn Any>) -> Self {
        self.data = Some(data);
        self
    }

    /// Route the alternate host handle to calls instead of the primary one.
    pub fn with_alternate_handle(mut self) -> Self {
        self.handle = HandleKind::Alternate;
        self
    }
}

impl Value {
    /// String literal value.
    pub fn string<S: Into<String>>(s: S) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    /// Wrap an object.
    pub fn object(obj: Object) -> Value {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Integer value, narrowed to the native word when it fits.
    pub fn integer(n: i64) -> Value {
        match i32::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Wide(n),
        }
    }

    /// Type tag name, for messages.
    pub fn tag_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Wide(_) => "wide",
            #[cfg(feature = "float")]
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
        }
    }

    /// True when both values carry the same type tag.
    pub fn same_tag(&self, other: &Value) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// True for `undefined` and `null`.
    pub fn is_undefined_or_null(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Truthiness.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Wide(n) => *n != 0,
            #[cfg(feature = "float")]
            Value::Float(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Display form, also used by `+` concatenation and the string-argument
    /// native flavour.
    pub fn coerced_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Wide(n) => n.to_string(),
            #[cfg(feature = "float")]
            Value::Float(n) => n.to_string(),
            Value::Str(s) => (**s).clone(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("[function {}]", f.name),
            Value::Native(f) => format!("[native {}]", f.name),
        }
    }

    /// The object payload, if this is an object.
    pub fn as_object(&self) -> Option<Rc<RefCell<Object>>> {
        match self {
            Value::Object(obj) => Some(obj.clone()),
            _ => None,
        }
    }

    /// Parse a numeric-looking string into a number value.
    pub fn numeric_from_str(s: &str) -> Option<Value> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(n) = s.parse::<i64>() {
            return Some(Value::integer(n));
        }
        #[cfg(feature = "float")]
        if let Ok(n) = s.parse::<f64>() {
            return Some(Value::Float(n));
        }
        None
    }

    /// Duplicate the heap payload instead of aliasing it. Object property
    /// tables are copied recursively; hidden (non-enumerated) properties are
    /// not carried over, which also keeps scope self-references from
    /// recursing.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Str(s) => Value::Str(Rc::new((**s).clone())),
            Value::Object(obj) => {
                Value::Object(Rc::new(RefCell::new(obj.borrow().deep_clone())))
            }
            Value::Function(f) => Value::Function(Rc::new(f.duplicate())),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(_) => write!(f, "Object"),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Native(n) => write!(f, "Native({})", n.name),
            other => write!(f, "{}({})", other.tag_name(), other.coerced_string()),
        }
    }
}

fn bad_operand(op: OpKind, value: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "bad {} operand for '{}'",
        value.tag_name(),
        op.symbol()
    ))
}

/// Numeric view used after the coercion steps have run.
enum Num {
    Int(i32),
    Wide(i64),
    #[cfg(feature = "float")]
    Float(f64),
}

fn as_num(op: OpKind, value: &Value) -> ScriptResult<Num> {
    match value {
        Value::Bool(b) => Ok(Num::Int(*b as i32)),
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Wide(n) => Ok(Num::Wide(*n)),
        #[cfg(feature = "float")]
        Value::Float(n) => Ok(Num::Float(*n)),
        other => Err(bad_operand(op, other)),
    }
}

fn as_wide(op: OpKind, value: &Value) -> ScriptResult<i64> {
    match as_num(op, value)? {
        Num::Int(n) => Ok(n as i64),
        Num::Wide(n) => Ok(n),
        #[cfg(feature = "float")]
        Num::Float(n) => Ok(n as i64),
    }
}

fn int_op(op: OpKind, a: i32, b: i32) -> ScriptResult<Value> {
    let v = match op {
        OpKind::Plus => Value::Int(a.wrapping_add(b)),
        OpKind::Minus => Value::Int(a.wrapping_sub(b)),
        OpKind::Mul => Value::Int(a.wrapping_mul(b)),
        OpKind::Div => {
            if b == 0 {
                return Err(ScriptError::arithmetic("divide by zero"));
            }
            Value::Int(a.wrapping_div(b))
        }
        OpKind::Mod => {
            if b == 0 {
                return Err(ScriptError::arithmetic("modulo by zero"));
            }
            Value::Int(a.wrapping_rem(b))
        }
        OpKind::Eq => Value::Bool(a == b),
        OpKind::Ne => Value::Bool(a != b),
        OpKind::Lt => Value::Bool(a < b),
        OpKind::Le => Value::Bool(a <= b),
        OpKind::Gt => Value::Bool(a > b),
        OpKind::Ge => Value::Bool(a >= b),
        _ => return Err(ScriptError::internal("unexpected operator")),
    };
    Ok(v)
}

fn wide_op(op: OpKind, a: i64, b: i64) -> ScriptResult<Value> {
    let v = match op {
        OpKind::Plus => Value::Wide(a.wrapping_add(b)),
        OpKind::Minus => Value::Wide(a.wrapping_sub(b)),
        OpKind::Mul => Value::Wide(a.wrapping_mul(b)),
        OpKind::Div => {
            if b == 0 {
                return Err(ScriptError::arithmetic("divide by zero"));
            }
            Value::Wide(a.wrapping_div(b))
        }
        OpKind::Mod => {
            if b == 0 {
                return Err(ScriptError::arithmetic("modulo by zero"));
            }
            Value::Wide(a.wrapping_rem(b))
        }
        OpKind::Eq => Value::Bool(a == b),
        OpKind::Ne => Value::Bool(a != b),
        OpKind::Lt => Value::Bool(a < b),
        OpKind::Le => Value::Bool(a <= b),
        OpKind::Gt => Value::Bool(a > b),
        OpKind::Ge => Value::Bool(a >= b),
        _ => return Err(ScriptError::internal("unexpected operator")),
    };
    Ok(v)
}

#[cfg(feature = "float")]
fn float_op(op: OpKind, a: f64, b: f64) -> ScriptResult<Value> {
    let v = match op {
        OpKind::Plus => Value::Float(a + b),
        OpKind::Minus => Value::Float(a - b),
        OpKind::Mul => Value::Float(a * b),
        OpKind::Div => {
            if b == 0.0 {
                return Err(ScriptError::arithmetic("divide by zero"));
            }
            Value::Float(a / b)
        }
        OpKind::Mod => {
            if b == 0.0 {
                return Err(ScriptError::arithmetic("modulo by zero"));
            }
            Value::Float(a % b)
        }
        OpKind::Eq => Value::Bool(a == b),
        OpKind::Ne => Value::Bool(a != b),
        OpKind::Lt => Value::Bool(a < b),
        OpKind::Le => Value::Bool(a <= b),
        OpKind::Gt => Value::Bool(a > b),
        OpKind::Ge => Value::Bool(a >= b),
        _ => return Err(ScriptError::internal("unexpected operator")),
    };
    Ok(v)
}

fn str_op(op: OpKind, a: &str, b: &str) -> ScriptResult<Value> {
    let v = match op {
        OpKind::Eq => Value::Bool(a == b),
        OpKind::Ne => Value::Bool(a != b),
        // Ordinal byte order, not any collation.
        OpKind::Lt => Value::Bool(a.as_bytes() < b.as_bytes()),
        OpKind::Le => Value::Bool(a.as_bytes() <= b.as_bytes()),
        OpKind::Gt => Value::Bool(a.as_bytes() > b.as_bytes()),
        OpKind::Ge => Value::Bool(a.as_bytes() >= b.as_bytes()),
        _ => {
            return Err(ScriptError::type_error(format!(
                "bad string operand for '{}'",
                op.symbol()
            )))
        }
    };
    Ok(v)
}

fn ref_equality(op: OpKind, same: bool) -> Value {
    match op {
        OpKind::Ne => Value::Bool(!same),
        _ => Value::Bool(same),
    }
}

/// Apply a binary operator to two scalar operands.
///
/// Object operands are expected to have been coerced (via their script-level
/// `toValue`/`toString`) by the evaluator before this runs; raw references
/// that still arrive here only support identity equality. The remaining
/// coercion order: booleans become numeric except under `==`/`!=`;
/// numeric-looking strings become numbers for non-`+` arithmetic; otherwise
/// mixed operands are promoted with preference string > float > wide > int.
/// `undefined`/`null` support equality only.
pub fn binary_op(op: OpKind, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    if lhs.is_undefined_or_null() || rhs.is_undefined_or_null() {
        return match op {
            OpKind::Eq => Ok(Value::Bool(lhs.same_tag(rhs))),
            OpKind::Ne => Ok(Value::Bool(!lhs.same_tag(rhs))),
            _ => Err(bad_operand(
                op,
                if lhs.is_undefined_or_null() { lhs } else { rhs },
            )),
        };
    }

    // Reference types: identity equality only.
    match (lhs, rhs) {
        (Value::Object(a), Value::Object(b)) if op.is_equality() => {
            return Ok(ref_equality(op, Rc::ptr_eq(a, b)));
        }
        (Value::Function(a), Value::Function(b)) if op.is_equality() => {
            return Ok(ref_equality(op, Rc::ptr_eq(a, b)));
        }
        (Value::Native(a), Value::Native(b)) if op.is_equality() => {
            return Ok(ref_equality(op, Rc::ptr_eq(a, b)));
        }
        (Value::Object(_) | Value::Function(_) | Value::Native(_), _) => {
            return Err(bad_operand(op, lhs));
        }
        (_, Value::Object(_) | Value::Function(_) | Value::Native(_)) => {
            return Err(bad_operand(op, rhs));
        }
        _ => {}
    }

    if matches!(op, OpKind::Shl | OpKind::Shr) {
        let (a, b) = (shift_operand(op, lhs)?, shift_operand(op, rhs)?);
        let v = match op {
            OpKind::Shl => a.wrapping_shl(b as u32 & 63),
            _ => a.wrapping_shr(b as u32 & 63),
        };
        return Ok(Value::integer(v));
    }

    if op.is_equality() {
        match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => return Ok(ref_equality(op, a == b)),
            // A boolean is not coerced for equality; differing tags compare
            // unequal.
            (Value::Bool(_), _) | (_, Value::Bool(_)) => return Ok(ref_equality(op, false)),
            _ => {}
        }
    }

    // `+` with a string operand is concatenation, before any numeric
    // conversion of numeric-looking strings.
    if op == OpKind::Plus && matches!((lhs, rhs), (Value::Str(_), _) | (_, Value::Str(_))) {
        let mut s = lhs.coerced_string();
        s.push_str(&rhs.coerced_string());
        return Ok(Value::string(s));
    }

    // Numeric-looking strings participate in arithmetic as numbers.
    let lhs = match lhs {
        Value::Str(s) => Value::numeric_from_str(s).unwrap_or_else(|| lhs.clone()),
        other => other.clone(),
    };
    let rhs = match rhs {
        Value::Str(s) => Value::numeric_from_str(s).unwrap_or_else(|| rhs.clone()),
        other => other.clone(),
    };

    // A remaining string pulls the other operand to a string.
    if let (Value::Str(_), _) | (_, Value::Str(_)) = (&lhs, &rhs) {
        return str_op(op, &lhs.coerced_string(), &rhs.coerced_string());
    }

    let (a, b) = (as_num(op, &lhs)?, as_num(op, &rhs)?);
    #[cfg(feature = "float")]
    if matches!(a, Num::Float(_)) || matches!(b, Num::Float(_)) {
        let fa = match a {
            Num::Int(n) => n as f64,
            Num::Wide(n) => n as f64,
            Num::Float(n) => n,
        };
        let fb = match b {
            Num::Int(n) => n as f64,
            Num::Wide(n) => n as f64,
            Num::Float(n) => n,
        };
        return float_op(op, fa, fb);
    }
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_op(op, a, b),
        (a, b) => {
            let wa = match a {
                Num::Int(n) => n as i64,
                Num::Wide(n) => n,
                #[cfg(feature = "float")]
                Num::Float(_) => unreachable!(),
            };
            let wb = match b {
                Num::Int(n) => n as i64,
                Num::Wide(n) => n,
                #[cfg(feature = "float")]
                Num::Float(_) => unreachable!(),
            };
            wide_op(op, wa, wb)
        }
    }
}

fn shift_operand(op: OpKind, value: &Value) -> ScriptResult<i64> {
    match value {
        Value::Str(s) => match Value::numeric_from_str(s) {
            Some(v) => as_wide(op, &v),
            None => Err(bad_operand(op, value)),
        },
        other => as_wide(op, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: &Value) -> i64 {
        match v {
            Value::Int(n) => *n as i64,
            Value::Wide(n) => *n,
            other => panic!("not an integer: {:?}", other),
        }
    }

    fn truth(v: &Value) -> bool {
        match v {
            Value::Bool(b) => *b,
            other => panic!("not a boolean: {:?}", other),
        }
    }

    #[test]
    fn shallow_clone_aliases_objects() {
        let a = Value::object(Object::new());
        let b = a.clone();
        if let (Value::Object(x), Value::Object(y)) = (&a, &b) {
            assert!(Rc::ptr_eq(x, y));
        } else {
            panic!("not objects");
        }
    }

    #[test]
    fn deep_clone_duplicates_objects() {
        let mut obj = Object::new();
        obj.create("x", Value::Int(1)).unwrap();
        let a = Value::object(obj);
        let b = a.deep_clone();
        if let (Value::Object(x), Value::Object(y)) = (&a, &b) {
            assert!(!Rc::ptr_eq(x, y));
            y.borrow_mut().set_or_create("x", Value::Int(2)).unwrap();
            let kept = x.borrow_mut().get("x").unwrap().unwrap();
            assert_eq!(int(&kept), 1);
        } else {
            panic!("not objects");
        }
    }

    #[test]
    fn integer_arithmetic() {
        let v = binary_op(OpKind::Plus, &Value::Int(2), &Value::Int(3)).unwrap();
        assert_eq!(int(&v), 5);
        let v = binary_op(OpKind::Mul, &Value::Int(4), &Value::Wide(1 << 40)).unwrap();
        assert_eq!(int(&v), 4 << 40);
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        assert!(binary_op(OpKind::Div, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(binary_op(OpKind::Mod, &Value::Int(1), &Value::Int(0)).is_err());
        #[cfg(feature = "float")]
        assert!(binary_op(OpKind::Div, &Value::Float(1.0), &Value::Float(0.0)).is_err());
    }

    #[test]
    fn plus_with_string_concatenates() {
        let v = binary_op(OpKind::Plus, &Value::Int(1), &Value::string("2")).unwrap();
        assert_eq!(v.coerced_string(), "12");
        let v = binary_op(OpKind::Plus, &Value::string("a"), &Value::string("b")).unwrap();
        assert_eq!(v.coerced_string(), "ab");
    }

    #[test]
    fn numeric_string_converts_for_other_arithmetic() {
        let v = binary_op(OpKind::Minus, &Value::string("10"), &Value::Int(4)).unwrap();
        assert_eq!(int(&v), 6);
        let v = binary_op(OpKind::Mul, &Value::Int(3), &Value::string("5")).unwrap();
        assert_eq!(int(&v), 15);
    }

    #[test]
    fn non_numeric_string_arithmetic_is_an_error() {
        assert!(binary_op(OpKind::Minus, &Value::string("abc"), &Value::Int(1)).is_err());
    }

    #[test]
    fn string_relational_is_ordinal() {
        let v = binary_op(OpKind::Lt, &Value::string("abc"), &Value::string("abd")).unwrap();
        assert!(truth(&v));
        let v = binary_op(OpKind::Gt, &Value::string("Z"), &Value::string("a")).unwrap();
        assert!(!truth(&v));
    }

    #[test]
    fn undefined_and_null_support_equality_only() {
        let v = binary_op(OpKind::Eq, &Value::Undefined, &Value::Undefined).unwrap();
        assert!(truth(&v));
        let v = binary_op(OpKind::Eq, &Value::Undefined, &Value::Null).unwrap();
        assert!(!truth(&v));
        let v = binary_op(OpKind::Ne, &Value::Null, &Value::Int(5)).unwrap();
        assert!(truth(&v));
        assert!(binary_op(OpKind::Plus, &Value::Undefined, &Value::Int(1)).is_err());
    }

    #[test]
    fn booleans_numeric_except_equality() {
        let v = binary_op(OpKind::Lt, &Value::Bool(true), &Value::Int(2)).unwrap();
        assert!(truth(&v));
        let v = binary_op(OpKind::Eq, &Value::Bool(true), &Value::Int(1)).unwrap();
        assert!(!truth(&v));
        let v = binary_op(OpKind::Eq, &Value::Bool(true), &Value::Bool(true)).unwrap();
        assert!(truth(&v));
    }

    #[test]
    fn shifts_use_wide_integers() {
        let v = binary_op(OpKind::Shl, &Value::Int(1), &Value::Int(4)).unwrap();
        assert_eq!(int(&v), 16);
        let v = binary_op(OpKind::Shr, &Value::Wide(256), &Value::Int(4)).unwrap();
        assert_eq!(int(&v), 16);
    }

    #[test]
    fn int_arithmetic_wraps() {
        let v = binary_op(OpKind::Plus, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
        assert_eq!(int(&v), i32::MIN as i64);
    }

    #[cfg(feature = "float")]
    #[test]
    fn mixed_float_promotes() {
        let v = binary_op(OpKind::Plus, &Value::Int(1), &Value::Float(2.5)).unwrap();
        assert_eq!(v.coerced_string(), "3.5");
    }

    #[test]
    fn object_identity_equality() {
        let a = Value::object(Object::new());
        let b = a.clone();
        let c = Value::object(Object::new());
        assert!(truth(&binary_op(OpKind::Eq, &a, &b).unwrap()));
        assert!(truth(&binary_op(OpKind::Ne, &a, &c).unwrap()));
    }

    #[test]
    fn wide_literals_narrow_when_possible() {
        assert!(matches!(Value::integer(7), Value::Int(7)));
        assert!(matches!(Value::integer(1 << 40), Value::Wide(_)));
    }
}
