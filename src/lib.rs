//! A small embedded scripting engine with a JavaScript-flavoured grammar.
//!
//! Scripts are executed in a single pass: the recursive-descent parser
//! evaluates statements as it recognizes them, with no intermediate syntax
//! tree. The language covers variables, objects with ordered properties,
//! `if`/`for`/`for-in`, user-defined and host-native functions, and the
//! usual operator set with left-to-right evaluation.
//!
//! Hosts open an [`Engine`], register native functions, open one
//! [`Instance`](engine::Instance) per execution context and evaluate
//! scripts on it:
//!
//! ```no_run
//! use emjs::{Engine, EngineOptions};
//!
//! # fn main() -> emjs::ScriptResult<()> {
//! let mut engine = Engine::open(EngineOptions::default())?;
//! let id = engine.open_instance(None, None)?;
//! let result = engine.eval(id, "var x = 6; x * 7")?;
//! assert_eq!(result.coerced_string(), "42");
//! engine.close_instance(id)?;
//! # Ok(())
//! # }
//! ```
//!
//! For one-off evaluation without holding an engine, use [`eval`].

mod builtin;
pub mod engine;
pub mod error;
mod eval;
pub mod lexer;
pub mod object;
pub mod scope;
pub mod token;
pub mod value;

pub use engine::{Engine, EngineOptions, HandleKind, HostLock, Instance, InstanceId, NativeCall};
pub use error::{ScriptError, ScriptResult};
pub use object::{Object, PropCategory, PropFlags, Trigger, TriggerEvent};
pub use value::{Function, NativeCallback, NativeFunction, Value};

/// Evaluate a script in a throwaway engine and instance.
pub fn eval(script: &str) -> ScriptResult<Value> {
    let mut engine = Engine::open(EngineOptions::default())?;
    let id = engine.open_instance(None, None)?;
    let result = engine.eval(id, script);
    engine.close_instance(id)?;
    result
}
