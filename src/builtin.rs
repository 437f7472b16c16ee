//! Standard native functions.
//!
//! Thin wrappers over the core, registered into the master object when an
//! engine opens so every instance sees them. Output goes through the `log`
//! facade; the host decides where it ends up.

use crate::engine::Engine;
use crate::error::{ScriptError, ScriptResult};
use crate::object::Object;
use crate::value::{NativeFunction, Value};

pub(crate) fn install(engine: &mut Engine) -> ScriptResult<()> {
    engine.define_master_native(
        "print",
        NativeFunction::strings("print", |_call, args| {
            log::info!(target: "emjs::script", "{}", args.join(" "));
            Ok(Value::Undefined)
        }),
    )?;

    engine.define_master_native(
        "trace",
        NativeFunction::strings("trace", |_call, args| {
            log::debug!(target: "emjs::script", "{}", args.join(" "));
            Ok(Value::Undefined)
        }),
    )?;

    engine.define_master_native(
        "assert",
        NativeFunction::values("assert", |_call, args| match args.first() {
            Some(v) if v.to_bool() => Ok(Value::Bool(true)),
            _ => Err(ScriptError::native("assertion failed")),
        }),
    )?;

    // Re-enters the calling instance's evaluator on its argument.
    engine.define_master_native(
        "eval",
        NativeFunction::values("eval", |call, args| match args.first() {
            Some(Value::Str(s)) => call.interp.eval(s),
            Some(other) => Ok(other.clone()),
            None => Ok(Value::Undefined),
        }),
    )?;

    // Array constructor: `new Array(a, b, ...)`. The synthetic `length`
    // property tracks the numeric-named elements.
    engine.define_master_native(
        "Array",
        NativeFunction::values("Array", |_call, args| {
            let mut arr = Object::array();
            for (i, v) in args.iter().enumerate() {
                arr.set_or_create(i.to_string(), v.deep_clone())?;
            }
            Ok(Value::object(arr))
        }),
    )?;

    Ok(())
}
