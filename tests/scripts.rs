//! End-to-end script evaluation tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use emjs::{
    Engine, EngineOptions, HostLock, NativeFunction, ScriptError, ScriptResult, Value,
};

fn run(script: &str) -> ScriptResult<Value> {
    emjs::eval(script)
}

fn run_str(script: &str) -> String {
    run(script).expect("script failed").coerced_string()
}

// ---- statements and expressions ----

#[test]
fn result_is_the_last_statement_value() {
    assert_eq!(run_str("1 + 2"), "3");
    assert_eq!(run_str("var x = 5; x"), "5");
}

#[test]
fn operators_chain_left_to_right_without_precedence() {
    assert_eq!(run_str("2 + 3 * 4"), "20");
    assert_eq!(run_str("2 * (3 + 4)"), "14");
}

#[test]
fn string_concatenation_and_coercion() {
    assert_eq!(run_str("1 + \"2\""), "12");
    assert_eq!(run_str("\"a\" + \"b\" + 3"), "ab3");
    assert_eq!(run_str("\"10\" - 4"), "6");
}

#[test]
fn string_comparison_is_ordinal() {
    assert_eq!(run_str("\"abc\" < \"abd\""), "true");
    assert_eq!(run_str("\"Z\" < \"a\""), "true");
}

#[test]
fn division_by_zero_is_an_error() {
    assert!(run("1 / 0").is_err());
    assert!(run("7 % 0").is_err());
}

#[test]
fn undefined_supports_equality_only() {
    assert_eq!(run_str("var x; var y; x == y"), "true");
    assert_eq!(run_str("var x; x != 5"), "true");
    assert!(run("var x; x + 1").is_err());
}

#[test]
fn unary_operators() {
    assert_eq!(run_str("!0"), "true");
    assert_eq!(run_str("!3"), "false");
    assert_eq!(run_str("-5 + 2"), "-3");
    assert_eq!(run_str("-\"12\""), "-12");
}

#[test]
fn increment_and_decrement() {
    assert_eq!(run_str("var i = 5; i++; i"), "6");
    assert_eq!(run_str("var i = 5; i--; i"), "4");
    // Postfix yields the old value, prefix the new one.
    assert_eq!(run_str("var i = 5; var j = i++; j"), "5");
    assert_eq!(run_str("var i = 5; var j = ++i; j"), "6");
}

#[test]
fn logical_operators_skip_the_irrelevant_side() {
    // `zzz` is undeclared; evaluating it would be a reference error.
    assert_eq!(run_str("0 && zzz"), "false");
    assert_eq!(run_str("1 || zzz"), "true");
    assert_eq!(run_str("1 && 2 && 3"), "true");
    assert!(run("1 && zzz").is_err());
}

#[test]
fn reading_an_undeclared_name_is_a_reference_error() {
    let err = run("zzz + 1").unwrap_err();
    assert!(matches!(err, ScriptError::Reference(_)));
}

#[test]
fn comments_are_ignored() {
    assert_eq!(run_str("// leading\n1 + /* inline */ 2"), "3");
}

// ---- control flow ----

#[test]
fn if_else_branching() {
    assert_eq!(run_str("var x = 0; if (1 < 2) x = 1; else x = 2; x"), "1");
    assert_eq!(run_str("var x = 0; if (2 < 1) x = 1; else x = 2; x"), "2");
}

#[test]
fn untaken_branch_has_no_side_effects() {
    assert_eq!(run_str("var x = 0; if (0) x = 99; x"), "0");
    assert_eq!(
        run_str("var x = 0; if (1) { x = 1; } else { x = 99; } x"),
        "1"
    );
}

#[test]
fn for_loop_iterates() {
    assert_eq!(
        run_str("var sum = 0; for (var i = 0; i < 5; i++) { sum = sum + i; } sum"),
        "10"
    );
}

#[test]
fn for_loop_false_condition_skips_body_and_increment() {
    assert_eq!(
        run_str("var hit = 0; for (var i = 9; i < 0; hit = hit + 100) { hit = hit + 1; } hit"),
        "0"
    );
}

#[test]
fn for_loop_with_empty_clauses_and_return() {
    assert_eq!(
        run_str("function f() { for (var i = 0; ; i++) { if (i == 3) return i; } } f()"),
        "3"
    );
}

#[test]
fn nested_loops() {
    assert_eq!(
        run_str(
            "var n = 0;
             for (var i = 0; i < 3; i++) {
                 for (var j = 0; j < 4; j++) { n++; }
             }
             n"
        ),
        "12"
    );
}

#[test]
fn return_stops_the_rest_of_the_block() {
    assert_eq!(
        run_str("var x = 0; function f() { return 1; x = 99; } f() + x"),
        "1"
    );
}

// ---- objects, arrays, for-in ----

#[test]
fn object_properties_via_constructor() {
    assert_eq!(
        run_str("function O() {} var o = new O(); o.a = 3; o[\"b\"] = 4; o.a + o.b"),
        "7"
    );
}

#[test]
fn reading_a_missing_property_yields_undefined() {
    assert_eq!(
        run_str("function O() {} var o = new O(); var u; o.missing == u"),
        "true"
    );
}

#[test]
fn member_access_on_a_non_object_is_a_type_error() {
    let err = run("var x = 3; x.y").unwrap_err();
    assert!(matches!(err, ScriptError::Type(_)));
}

#[test]
fn delete_removes_properties_and_variables() {
    assert_eq!(
        run_str("function O() {} var o = new O(); o.a = 1; delete o.a; var u; o.a == u"),
        "true"
    );
    assert!(run("var x = 1; delete x; x").is_err());
}

#[test]
fn for_in_iterates_in_insertion_order() {
    assert_eq!(
        run_str(
            "function O() {} var o = new O(); o.z = 1; o.a = 2; o.m = 3;
             var names = \"\";
             for (var k in o) { names = names + k; }
             names"
        ),
        "zam"
    );
}

#[test]
fn for_in_rebinding_the_loop_variable_does_not_perturb_iteration() {
    assert_eq!(
        run_str(
            "function O() {} var o = new O(); o.a = 1; o.b = 2; o.c = 3;
             var n = 0;
             for (var k in o) { k = \"changed\"; n++; }
             n"
        ),
        "3"
    );
}

#[test]
fn array_length_tracks_elements() {
    assert_eq!(
        run_str("var a = new Array(); a[0] = 10; a[1] = 20; a.length"),
        "2"
    );
    assert_eq!(
        run_str("var a = new Array(); a[0] = 1; a[1] = 2; delete a[1]; a.length"),
        "1"
    );
    // Non-numeric names are not elements.
    assert_eq!(
        run_str("var a = new Array(); a[0] = 1; a.color = \"red\"; a.length"),
        "1"
    );
}

#[test]
fn array_length_is_read_only() {
    assert!(run("var a = new Array(); a.length = 5;").is_err());
}

#[test]
fn for_in_over_an_array_skips_length() {
    assert_eq!(
        run_str(
            "var a = new Array(); a[0] = 1; a[1] = 2;
             var names = \"\";
             for (var k in a) { names = names + k; }
             names"
        ),
        "01"
    );
}

// ---- functions ----

#[test]
fn functions_declare_call_and_return() {
    assert_eq!(run_str("function double(n) { return n * 2; } double(21)"), "42");
    assert_eq!(run_str("function nothing() {} var u; nothing() == u"), "true");
}

#[test]
fn missing_actuals_are_undefined() {
    assert_eq!(run_str("function f(a, b) { var u; return b == u; } f(1)"), "true");
}

#[test]
fn arguments_object() {
    assert_eq!(run_str("function f(a) { return arguments.length; } f(1, 2, 3)"), "3");
    assert_eq!(run_str("function f() { return arguments[1]; } f(10, 20)"), "20");
    assert_eq!(run_str("function f() { return arguments.callee == f; } f()"), "true");
}

#[test]
fn arguments_are_deep_copied() {
    assert_eq!(
        run_str(
            "function O() {} var o = new O(); o.x = 1;
             function mutate(p) { p.x = 99; }
             mutate(o);
             o.x"
        ),
        "1"
    );
}

#[test]
fn functions_are_visible_from_other_call_frames() {
    // Declarations bind globally, so one function can call another even
    // though resolution inside a call checks only its own frame and the
    // global frame.
    assert_eq!(
        run_str("function seven() { return 7; } function six() { return seven() - 1; } six()"),
        "6"
    );
}

#[test]
fn recursion_works() {
    assert_eq!(
        run_str("function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); } fact(6)"),
        "720"
    );
}

#[test]
fn runaway_recursion_is_a_resource_error() {
    let err = run("function f() { return f(); } f()").unwrap_err();
    assert!(matches!(err, ScriptError::Resource(_)));
}

#[test]
fn locals_do_not_leak_out_of_calls() {
    assert!(run("function f() { var secret = 1; } f(); secret").is_err());
}

#[test]
fn local_shadows_global() {
    assert_eq!(
        run_str("var x = 1; function f() { var x = 99; return x; } f() + x"),
        "100"
    );
}

#[test]
fn bare_assignment_in_a_function_binds_globally() {
    // Observed binding rule: an undeclared name assigned without `var`
    // lands in the global frame, not the local one.
    assert_eq!(run_str("function f() { leaked = 5; } f(); leaked"), "5");
}

#[test]
fn anonymous_function_values() {
    assert_eq!(run_str("var f = function (n) { return n + 1; }; f(41)"), "42");
}

#[test]
fn new_binds_this_and_returns_the_object() {
    assert_eq!(
        run_str(
            "function Point(x, y) { this.x = x; this.y = y; return 12345; }
             var p = new Point(3, 4);
             p.x + p.y"
        ),
        "7"
    );
}

#[test]
fn function_body_is_validated_at_declaration() {
    // The body never runs, but its syntax error is caught immediately.
    assert!(run("function broken() { var = ; }").is_err());
}

#[test]
fn object_coercion_uses_to_string_override() {
    assert_eq!(
        run_str(
            "function O() {} var o = new O();
             o.toString = function () { return \"custom\"; };
             \"\" + o"
        ),
        "custom"
    );
}

#[test]
fn bare_objects_compare_by_identity() {
    assert_eq!(
        run_str("function O() {} var a = new O(); var b = new O(); a == b"),
        "false"
    );
    assert_eq!(
        run_str("function O() {} var a = new O(); var b = a; a != b"),
        "false"
    );
}

#[test]
fn non_ascii_script_text() {
    assert_eq!(run_str("\"héllo\""), "héllo");
    // A stray non-ASCII character is a clean lexical error.
    assert!(run("var x = ¢;").is_err());
}

// ---- self-references and master bindings ----

#[test]
fn global_self_reference_reaches_the_global_frame() {
    assert_eq!(run_str("global.counter = 7; counter"), "7");
    assert_eq!(run_str("this.x = 3; x"), "3");
}

#[test]
fn master_bindings_are_read_only() {
    assert!(run("print = 5").is_err());
}

// ---- builtins ----

#[test]
fn builtin_assert() {
    assert!(run("assert(1 == 1)").is_ok());
    assert!(run("assert(0)").is_err());
}

#[test]
fn builtin_eval_reenters_the_evaluator() {
    assert_eq!(run_str("eval(\"1 + 2\") + 1"), "4");
    assert_eq!(run_str("var x = 10; eval(\"x + 1\")"), "11");
}

// ---- engine surface ----

#[test]
fn instances_are_independent() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let a = engine.open_instance(None, None).unwrap();
    let b = engine.open_instance(None, None).unwrap();
    engine.eval(a, "var x = 1;").unwrap();
    assert!(engine.eval(b, "x").is_err());
    engine.close_instance(a).unwrap();
    engine.close_instance(b).unwrap();
}

#[test]
fn closed_instances_reject_evaluation() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine.close_instance(id).unwrap();
    assert!(engine.eval(id, "1").is_err());
    assert!(engine.close_instance(id).is_err());
}

#[test]
fn values_native_with_registration_data() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    engine
        .define_master_native(
            "base",
            NativeFunction::values("base", |call, _args| {
                let base = call
                    .data
                    .as_ref()
                    .and_then(|d| d.downcast_ref::<i32>())
                    .copied()
                    .unwrap_or(0);
                Ok(Value::Int(base))
            })
            .with_data(Rc::new(40i32)),
        )
        .unwrap();
    let id = engine.open_instance(None, None).unwrap();
    let v = engine.eval(id, "base() + 2").unwrap();
    assert_eq!(v.coerced_string(), "42");
}

#[test]
fn strings_native_receives_coerced_arguments() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    engine
        .define_master_native(
            "collect",
            NativeFunction::strings("collect", move |_call, args| {
                sink.borrow_mut().extend(args.iter().cloned());
                Ok(Value::Undefined)
            }),
        )
        .unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine.eval(id, "collect(1, \"two\", 1 == 1)").unwrap();
    assert_eq!(*seen.borrow(), vec!["1", "two", "true"]);
}

#[test]
fn natives_receive_the_selected_host_handle() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    engine
        .define_master_native(
            "primary",
            NativeFunction::values("primary", |call, _| {
                let h = call
                    .handle
                    .as_ref()
                    .and_then(|h| h.downcast_ref::<String>())
                    .cloned()
                    .unwrap_or_default();
                Ok(Value::string(h))
            }),
        )
        .unwrap();
    engine
        .define_master_native(
            "alternate",
            NativeFunction::values("alternate", |call, _| {
                let h = call
                    .handle
                    .as_ref()
                    .and_then(|h| h.downcast_ref::<String>())
                    .cloned()
                    .unwrap_or_default();
                Ok(Value::string(h))
            })
            .with_alternate_handle(),
        )
        .unwrap();
    let id = engine
        .open_instance(
            Some(Rc::new("first".to_string())),
            Some(Rc::new("second".to_string())),
        )
        .unwrap();
    assert_eq!(engine.eval(id, "primary()").unwrap().coerced_string(), "first");
    assert_eq!(
        engine.eval(id, "alternate()").unwrap().coerced_string(),
        "second"
    );
}

#[test]
fn exit_status_truncates_evaluation() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    engine
        .define_master_native(
            "quit",
            NativeFunction::values("quit", |call, _| {
                call.interp.set_exit_status(0);
                Ok(Value::Undefined)
            }),
        )
        .unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine.eval(id, "var x = 1; quit(); x = 99;").unwrap();
    let instance = engine.instance_mut(id).unwrap();
    assert_eq!(instance.exit_status(), Some(0));
    let x = instance.get_var("x").unwrap().unwrap();
    assert_eq!(x.coerced_string(), "1");
}

#[test]
fn variable_access_by_path() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine
        .eval(id, "function O() {} var cfg = new O(); cfg.port = 8080;")
        .unwrap();
    let instance = engine.instance_mut(id).unwrap();
    let port = instance.get_var("cfg.port").unwrap().unwrap();
    assert_eq!(port.coerced_string(), "8080");

    instance
        .set_var("cfg.host", Value::string("localhost"))
        .unwrap();
    // Intermediate objects are created on demand.
    instance.set_var("net.tcp.port", Value::Int(80)).unwrap();
    instance.delete_var("cfg.port").unwrap();
    assert!(instance.get_var("cfg.port").unwrap().is_none());
    drop(instance);
    assert_eq!(engine.eval(id, "cfg.host").unwrap().coerced_string(), "localhost");
    assert_eq!(
        engine.eval(id, "net.tcp.port").unwrap().coerced_string(),
        "80"
    );
}

#[test]
fn set_var_writes_to_the_top_frame() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    let instance = engine.instance_mut(id).unwrap();
    // `print` exists read-only in the global frame; the write shadows it on
    // the top frame instead of failing.
    instance.set_var("print", Value::Int(1)).unwrap();
    drop(instance);
    assert_eq!(engine.eval(id, "print").unwrap().coerced_string(), "1");
}

#[test]
fn master_natives_bind_at_dotted_paths() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    engine
        .define_master_native(
            "sys.version",
            NativeFunction::values("version", |_c, _a| Ok(Value::Int(3))),
        )
        .unwrap();
    let id = engine.open_instance(None, None).unwrap();
    assert_eq!(
        engine.eval(id, "sys.version()").unwrap().coerced_string(),
        "3"
    );
}

#[test]
fn bracketed_paths() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine.eval(id, "var a = new Array(); a[0] = 7;").unwrap();
    let instance = engine.instance_mut(id).unwrap();
    let v = instance.get_var("a[0]").unwrap().unwrap();
    assert_eq!(v.coerced_string(), "7");
}

#[test]
fn host_defined_script_functions() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    engine
        .instance_mut(id)
        .unwrap()
        .define_function("triple", vec!["n".to_string()], "return n * 3;")
        .unwrap();
    assert_eq!(engine.eval(id, "triple(14)").unwrap().coerced_string(), "42");
    // Bodies are syntax-checked at registration.
    assert!(engine
        .instance_mut(id)
        .unwrap()
        .define_function("bad", vec![], "var = ;")
        .is_err());
}

#[test]
fn last_error_and_line_number() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    assert!(engine.eval(id, "var x = 1;\nvar y = ;").is_err());
    let instance = engine.instance(id).unwrap();
    let message = instance.last_error().unwrap();
    assert!(message.contains("syntax"), "unexpected message: {}", message);
    assert_eq!(instance.line_number(), 2);

    // A successful evaluation clears the error.
    engine.eval(id, "1").unwrap();
    assert!(engine.instance(id).unwrap().last_error().is_none());
}

#[test]
fn eval_file_runs_a_script_from_disk() {
    let path = std::env::temp_dir().join("emjs_eval_file_test.js");
    std::fs::write(&path, "var x = 6; x * 7").unwrap();
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let id = engine.open_instance(None, None).unwrap();
    let v = engine.eval_file(id, path.to_str().unwrap()).unwrap();
    assert_eq!(v.coerced_string(), "42");
    let _ = std::fs::remove_file(&path);

    assert!(engine.eval_file(id, "/nonexistent/script.js").is_err());
}

#[test]
fn master_natives_registered_later_are_invisible_to_open_instances() {
    let mut engine = Engine::open(EngineOptions::default()).unwrap();
    let early = engine.open_instance(None, None).unwrap();
    engine
        .define_master_native(
            "late",
            NativeFunction::values("late", |_c, _a| Ok(Value::Int(1))),
        )
        .unwrap();
    let fresh = engine.open_instance(None, None).unwrap();
    assert!(engine.eval(early, "late()").is_err());
    assert!(engine.eval(fresh, "late()").is_ok());
}

struct CountingLock {
    calls: Cell<usize>,
}

impl HostLock for CountingLock {
    fn lock(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn unlock(&self) {}
}

#[test]
fn injected_lock_guards_shared_state() {
    let lock = Rc::new(CountingLock { calls: Cell::new(0) });
    let mut engine = Engine::open(EngineOptions {
        lock: Some(lock.clone()),
    })
    .unwrap();
    let after_open = lock.calls.get();
    assert!(after_open > 0, "builtin registration should take the lock");

    let id = engine.open_instance(None, None).unwrap();
    assert!(lock.calls.get() > after_open);
    engine.close_instance(id).unwrap();
}
