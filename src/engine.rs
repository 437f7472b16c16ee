//! Engine and instance registry.
//!
//! An [`Engine`] owns the master object (bindings shared by every instance)
//! and the instance table. Each [`Instance`] has its own frame stack, error
//! state and host handles, and is single-threaded; the only shared state is
//! the master object and the table itself, guarded by the host's injected
//! [`HostLock`] when one is supplied.

use std::any::Any;
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::error::{ScriptError, ScriptResult};
use crate::eval;
use crate::object::{Object, PropFlags};
use crate::scope::FrameStack;
use crate::value::{Function, NativeFunction, Value};

/// Mutual-exclusion strategy injected by the host, invoked around master
/// object and instance-table access.
pub trait HostLock {
    fn lock(&self);
    fn unlock(&self);
}

/// Engine construction options.
#[derive(Default)]
pub struct EngineOptions {
    /// Optional lock/unlock pair guarding shared engine state.
    pub lock: Option<Rc<dyn HostLock>>,
}

/// Which opaque host handle a native-function call receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Primary,
    Alternate,
}

/// Identifier of an open instance. Using a stale id is a caller contract
/// violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceId(usize);

/// Context handed to a native function.
pub struct NativeCall<'a> {
    /// The calling instance; natives may evaluate scripts or touch variables
    /// through it.
    pub interp: &'a mut Instance,
    /// Opaque data attached at registration.
    pub data: Option<Rc<dyn Any>>,
    /// The host handle selected by the registration's [`HandleKind`].
    pub handle: Option<Rc<dyn Any>>,
}

/// One script execution context.
pub struct Instance {
    pub(crate) frames: FrameStack,
    pub(crate) result: Value,
    pub(crate) depth: usize,
    pub(crate) line: usize,
    last_error: Option<String>,
    exit_status: Option<i32>,
    handles: [Option<Rc<dyn Any>>; 2],
}

impl Instance {
    fn new(primary: Option<Rc<dyn Any>>, alternate: Option<Rc<dyn Any>>) -> Self {
        Instance {
            frames: FrameStack::new(),
            result: Value::Undefined,
            depth: 0,
            line: 0,
            last_error: None,
            exit_status: None,
            handles: [primary, alternate],
        }
    }

    /// Evaluate a script to end of input or error. The result value is the
    /// last statement's value; errors are recorded as the last-error string.
    pub fn eval(&mut self, script: &str) -> ScriptResult<Value> {
        match eval::run(self, script) {
            Ok(v) => {
                self.last_error = None;
                Ok(v)
            }
            Err(err) => {
                log::debug!("script error: {}", err);
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Host handle routed to natives registered with `kind`.
    pub fn handle(&self, kind: HandleKind) -> Option<Rc<dyn Any>> {
        match kind {
            HandleKind::Primary => self.handles[0].clone(),
            HandleKind::Alternate => self.handles[1].clone(),
        }
    }

    /// Message of the most recent evaluation error, if the last evaluation
    /// failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Line most recently reached by the evaluator.
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Request early truncation; observed after each completed function
    /// call.
    pub fn set_exit_status(&mut self, status: i32) {
        self.exit_status = Some(status);
    }

    /// The requested exit status, if any.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Read a variable by dotted/bracketed path (`a.b[0]`). `None` when any
    /// path step is missing or not an object.
    pub fn get_var(&mut self, path: &str) -> ScriptResult<Option<Value>> {
        let segments = parse_path(path)?;
        let (first, rest) = segments.split_first().expect("parse_path yields a segment");
        let Some(frame) = self.frames.find(first) else {
            return Ok(None);
        };
        let mut value = match frame.borrow_mut().get(first)? {
            Some(v) => v,
            None => return Ok(None),
        };
        for seg in rest {
            let Some(obj) = value.as_object() else {
                return Ok(None);
            };
            value = match obj.borrow_mut().get(seg)? {
                Some(v) => v,
                None => return Ok(None),
            };
        }
        Ok(Some(value))
    }

    /// Write a variable by path. The root always binds on the top-most
    /// frame, shadowing any outer binding of the same name; missing
    /// intermediate objects are created.
    pub fn set_var(&mut self, path: &str, value: Value) -> ScriptResult<()> {
        let segments = parse_path(path)?;
        let (first, rest) = segments.split_first().expect("parse_path yields a segment");
        let frame = self.frames.local();
        if rest.is_empty() {
            let result = frame.borrow_mut().set_or_create(first.clone(), value);
            return result;
        }
        let existing = frame.borrow_mut().get(first)?.and_then(|v| v.as_object());
        let mut obj = match existing {
            Some(obj) => obj,
            None => {
                let fresh = Rc::new(RefCell::new(Object::new()));
                frame
                    .borrow_mut()
                    .set_or_create(first.clone(), Value::Object(fresh.clone()))?;
                fresh
            }
        };
        let (last, mids) = rest.split_last().expect("rest is non-empty");
        for seg in mids {
            let existing = obj.borrow_mut().get(seg)?.and_then(|v| v.as_object());
            let next = match existing {
                Some(next) => next,
                None => {
                    let fresh = Rc::new(RefCell::new(Object::new()));
                    obj.borrow_mut()
                        .set_or_create(seg.clone(), Value::Object(fresh.clone()))?;
                    fresh
                }
            };
            obj = next;
        }
        let result = obj.borrow_mut().set_or_create(last.clone(), value);
        result
    }

    /// Delete a variable or property by path.
    pub fn delete_var(&mut self, path: &str) -> ScriptResult<()> {
        let segments = parse_path(path)?;
        let (first, rest) = segments.split_first().expect("parse_path yields a segment");
        let Some(frame) = self.frames.find(first) else {
            return Err(ScriptError::reference(format!("'{}' is undefined", first)));
        };
        if rest.is_empty() {
            return frame.borrow_mut().delete(first);
        }
        let mut value = frame
            .borrow_mut()
            .get(first)?
            .ok_or_else(|| ScriptError::reference(format!("'{}' is undefined", first)))?;
        let (last, mids) = rest.split_last().expect("rest is non-empty");
        for seg in mids {
            let obj = value
                .as_object()
                .ok_or_else(|| ScriptError::type_error(format!("'{}' is not an object", seg)))?;
            let next = obj.borrow_mut().get(seg)?;
            value = next
                .ok_or_else(|| ScriptError::reference(format!("'{}' is undefined", seg)))?;
        }
        let obj = value
            .as_object()
            .ok_or_else(|| ScriptError::type_error(format!("'{}' is not an object", last)))?;
        let result = obj.borrow_mut().delete(last);
        result
    }

    /// Bind a script-defined function, as if a `function` declaration had
    /// been parsed: on the global frame, body syntax-checked.
    pub fn define_function(
        &mut self,
        name: &str,
        params: Vec<String>,
        body: &str,
    ) -> ScriptResult<()> {
        eval::check(self, body)?;
        let func = Function::new(name, params, body.to_string());
        self.frames
            .global()
            .borrow_mut()
            .set_or_create(name, Value::Function(Rc::new(func)))
    }

    /// Register a native function at a possibly dotted path in this
    /// instance's global frame.
    pub fn define_native(&mut self, path: &str, native: NativeFunction) -> ScriptResult<()> {
        log::trace!("registering native '{}'", path);
        bind_at_path(&self.frames.global(), path, Value::Native(Rc::new(native)))
    }
}

/// The engine: master object plus instance table.
pub struct Engine {
    master: Rc<RefCell<Object>>,
    instances: Vec<Option<Instance>>,
    lock: Option<Rc<dyn HostLock>>,
}

struct LockGuard(Option<Rc<dyn HostLock>>);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(lock) = &self.0 {
            lock.unlock();
        }
    }
}

impl Engine {
    /// Open an engine. The standard natives are installed into the master
    /// object, so every instance sees them.
    pub fn open(options: EngineOptions) -> ScriptResult<Engine> {
        let mut engine = Engine {
            master: Rc::new(RefCell::new(Object::new())),
            instances: Vec::new(),
            lock: options.lock,
        };
        crate::builtin::install(&mut engine)?;
        log::debug!("engine opened");
        Ok(engine)
    }

    fn hold_lock(&self) -> LockGuard {
        match &self.lock {
            Some(lock) => {
                lock.lock();
                LockGuard(Some(lock.clone()))
            }
            None => LockGuard(None),
        }
    }

    /// Register a native function on the master object, visible to every
    /// instance opened afterwards.
    pub fn define_master_native(
        &mut self,
        path: &str,
        native: NativeFunction,
    ) -> ScriptResult<()> {
        let _guard = self.hold_lock();
        log::trace!("registering master native '{}'", path);
        bind_at_path(&self.master, path, Value::Native(Rc::new(native)))
    }

    /// Open an instance with up to two opaque host handles. Master bindings
    /// are cloned by reference into its global frame, read-only.
    pub fn open_instance(
        &mut self,
        primary: Option<Rc<dyn Any>>,
        alternate: Option<Rc<dyn Any>>,
    ) -> ScriptResult<InstanceId> {
        let _guard = self.hold_lock();
        let instance = {
            let mut instance = Instance::new(primary, alternate);
            let global = instance.frames.global();
            {
                let master = self.master.borrow();
                let mut frame = global.borrow_mut();
                for (name, value, flags) in master.entries() {
                    frame.create_with_flags(name, value, flags | PropFlags::READ_ONLY)?;
                }
            }
            // Self-references so scripts can reach their own frames.
            let hidden = PropFlags::READ_ONLY | PropFlags::DONT_ENUM;
            global
                .borrow_mut()
                .create_with_flags("global", Value::Object(global.clone()), hidden)?;
            global
                .borrow_mut()
                .create_with_flags("this", Value::Object(global.clone()), hidden)?;
            let local = instance.frames.local();
            local
                .borrow_mut()
                .create_with_flags("local", Value::Object(local.clone()), hidden)?;
            instance
        };
        let id = match self.instances.iter().position(Option::is_none) {
            Some(slot) => {
                self.instances[slot] = Some(instance);
                InstanceId(slot)
            }
            None => {
                self.instances.push(Some(instance));
                InstanceId(self.instances.len() - 1)
            }
        };
        log::debug!("instance {:?} opened", id);
        Ok(id)
    }

    /// Close an instance, breaking its frame self-reference cycles.
    pub fn close_instance(&mut self, id: InstanceId) -> ScriptResult<()> {
        let _guard = self.hold_lock();
        let slot = self
            .instances
            .get_mut(id.0)
            .ok_or_else(|| ScriptError::internal("invalid instance id"))?;
        let mut instance = slot
            .take()
            .ok_or_else(|| ScriptError::internal("instance already closed"))?;
        instance.frames.clear_all();
        log::debug!("instance {:?} closed", id);
        Ok(())
    }

    /// Shared access to an open instance.
    pub fn instance(&self, id: InstanceId) -> ScriptResult<&Instance> {
        debug_assert!(id.0 < self.instances.len(), "invalid instance id");
        self.instances
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| ScriptError::internal("invalid instance id"))
    }

    /// Exclusive access to an open instance.
    pub fn instance_mut(&mut self, id: InstanceId) -> ScriptResult<&mut Instance> {
        debug_assert!(id.0 < self.instances.len(), "invalid instance id");
        self.instances
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| ScriptError::internal("invalid instance id"))
    }

    /// Evaluate a script on an instance.
    pub fn eval(&mut self, id: InstanceId, script: &str) -> ScriptResult<Value> {
        self.instance_mut(id)?.eval(script)
    }

    /// Evaluate the contents of a file on an instance.
    pub fn eval_file(&mut self, id: InstanceId, path: &str) -> ScriptResult<Value> {
        let script = fs::read_to_string(path)
            .map_err(|e| ScriptError::internal(format!("cannot read '{}': {}", path, e)))?;
        self.eval(id, &script)
    }
}

/// Split `a.b[0]['key']` into path segments.
fn parse_path(path: &str) -> ScriptResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if current.is_empty() {
                    return Err(ScriptError::internal(format!("bad path '{}'", path)));
                }
                segments.push(std::mem::take(&mut current));
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(ScriptError::internal(format!("bad path '{}'", path)));
                }
                let inner = inner.trim();
                let inner = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                    .unwrap_or(inner);
                segments.push(inner.to_string());
                // A '.' right after ']' separates the next segment.
                if chars.peek() == Some(&'.') {
                    chars.next();
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    if segments.is_empty() {
        return Err(ScriptError::internal(format!("bad path '{}'", path)));
    }
    Ok(segments)
}

/// Create `value` at a dotted path rooted in `root`, building intermediate
/// objects as needed.
fn bind_at_path(
    root: &Rc<RefCell<Object>>,
    path: &str,
    value: Value,
) -> ScriptResult<()> {
    let segments = parse_path(path)?;
    let (last, mids) = segments.split_last().expect("parse_path yields a segment");
    let mut obj = root.clone();
    for seg in mids {
        let existing = obj.borrow_mut().get(seg)?.and_then(|v| v.as_object());
        let next = match existing {
            Some(next) => next,
            None => {
                let fresh = Rc::new(RefCell::new(Object::new()));
                obj.borrow_mut()
                    .set_or_create(seg.clone(), Value::Object(fresh.clone()))?;
                fresh
            }
        };
        obj = next;
    }
    let result = obj.borrow_mut().set_or_create(last.clone(), value);
    result
}
