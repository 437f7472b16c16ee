//! Script objects.
//!
//! An object is an insertion-ordered list of named properties. Lookup is
//! linear; tables stay small and enumeration order must match creation
//! order. Scope frames are plain objects too.

use std::rc::Rc;

use bitflags::bitflags;

use crate::error::{ScriptError, ScriptResult};
use crate::value::Value;

bitflags! {
    /// Per-property attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropFlags: u8 {
        /// Writes and deletes are rejected.
        const READ_ONLY = 0b01;
        /// Hidden from enumeration (`for-in`, deep copies).
        const DONT_ENUM = 0b10;
    }
}

/// Property access that fired a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Read,
    Write,
    Create,
    Delete,
}

/// Per-property access callback. A `Read` trigger may override the produced
/// value by returning `Some`.
pub type Trigger =
    Rc<dyn Fn(TriggerEvent, &mut Object, &str, Option<&Value>) -> ScriptResult<Option<Value>>>;

/// Enumeration filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropCategory {
    /// Everything enumerable.
    Any,
    /// Non-function values.
    Data,
    /// Function and native values.
    Functions,
}

struct Property {
    name: String,
    value: Value,
    flags: PropFlags,
    trigger: Option<Trigger>,
}

impl Property {
    fn in_category(&self, category: PropCategory) -> bool {
        let is_function = matches!(self.value, Value::Function(_) | Value::Native(_));
        match category {
            PropCategory::Any => true,
            PropCategory::Data => !is_function,
            PropCategory::Functions => is_function,
        }
    }
}

/// A script object: ordered named properties.
#[derive(Default)]
pub struct Object {
    props: Vec<Property>,
}

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Object { props: Vec::new() }
    }

    /// Create an array-flavoured object. `length` is synthetic: read-only,
    /// hidden from enumeration, and recomputed on read by counting the
    /// numeric-named data properties.
    pub fn array() -> Self {
        let mut obj = Object::new();
        obj.props.push(Property {
            name: "length".to_string(),
            value: Value::Int(0),
            flags: PropFlags::READ_ONLY | PropFlags::DONT_ENUM,
            trigger: Some(Rc::new(|event, obj, _name, _value| {
                if event == TriggerEvent::Read {
                    Ok(Some(Value::Int(obj.element_count() as i32)))
                } else {
                    Ok(None)
                }
            })),
        });
        obj
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.props.iter().position(|p| p.name == name)
    }

    /// Number of properties, hidden ones included.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// True when the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// True when the property exists. Fires no triggers.
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Count of numeric-named data properties, i.e. array elements.
    pub fn element_count(&self) -> usize {
        self.props
            .iter()
            .filter(|p| p.name.parse::<usize>().is_ok() && p.in_category(PropCategory::Data))
            .count()
    }

    /// Create a property. An existing property of the same name is replaced;
    /// its trigger, if any, sees a `Create` event and survives.
    pub fn create<S: Into<String>>(&mut self, name: S, value: Value) -> ScriptResult<()> {
        self.create_with_flags(name, value, PropFlags::empty())
    }

    /// Create a property with attribute flags.
    pub fn create_with_flags<S: Into<String>>(
        &mut self,
        name: S,
        value: Value,
        flags: PropFlags,
    ) -> ScriptResult<()> {
        let name = name.into();
        if let Some(i) = self.find(&name) {
            if let Some(trigger) = self.props[i].trigger.clone() {
                trigger(TriggerEvent::Create, self, &name, Some(&value))?;
            }
            let i = self.find(&name).ok_or_else(|| {
                ScriptError::internal("property removed by its own trigger")
            })?;
            self.props[i].value = value;
            self.props[i].flags = flags;
        } else {
            self.props.push(Property {
                name,
                value,
                flags,
                trigger: None,
            });
        }
        Ok(())
    }

    /// Read a property. `None` when it does not exist. A read trigger may
    /// substitute the produced value.
    pub fn get(&mut self, name: &str) -> ScriptResult<Option<Value>> {
        let trigger = self
            .find(name)
            .and_then(|i| self.props[i].trigger.clone());
        if let Some(trigger) = trigger {
            if let Some(v) = trigger(TriggerEvent::Read, self, name, None)? {
                return Ok(Some(v));
            }
        }
        Ok(self.find(name).map(|i| self.props[i].value.clone()))
    }

    /// Overwrite an existing property. Rejected for read-only properties.
    pub fn set(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        let Some(i) = self.find(name) else {
            return Err(ScriptError::reference(format!(
                "'{}' is not a property",
                name
            )));
        };
        if self.props[i].flags.contains(PropFlags::READ_ONLY) {
            return Err(ScriptError::type_error(format!(
                "'{}' is read-only",
                name
            )));
        }
        let stored = match self.props[i].trigger.clone() {
            Some(trigger) => {
                let replaced = trigger(TriggerEvent::Write, self, name, Some(&value))?;
                replaced.unwrap_or(value)
            }
            None => value,
        };
        let i = self
            .find(name)
            .ok_or_else(|| ScriptError::internal("property removed by its own trigger"))?;
        self.props[i].value = stored;
        Ok(())
    }

    /// Overwrite if present (read-only rejected), create otherwise.
    pub fn set_or_create<S: Into<String>>(&mut self, name: S, value: Value) -> ScriptResult<()> {
        let name = name.into();
        if self.has(&name) {
            self.set(&name, value)
        } else {
            self.create(name, value)
        }
    }

    /// Delete a property. Read-only properties may not be deleted.
    pub fn delete(&mut self, name: &str) -> ScriptResult<()> {
        let Some(i) = self.find(name) else {
            return Err(ScriptError::reference(format!(
                "'{}' is not a property",
                name
            )));
        };
        if self.props[i].flags.contains(PropFlags::READ_ONLY) {
            return Err(ScriptError::type_error(format!(
                "'{}' is read-only",
                name
            )));
        }
        if let Some(trigger) = self.props[i].trigger.clone() {
            trigger(TriggerEvent::Delete, self, name, None)?;
        }
        if let Some(i) = self.find(name) {
            self.props.remove(i);
        }
        Ok(())
    }

    /// Install an access trigger on an existing property.
    pub fn set_trigger(&mut self, name: &str, trigger: Trigger) -> ScriptResult<()> {
        let Some(i) = self.find(name) else {
            return Err(ScriptError::reference(format!(
                "'{}' is not a property",
                name
            )));
        };
        self.props[i].trigger = Some(trigger);
        Ok(())
    }

    /// First enumerable property name in `category`, insertion order.
    pub fn first_name(&self, category: PropCategory) -> Option<String> {
        self.names_from(0, category)
    }

    /// Enumerable property name following `prev`, insertion order.
    pub fn next_name(&self, prev: &str, category: PropCategory) -> Option<String> {
        let i = self.find(prev)?;
        self.names_from(i + 1, category)
    }

    fn names_from(&self, start: usize, category: PropCategory) -> Option<String> {
        self.props[start..]
            .iter()
            .find(|p| !p.flags.contains(PropFlags::DONT_ENUM) && p.in_category(category))
            .map(|p| p.name.clone())
    }

    /// All enumerable names in `category`, insertion order.
    pub fn names(&self, category: PropCategory) -> Vec<String> {
        self.props
            .iter()
            .filter(|p| !p.flags.contains(PropFlags::DONT_ENUM) && p.in_category(category))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Every property, hidden ones included, as (name, shallow value,
    /// flags). Fires no triggers.
    pub fn entries(&self) -> Vec<(String, Value, PropFlags)> {
        self.props
            .iter()
            .map(|p| (p.name.clone(), p.value.clone(), p.flags))
            .collect()
    }

    /// Attribute flags of a property.
    pub fn flags(&self, name: &str) -> Option<PropFlags> {
        self.find(name).map(|i| self.props[i].flags)
    }

    /// Recursive copy. Hidden properties are not carried over; triggers are
    /// shared with the source.
    pub fn deep_clone(&self) -> Object {
        Object {
            props: self
                .props
                .iter()
                .filter(|p| !p.flags.contains(PropFlags::DONT_ENUM))
                .map(|p| Property {
                    name: p.name.clone(),
                    value: p.value.deep_clone(),
                    flags: p.flags,
                    trigger: p.trigger.clone(),
                })
                .collect(),
        }
    }

    /// Drop every property. Used at instance teardown to break reference
    /// cycles between scope frames and their self-references.
    pub fn clear(&mut self) {
        self.props.clear();
    }
}
