use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Factory – type tag → constructor registry
// ---------------------------------------------------------------------------

/// Builds an element from its configuration (the descriptor with the `type`
/// key already removed).
pub type Constructor<T> = fn(&Value) -> Result<Box<T>>;

/// Registry resolving configuration descriptors into elements of one
/// category.
///
/// A descriptor is a JSON object whose `type` entry names a registered
/// constructor; the remaining entries are the constructor's parameters:
///
/// ```json
/// { "type": "lambertian", "reflectance": 0.3 }
/// ```
pub struct Factory<T: ?Sized + 'static> {
    name: &'static str,
    constructors: RwLock<BTreeMap<String, Constructor<T>>>,
    aliases: RwLock<BTreeMap<String, String>>,
}

impl<T: ?Sized + 'static> Factory<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            constructors: RwLock::new(BTreeMap::new()),
            aliases: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a constructor under `type_id`. Fails if the tag is taken.
    pub fn register(&self, type_id: &str, ctor: Constructor<T>) -> Result<()> {
        let is_alias = self.is_alias(type_id);
        let mut constructors = self
            .constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if is_alias || constructors.contains_key(type_id) {
            return Err(Error::Config(format!(
                "{} factory: type '{type_id}' is already registered",
                self.name
            )));
        }
        log::debug!("{} factory: registered '{type_id}'", self.name);
        constructors.insert(type_id.to_string(), ctor);
        Ok(())
    }

    /// Make `alias` resolve to the already registered `type_id`.
    pub fn register_alias(&self, alias: &str, type_id: &str) -> Result<()> {
        if !self.contains(type_id) {
            return Err(Error::UnknownType {
                factory: self.name.to_string(),
                type_id: type_id.to_string(),
            });
        }
        if self.contains(alias) {
            return Err(Error::Config(format!(
                "{} factory: alias '{alias}' is already registered",
                self.name
            )));
        }
        self.aliases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias.to_string(), type_id.to_string());
        Ok(())
    }

    fn is_alias(&self, type_id: &str) -> bool {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_id)
    }

    /// Canonical tag for `type_id` (aliases resolved).
    pub fn resolve(&self, type_id: &str) -> Option<String> {
        let aliases = self.aliases.read().unwrap_or_else(PoisonError::into_inner);
        let canonical = aliases.get(type_id).map(String::as_str).unwrap_or(type_id);
        let constructors = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        constructors
            .contains_key(canonical)
            .then(|| canonical.to_string())
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.resolve(type_id).is_some()
    }

    /// Canonical registered tags, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Registered `(alias, canonical tag)` pairs.
    pub fn aliases(&self) -> Vec<(String, String)> {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(a, t)| (a.clone(), t.clone()))
            .collect()
    }

    /// Build an element from a descriptor object carrying a `type` entry.
    pub fn create(&self, config: &Value) -> Result<Box<T>> {
        let obj = config.as_object().ok_or_else(|| {
            Error::Config(format!(
                "{} factory: expected a configuration object, got {config}",
                self.name
            ))
        })?;
        let type_id = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
            Error::Config(format!("{} factory: missing 'type' entry", self.name))
        })?;
        let canonical = self.resolve(type_id).ok_or_else(|| Error::UnknownType {
            factory: self.name.to_string(),
            type_id: type_id.to_string(),
        })?;
        let ctor = {
            let constructors = self
                .constructors
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            constructors.get(&canonical).copied()
        }
        .ok_or_else(|| Error::UnknownType {
            factory: self.name.to_string(),
            type_id: type_id.to_string(),
        })?;

        let params: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "factory")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        log::debug!("{} factory: creating '{canonical}'", self.name);
        ctor(&Value::Object(params))
    }
}

/// Attach a `type` tag to a serialized configuration object.
pub fn tagged(type_id: &str, config: Value) -> Result<Value> {
    match config {
        Value::Object(mut obj) => {
            obj.insert("type".to_string(), Value::from(type_id));
            Ok(Value::Object(obj))
        }
        other => Err(Error::Config(format!(
            "cannot tag non-object configuration {other}"
        ))),
    }
}
