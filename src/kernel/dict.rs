use serde_json::{Map, Value};

use crate::error::Result;
use crate::mode::Mode;
use crate::scenes::core::{KernelDictContext, SceneElement};

// ---------------------------------------------------------------------------
// KernelDict – the scene description handed to the rendering kernel
// ---------------------------------------------------------------------------

/// A flat mapping from object identifiers to kernel plugin descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelDict {
    data: Map<String, Value>,
    /// Mode the dictionary was generated for, if known.
    pub variant: Option<Mode>,
}

impl KernelDict {
    pub fn new(variant: Mode) -> Self {
        Self {
            data: Map::new(),
            variant: Some(variant),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            data: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            variant: None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if self.data.contains_key(&key) {
            log::debug!("kernel dict: overwriting '{key}'");
        }
        self.data.insert(key, value);
    }

    /// Merge the kernel dictionary of `element`.
    pub fn add(&mut self, element: &dyn SceneElement, ctx: &KernelDictContext) -> Result<()> {
        let other = element.kernel_dict(ctx)?;
        self.merge(other);
        Ok(())
    }

    /// Merge the kernel dictionary of `element` if `condition` holds.
    pub fn add_if(
        &mut self,
        condition: bool,
        element: &dyn SceneElement,
        ctx: &KernelDictContext,
    ) -> Result<()> {
        if condition {
            self.add(element, ctx)?;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: KernelDict) {
        for (k, v) in other.data {
            self.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the single value held by the dictionary, if there is exactly
    /// one.
    pub fn only_value(&self) -> Option<&Value> {
        let mut values = self.data.values();
        match (values.next(), values.next()) {
            (Some(v), None) => Some(v),
            _ => None,
        }
    }

    /// The complete scene description: all entries plus `"type": "scene"`.
    pub fn to_value(&self) -> Value {
        let mut scene = Map::new();
        scene.insert("type".into(), Value::from("scene"));
        for (k, v) in &self.data {
            scene.insert(k.clone(), v.clone());
        }
        Value::Object(scene)
    }
}

/// Reference to another kernel object by identifier.
pub fn ref_value(id: &str) -> Value {
    serde_json::json!({ "type": "ref", "id": id })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_and_scene_value() {
        let mut a = KernelDict::new(Mode::Mono);
        a.insert("x", json!({"type": "rectangle"}));
        let b = KernelDict::from_pairs([("y", json!({"type": "cube"}))]);
        a.merge(b);
        assert_eq!(a.len(), 2);

        let scene = a.to_value();
        assert_eq!(scene["type"], "scene");
        assert_eq!(scene["y"]["type"], "cube");
    }

    #[test]
    fn only_value_requires_single_entry() {
        let mut d = KernelDict::empty();
        assert!(d.only_value().is_none());
        d.insert("a", json!(1));
        assert_eq!(d.only_value(), Some(&json!(1)));
        d.insert("b", json!(2));
        assert!(d.only_value().is_none());
    }
}
