// Copyright 2025 The Registry Cluster Operator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// A named output exposed by a tier to its dependents, e.g. the name of the
/// generated secret holding one consumer's connection string.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// Ordered collection of tier outputs, looked up by name.
///
/// `add` appends only when the name is absent; `set` overwrites the first
/// entry with that name or appends. Lookups return the first match, and a
/// missing name means "dependency not yet ready", so callers defer rather
/// than fail.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Append-if-absent. Returns false (and leaves the existing entry
    /// untouched) when a property with this name is already present.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.0.iter().any(|p| p.name == name) {
            return false;
        }
        self.0.push(Property {
            name,
            value: value.into(),
        });
        true
    }

    /// Upsert: overwrite the existing value for this name, or append.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Property { name, value }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_for_missing_name() {
        let props = Properties::new();
        assert!(props.get("registrySecret").is_none());
    }

    #[test]
    fn add_appends_only_when_absent() {
        let mut props = Properties::new();
        assert!(props.add("registrySecret", "registry-redis"));
        assert!(!props.add("registrySecret", "something-else"));
        assert_eq!(props.get("registrySecret"), Some("registry-redis"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut props = Properties::new();
        props.set("coreSecret", "core-database");
        props.set("coreSecret", "core-database-v2");
        assert_eq!(props.get("coreSecret"), Some("core-database-v2"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut props = Properties::new();
        props.set("a", "1");
        props.set("b", "2");
        props.set("c", "3");
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
