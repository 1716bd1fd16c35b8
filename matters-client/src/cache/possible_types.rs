//! Which concrete types satisfy each interface and union of the schema.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::json_ext::Value;

/// Supertype name to the names of its possible types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PossibleTypes {
    subtypes: HashMap<String, HashSet<String>>,
}

#[derive(Deserialize)]
struct Introspection {
    #[serde(rename = "__schema")]
    schema: Schema,
}

#[derive(Deserialize)]
struct Schema {
    types: Vec<IntrospectionType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionType {
    name: String,
    #[serde(default)]
    possible_types: Option<Vec<NamedType>>,
}

#[derive(Deserialize)]
struct NamedType {
    name: String,
}

impl PossibleTypes {
    /// Build from the result of an introspection query, either the bare
    /// `{"__schema": ...}` object or a full response with it under `data`.
    pub fn from_introspection(introspection: &Value) -> Result<Self, ConfigurationError> {
        let data = introspection
            .as_object()
            .and_then(|object| object.get("data"))
            .filter(|data| {
                data.as_object()
                    .is_some_and(|data| data.contains_key("__schema"))
            });
        let introspection = data.unwrap_or(introspection);
        let introspection: Introspection = serde_json_bytes::from_value(introspection.clone())
            .map_err(|error| ConfigurationError::InvalidIntrospection(error.to_string()))?;

        let subtypes = introspection
            .schema
            .types
            .into_iter()
            .filter_map(|supertype| {
                let possible_types = supertype.possible_types?;
                Some((
                    supertype.name,
                    possible_types.into_iter().map(|named| named.name).collect(),
                ))
            })
            .collect();
        Ok(Self { subtypes })
    }

    pub fn insert(&mut self, supertype: impl Into<String>, subtype: impl Into<String>) {
        self.subtypes
            .entry(supertype.into())
            .or_default()
            .insert(subtype.into());
    }

    pub fn is_empty(&self) -> bool {
        self.subtypes.is_empty()
    }

    /// True if an object of type `typename` matches a fragment on `type_condition`.
    ///
    /// Interfaces implementing other interfaces are followed.
    pub fn satisfies(&self, typename: &str, type_condition: &str) -> bool {
        let mut visited = HashSet::new();
        self.satisfies_inner(typename, type_condition, &mut visited)
    }

    fn satisfies_inner<'a>(
        &'a self,
        typename: &str,
        type_condition: &'a str,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if typename == type_condition {
            return true;
        }
        if !visited.insert(type_condition) {
            return false;
        }
        self.subtypes.get(type_condition).is_some_and(|subtypes| {
            subtypes.contains(typename)
                || subtypes
                    .iter()
                    .any(|subtype| self.satisfies_inner(typename, subtype, visited))
        })
    }
}
