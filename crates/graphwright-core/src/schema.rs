//! Block input/output schemas and the field-type resolver.
//!
//! Sink names may address a nested property of an object-typed input using
//! the flattened `parent_#_child` convention. [`resolve_type`] is the single
//! place that convention is interpreted for type lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const NESTED_SEPARATOR: &str = "_#_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default, deserialize_with = "lenient_properties")]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_nested_properties",
        skip_serializing_if = "Option::is_none"
    )]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertySchema {
    pub fn typed(ty: impl Into<String>) -> Self {
        Self {
            ty: Some(ty.into()),
            ..Default::default()
        }
    }

    /// Object schema with the given nested properties.
    pub fn object(properties: impl IntoIterator<Item = (String, PropertySchema)>) -> Self {
        Self {
            ty: Some("object".to_string()),
            properties: Some(properties.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Whether the schema admits keys beyond its declared `properties`.
    ///
    /// `true` and any non-empty schema object count as permissive.
    pub fn allows_additional_properties(&self) -> bool {
        match &self.additional_properties {
            Some(Value::Bool(allowed)) => *allowed,
            Some(Value::Object(schema)) => !schema.is_empty(),
            _ => false,
        }
    }

    pub fn declares_child(&self, child: &str) -> bool {
        self.properties
            .as_ref()
            .is_some_and(|props| props.contains_key(child))
    }
}

impl BlockSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    pub fn type_of(&self, field_name: &str) -> Option<&str> {
        resolve_type(&self.properties, field_name)
    }
}

/// Split a flattened `parent_#_child` field name.
pub fn split_nested(field_name: &str) -> Option<(&str, &str)> {
    field_name.split_once(NESTED_SEPARATOR)
}

/// Declared type of `field_name` within `properties`.
///
/// For nested names the parent must declare a `properties` map that contains
/// the child; otherwise the type is unknown.
pub fn resolve_type<'a>(
    properties: &'a BTreeMap<String, PropertySchema>,
    field_name: &str,
) -> Option<&'a str> {
    match split_nested(field_name) {
        Some((parent, child)) => properties
            .get(parent)?
            .properties
            .as_ref()?
            .get(child)?
            .ty
            .as_deref(),
        None => properties.get(field_name)?.ty.as_deref(),
    }
}

/// Identical types are compatible; `integer` and `number` widen both ways.
pub fn types_compatible(source: &str, sink: &str) -> bool {
    if source == sink {
        return true;
    }
    matches!(
        (source, sink),
        ("integer", "number") | ("number", "integer")
    )
}

/// Map a declared schema type onto the converter block's target vocabulary.
pub fn converter_target_type(declared: &str) -> Option<&'static str> {
    let target = match declared.to_ascii_lowercase().as_str() {
        "string" | "str" | "text" => "string",
        "integer" | "int" | "float" | "double" | "number" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" => "list",
        "object" | "dict" | "dictionary" => "dictionary",
        _ => return None,
    };
    Some(target)
}

fn lenient_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, PropertySchema>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_nested_properties(deserializer)?.unwrap_or_default())
}

/// Accept a properties map; anything that is not an object of schemas is
/// treated as absent rather than failing the whole catalog.
fn lenient_nested_properties<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, PropertySchema>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Object(map) => {
            let mut properties = BTreeMap::new();
            for (name, raw) in map {
                if let Ok(schema) = serde_json::from_value::<PropertySchema>(raw) {
                    properties.insert(name, schema);
                }
            }
            Ok(Some(properties))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_inputs() -> BlockSchema {
        serde_json::from_value(json!({
            "properties": {
                "to": {"type": "string"},
                "count": {"type": "integer"},
                "options": {
                    "type": "object",
                    "properties": {"cc": {"type": "string"}, "retries": {"type": "integer"}}
                },
                "headers": {"type": "object", "additionalProperties": {"type": "string"}},
                "broken": {"type": "object", "properties": ["not", "a", "map"]}
            },
            "required": ["to"]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_flat_and_nested_types() {
        let schema = email_inputs();
        assert_eq!(schema.type_of("to"), Some("string"));
        assert_eq!(schema.type_of("options_#_retries"), Some("integer"));
        assert_eq!(schema.type_of("options_#_missing"), None);
        assert_eq!(schema.type_of("headers_#_x-trace"), None);
        assert_eq!(schema.type_of("broken_#_not"), None);
        assert_eq!(schema.type_of("nope"), None);
    }

    #[test]
    fn split_nested_uses_first_separator() {
        assert_eq!(split_nested("a_#_b_#_c"), Some(("a", "b_#_c")));
        assert_eq!(split_nested("plain"), None);
    }

    #[test]
    fn numeric_widening_is_symmetric() {
        assert!(types_compatible("integer", "number"));
        assert!(types_compatible("number", "integer"));
        assert!(types_compatible("string", "string"));
        assert!(!types_compatible("string", "boolean"));
        assert!(!types_compatible("integer", "string"));
    }

    #[test]
    fn additional_properties_truthiness() {
        let schema = email_inputs();
        assert!(schema.property("headers").unwrap().allows_additional_properties());
        assert!(!schema.property("options").unwrap().allows_additional_properties());

        let empty: PropertySchema =
            serde_json::from_value(json!({"type": "object", "additionalProperties": {}})).unwrap();
        assert!(!empty.allows_additional_properties());
    }

    #[test]
    fn converter_vocabulary() {
        assert_eq!(converter_target_type("integer"), Some("number"));
        assert_eq!(converter_target_type("float"), Some("number"));
        assert_eq!(converter_target_type("array"), Some("list"));
        assert_eq!(converter_target_type("object"), Some("dictionary"));
        assert_eq!(converter_target_type("boolean"), Some("boolean"));
        assert_eq!(converter_target_type("null"), None);
    }
}
