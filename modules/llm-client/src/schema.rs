//! schemars → Gemini response-schema conversion.
//!
//! Gemini's structured output takes an OpenAPI-style schema subset. It has
//! no `$ref` resolution and rejects several JSON-Schema keywords, so the
//! schemars output needs scrubbing:
//! 1. Inline all `#/definitions/…` references.
//! 2. Collapse single-element `allOf` wrappers (schemars emits these for
//!    referenced fields).
//! 3. Drop unsupported keywords: `$schema`, `definitions`, `title`,
//!    `additionalProperties`, `format` on strings, `examples`.

use schemars::{schema_for, JsonSchema};

/// Build the Gemini `responseSchema` for a response type.
pub fn response_schema<T: JsonSchema>() -> serde_json::Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = value.get("definitions").cloned();
    if let Some(defs) = definitions {
        inline_refs(&mut value, &defs);
    }
    scrub(&mut value);

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    value
}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(name) {
                        *value = def.clone();
                        inline_refs(value, definitions);
                        return;
                    }
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

fn scrub(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("title");
            map.remove("additionalProperties");
            map.remove("examples");
            // Optional fields come out of schemars as `"type": [T, "null"]`;
            // Gemini wants a single type plus `nullable`.
            if let Some(serde_json::Value::Array(types)) = map.get("type").cloned() {
                let non_null: Vec<&serde_json::Value> =
                    types.iter().filter(|t| *t != &serde_json::json!("null")).collect();
                if non_null.len() == 1 && types.len() == 2 {
                    map.insert("type".to_string(), (*non_null[0]).clone());
                    map.insert("nullable".to_string(), serde_json::Value::Bool(true));
                }
            }
            // Gemini only understands a handful of formats; schemars emits
            // integer widths like "int64" that it rejects on strings.
            if map.get("type") == Some(&serde_json::Value::String("string".to_string())) {
                map.remove("format");
            }
            for (_, v) in map.iter_mut() {
                scrub(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                scrub(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Inner {
        label: String,
        weight: Option<u8>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Outer {
        items: Vec<Inner>,
        note: Option<String>,
    }

    #[test]
    fn inlines_definitions_and_strips_unsupported_keys() {
        let schema = response_schema::<Outer>();
        let text = serde_json::to_string(&schema).unwrap();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("definitions"));
        assert!(!text.contains("$schema"));
        assert!(!text.contains("additionalProperties"));
        assert!(!text.contains("title"));

        // The nested object made it through inlining intact.
        let label = &schema["properties"]["items"]["items"]["properties"]["label"];
        assert_eq!(label["type"], "string");
    }

    #[test]
    fn required_fields_survive() {
        let schema = response_schema::<Outer>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "items"));
    }

    #[test]
    fn optional_fields_become_nullable_single_types() {
        let schema = response_schema::<Outer>();
        let note = &schema["properties"]["note"];
        assert_eq!(note["type"], "string");
        assert_eq!(note["nullable"], true);
    }
}
