use std::{fs, path::Path};

use flipm_shared::{
    log::debug,
    serde_json::{Map, Value},
};

use crate::{Error, Result};

/// Number of lights per type found in a converted scene document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightSummary {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
}

impl LightSummary {
    /// Builds the material defines for the light types that occur in the scene,
    /// e.g. `DIRECTIONAL_LIGHT_COUNT 1; SPOT_LIGHT_COUNT 2`.
    pub fn defines(&self) -> Vec<String> {
        [
            ("DIRECTIONAL_LIGHT_COUNT", self.directional),
            ("POINT_LIGHT_COUNT", self.point),
            ("SPOT_LIGHT_COUNT", self.spot),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, count)| format!("{name} {count}"))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

impl LightType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(LightType::Directional),
            2 => Some(LightType::Point),
            3 => Some(LightType::Spot),
            _ => None,
        }
    }
}

/// The `scene.node` entry of a converted scene. The XML conversion collapses a single
/// node into an object, so both shapes occur.
#[derive(Debug, Clone, Copy)]
pub enum NodeCollection<'a> {
    Single(&'a Map<String, Value>),
    Many(&'a [Value]),
}

impl<'a> NodeCollection<'a> {
    /// Looks up `scene.node` in the document.
    pub fn from_document(document: &'a Value) -> Option<Self> {
        match document.get("scene")?.get("node")? {
            Value::Array(nodes) => Some(NodeCollection::Many(nodes)),
            Value::Object(node) => Some(NodeCollection::Single(node)),
            _ => None,
        }
    }

    /// Iterates over the nodes that are objects. Text-only nodes are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &'a Map<String, Value>> {
        let nodes: Vec<&'a Map<String, Value>> = match *self {
            NodeCollection::Single(node) => vec![node],
            NodeCollection::Many(nodes) => nodes.iter().filter_map(Value::as_object).collect(),
        };
        nodes.into_iter()
    }
}

/// Reads `light.lighttype` of a node. The XML conversion produces strings, hand written
/// documents might contain numbers.
///
/// Strings are read up to the first character that isn't part of the leading integer,
/// so `"2 lights"` is 2. Fractional numbers are truncated.
pub fn light_type_code(node: &Map<String, Value>) -> Option<i64> {
    match node.get("light")?.get("lighttype")? {
        Value::String(code) => leading_integer(code),
        Value::Number(code) => code
            .as_i64()
            .or_else(|| code.as_f64().filter(|code| code.is_finite()).map(|code| code.trunc() as i64)),
        _ => None,
    }
}

/// Parses the optionally signed integer at the start of the trimmed text.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with(['+', '-']));
    let digits_len = text[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    text[..sign_len + digits_len].parse().ok()
}

/// Counts the lights of the nodes directly in `scene.node`.
///
/// Child nodes of these nodes are not visited, so lights that are attached deeper in
/// the hierarchy don't contribute to the summary.
///
/// # Example
///
/// ```rust
/// use flipm_content::scene_lights::{count_lights, LightSummary};
/// use flipm_shared::serde_json::json;
/// let document = json!({ "scene": { "node": { "light": { "lighttype": "3" } } } });
/// assert_eq!(count_lights(&document), LightSummary { directional: 0, point: 0, spot: 1 });
/// ```
pub fn count_lights(document: &Value) -> LightSummary {
    let mut summary = LightSummary::default();
    let Some(nodes) = NodeCollection::from_document(document) else {
        return summary;
    };
    for node in nodes.iter() {
        let Some(code) = light_type_code(node) else {
            continue;
        };
        let id = node.get("$").and_then(|attributes| attributes.get("id")).and_then(Value::as_str);
        debug!("Found light with type {code} in node '{}'", id.unwrap_or("<unnamed>"));
        match LightType::from_code(code) {
            Some(LightType::Directional) => summary.directional += 1,
            Some(LightType::Point) => summary.point += 1,
            Some(LightType::Spot) => summary.spot += 1,
            None => {}
        }
    }
    summary
}

/// Counts the lights in the JSON file. A missing file counts as a scene without lights.
pub fn count_lights_in_file(path: &Path) -> Result<LightSummary> {
    if !path.exists() {
        return Ok(LightSummary::default());
    }
    let content = fs::read_to_string(path).map_err(Error::io("read", path))?;
    let document: Value = flipm_shared::serde_json::from_str(&content).map_err(|err| Error::ParseFailure {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    Ok(count_lights(&document))
}

#[cfg(test)]
mod tests {
    use flipm_shared::{function_name, serde_json::json};
    use flipm_test::{create_test_result_folder_for_function, setup_logger};

    use super::*;

    #[test]
    fn mixed_nodes() {
        setup_logger();
        let document = json!({
            "scene": {
                "node": [
                    { "light": { "lighttype": 1 } },
                    { "light": { "lighttype": 2 } },
                    { "id": 5 }
                ]
            }
        });
        assert_eq!(
            count_lights(&document),
            LightSummary {
                directional: 1,
                point: 1,
                spot: 0
            }
        );
    }

    #[test]
    fn converted_xml_shape() {
        let document = json!({
            "scene": {
                "node": [
                    { "$": { "id": "Sun" }, "light": { "lighttype": "1", "color": "1, 1, 1" } },
                    { "$": { "id": "Lamp" }, "light": { "lighttype": " 3 " } },
                    { "$": { "id": "Lamp2" }, "light": { "lighttype": "3" } },
                    { "$": { "id": "Strange" }, "light": { "lighttype": "7" } },
                    "text node"
                ]
            }
        });
        assert_eq!(
            count_lights(&document),
            LightSummary {
                directional: 1,
                point: 0,
                spot: 2
            }
        );
    }

    #[test]
    fn lenient_light_type_codes() {
        let code = |lighttype: Value| {
            let node = json!({ "light": { "lighttype": lighttype } });
            light_type_code(node.as_object().unwrap())
        };
        assert_eq!(code(json!("2 lights")), Some(2));
        assert_eq!(code(json!("  3")), Some(3));
        assert_eq!(code(json!("+1")), Some(1));
        assert_eq!(code(json!(2.0)), Some(2));
        assert_eq!(code(json!(3.7)), Some(3));
        assert_eq!(code(json!("lights 2")), None);
        assert_eq!(code(json!("")), None);
        assert_eq!(code(json!("-")), None);
        assert_eq!(code(json!(true)), None);

        let document = json!({ "scene": { "node": [
            { "light": { "lighttype": "1 (directional)" } },
            { "light": { "lighttype": 2.0 } },
        ] } });
        assert_eq!(count_lights(&document), LightSummary { directional: 1, point: 1, spot: 0 });
    }

    #[test]
    fn missing_scene_node() {
        assert_eq!(count_lights(&json!({})), LightSummary::default());
        assert_eq!(count_lights(&json!({ "scene": {} })), LightSummary::default());
        assert_eq!(count_lights(&json!({ "scene": { "node": "" } })), LightSummary::default());
    }

    /// Only the top level of `scene.node` is inspected. Lights in child nodes are not counted.
    #[test]
    fn nested_lights_are_not_counted() {
        let document = json!({
            "scene": {
                "node": {
                    "$": { "id": "Root" },
                    "children": {
                        "node": { "light": { "lighttype": "2" } }
                    }
                }
            }
        });
        assert_eq!(count_lights(&document), LightSummary::default());
    }

    #[test]
    fn defines_in_fixed_order() {
        let summary = LightSummary {
            directional: 2,
            point: 0,
            spot: 1,
        };
        assert_eq!(summary.defines(), vec!["DIRECTIONAL_LIGHT_COUNT 2", "SPOT_LIGHT_COUNT 1"]);
        assert!(LightSummary::default().defines().is_empty());
        assert!(LightSummary::default().is_empty());
    }

    #[test]
    fn from_file() {
        let folder = create_test_result_folder_for_function(function_name!());
        let path = folder.join("scene.json");
        assert_eq!(count_lights_in_file(&path).unwrap(), LightSummary::default());

        std::fs::write(&path, r#"{ "scene": { "node": { "light": { "lighttype": "2" } } } }"#).unwrap();
        assert_eq!(count_lights_in_file(&path).unwrap().point, 1);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(count_lights_in_file(&path), Err(Error::ParseFailure { .. })));
    }
}
