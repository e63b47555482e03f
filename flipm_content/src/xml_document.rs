//! XML helpers for the text output of the encoder.
//!
//! The encoder writes the scene it found in an FBX file as an XML document next to the
//! `.gpb` file. The document is reformatted with [`pretty_print`] so that it can be read
//! and converted with [`to_json`] into a structure that [`crate::scene_lights`] inspects.

use flipm_shared::{
    serde_json::{Map, Value},
    thiserror,
};
use quick_xml::{
    events::{BytesStart, Event},
    Reader, Writer,
};

/// Key under which the attributes of an element are stored.
pub const ATTRIBUTE_KEY: &str = "$";

/// Key under which the text of an element with attributes or children is stored.
pub const TEXT_KEY: &str = "_";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Failed to write XML: {0}")]
    Write(String),
    #[error("Element '{0}' is never closed")]
    UnclosedElement(String),
    #[error("Document has no root element")]
    NoRootElement,
}

/// Reformats the document with one element per line and an indentation of two spaces.
///
/// # Example
///
/// ```rust
/// use flipm_content::xml_document::pretty_print;
/// let pretty = pretty_print("<scene><node id=\"a\"/>  <node id=\"b\"/></scene>").unwrap();
/// assert_eq!(pretty, "<scene>\n  <node id=\"a\"/>\n  <node id=\"b\"/>\n</scene>");
/// ```
pub fn pretty_print(xml: &str) -> Result<String, Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            event => writer.write_event(event).map_err(|err| Error::Write(err.to_string()))?,
        }
    }
    String::from_utf8(writer.into_inner()).map_err(|err| Error::Write(err.to_string()))
}

/// Element that is still open while the document is read.
struct OpenElement {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn new(start: &BytesStart) -> Result<Self, Error> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_lowercase();
        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.insert(key, Value::String(value));
        }
        Ok(Self {
            name,
            attributes,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(text.to_owned());
        }
        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTE_KEY.to_owned(), Value::Object(self.attributes));
        }
        object.extend(self.children);
        if !text.is_empty() {
            object.insert(TEXT_KEY.to_owned(), Value::String(text.to_owned()));
        }
        Value::Object(object)
    }
}

/// A repeated child turns the entry into an array, a single child stays a plain value.
fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Converts the document into a JSON structure.
///
/// - Tag names are lower-cased, text is trimmed.
/// - The root element is not wrapped, the result is the value of the root element.
/// - An element without attributes and children becomes its text.
/// - Attributes are stored under [`ATTRIBUTE_KEY`], text next to children under [`TEXT_KEY`].
/// - Children with the same tag become an array, a single child is stored directly.
///
/// # Example
///
/// ```rust
/// use flipm_content::xml_document::to_json;
/// use flipm_shared::serde_json::json;
/// let json = to_json("<Scene><Node id=\"a\"><LightType>1</LightType></Node></Scene>").unwrap();
/// assert_eq!(json, json!({ "node": { "$": { "id": "a" }, "lighttype": "1" } }));
/// ```
pub fn to_json(xml: &str) -> Result<Value, Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut open_elements: Vec<OpenElement> = Vec::new();
    let mut root = None;
    let mut close = |element: OpenElement, open_elements: &mut Vec<OpenElement>| {
        let name = element.name.clone();
        let value = element.into_value();
        match open_elements.last_mut() {
            Some(parent) => insert_child(&mut parent.children, name, value),
            None => root = Some(value),
        }
    };

    loop {
        match reader.read_event()? {
            Event::Start(start) => open_elements.push(OpenElement::new(&start)?),
            Event::Empty(start) => {
                let element = OpenElement::new(&start)?;
                close(element, &mut open_elements);
            }
            Event::End(_) => {
                if let Some(element) = open_elements.pop() {
                    close(element, &mut open_elements);
                }
            }
            Event::Text(text) => {
                if let Some(element) = open_elements.last_mut() {
                    element.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(element) = open_elements.last_mut() {
                    element.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(element) = open_elements.pop() {
        return Err(Error::UnclosedElement(element.name));
    }
    root.ok_or(Error::NoRootElement)
}

#[cfg(test)]
mod tests {
    use flipm_shared::{indoc::indoc, serde_json::json};

    use super::*;

    const SCENE_XML: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <GamePlayBundle>
        <Scene id="__SCENE__">
        <Node id="Board"><Type>2</Type><Model id="Board_Model"/></Node>
        <Node id="Sun"><Light id="SunLight"><LightType>1</LightType><Color>1.0, 1.0, 1.0</Color></Light></Node>
        <Node id="Lamp"><Light id="LampLight"><LightType>2</LightType></Light></Node>
        <ActiveCamera>Camera</ActiveCamera>
        </Scene>
        </GamePlayBundle>
    "#};

    #[test]
    fn converted_scene() {
        let json = to_json(SCENE_XML).unwrap();
        assert_eq!(
            json,
            json!({
                "scene": {
                    "$": { "id": "__SCENE__" },
                    "node": [
                        { "$": { "id": "Board" }, "type": "2", "model": { "$": { "id": "Board_Model" } } },
                        { "$": { "id": "Sun" }, "light": { "$": { "id": "SunLight" }, "lighttype": "1", "color": "1.0, 1.0, 1.0" } },
                        { "$": { "id": "Lamp" }, "light": { "$": { "id": "LampLight" }, "lighttype": "2" } }
                    ],
                    "activecamera": "Camera"
                }
            })
        );
    }

    #[test]
    fn text_next_to_attributes() {
        let json = to_json("<a x=\"1\">  hello  </a>").unwrap();
        assert_eq!(json, json!({ "$": { "x": "1" }, "_": "hello" }));
    }

    #[test]
    fn empty_elements() {
        assert_eq!(to_json("<a/>").unwrap(), json!(""));
        assert_eq!(to_json("<a><b/><b></b></a>").unwrap(), json!({ "b": ["", ""] }));
    }

    #[test]
    fn entities_and_cdata() {
        let json = to_json("<a><b>x &amp; y</b><c><![CDATA[<raw>]]></c></a>").unwrap();
        assert_eq!(json, json!({ "b": "x & y", "c": "<raw>" }));
    }

    #[test]
    fn key_order_follows_document() {
        let json = to_json("<a><z>1</z><m>2</m><b>3</b></a>").unwrap();
        let keys = json.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["z", "m", "b"]);
    }

    #[test]
    fn malformed_documents() {
        assert!(matches!(to_json("<a><b></a>"), Err(Error::Xml(_))));
        assert!(matches!(to_json("<a><b>"), Err(Error::UnclosedElement(_) | Error::Xml(_))));
        assert!(matches!(to_json("   "), Err(Error::NoRootElement)));
    }

    #[test]
    fn pretty_print_nested() {
        let pretty = pretty_print("<?xml version=\"1.0\"?><a><b>text</b><c><d/></c></a>").unwrap();
        let expected = indoc! {r#"
            <?xml version="1.0"?>
            <a>
              <b>text</b>
              <c>
                <d/>
              </c>
            </a>"#};
        assert_eq!(pretty, expected);
    }

    #[test]
    fn pretty_print_is_stable() {
        let once = pretty_print(SCENE_XML).unwrap();
        let twice = pretty_print(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(to_json(&once).unwrap(), to_json(SCENE_XML).unwrap());
    }
}
