use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

/// Android's standard text input widget class.
pub const EDIT_TEXT_CLASS: &str = "android.widget.EditText";

/// Decode the HTML entities that `uiautomator dump` emits in attribute values.
fn decode_entities(s: &str) -> String {
    let mut result = s
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    // Decimal numeric entities (&#10; shows up for embedded newlines)
    let numeric_re = Regex::new(r"&#(\d+);").unwrap();
    result = numeric_re
        .replace_all(&result, |caps: &regex::Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string();

    result
}

/// A UI node from the dumped view hierarchy
#[derive(Debug, Clone)]
pub struct UiElement {
    pub class: String,
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Midpoint of the bounding box
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// Parse bounds from the dump format "[0,0][1080,1920]"
    pub fn from_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split("][").collect();
        if parts.len() != 2 {
            return None;
        }

        let lt: Vec<i32> = parts[0]
            .trim_start_matches('[')
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect();
        let rb: Vec<i32> = parts[1]
            .trim_end_matches(']')
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect();

        if lt.len() == 2 && rb.len() == 2 {
            Some(Bounds {
                left: lt[0],
                top: lt[1],
                right: rb[0],
                bottom: rb[1],
            })
        } else {
            None
        }
    }
}

/// Parse the XML produced by `uiautomator dump` into a flat element list
pub fn parse_hierarchy(xml: &str) -> Result<Vec<UiElement>> {
    let mut elements = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"node" {
                    let mut element = UiElement {
                        class: String::new(),
                        text: String::new(),
                        resource_id: String::new(),
                        content_desc: String::new(),
                        bounds: Bounds::default(),
                        clickable: false,
                        enabled: true,
                    };

                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        let key = String::from_utf8_lossy(attr.key.as_ref());
                        let value = String::from_utf8_lossy(&attr.value);

                        match key.as_ref() {
                            "class" => element.class = value.to_string(),
                            "text" => element.text = decode_entities(&value),
                            "resource-id" => element.resource_id = value.to_string(),
                            "content-desc" => element.content_desc = decode_entities(&value),
                            "bounds" => {
                                if let Some(b) = Bounds::from_string(&value) {
                                    element.bounds = b;
                                }
                            }
                            "clickable" => element.clickable = value == "true",
                            "enabled" => element.enabled = value == "true",
                            _ => {}
                        }
                    }

                    elements.push(element);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("UI hierarchy XML parse error: {:?}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(elements)
}

/// Exact resource-id match; a bare id also matches the `package:id/name` suffix
pub fn find_by_id<'a>(elements: &'a [UiElement], id: &str) -> Option<&'a UiElement> {
    elements
        .iter()
        .find(|e| e.resource_id == id || e.resource_id.ends_with(&format!("/{}", id)))
}

/// Exact visible-text match
pub fn find_by_text<'a>(elements: &'a [UiElement], text: &str) -> Option<&'a UiElement> {
    elements.iter().find(|e| e.text == text)
}

/// Partial visible-text match
pub fn find_by_text_contains<'a>(elements: &'a [UiElement], text: &str) -> Option<&'a UiElement> {
    elements
        .iter()
        .find(|e| !text.is_empty() && e.text.contains(text))
}

/// Partial content-description match
pub fn find_by_desc_contains<'a>(elements: &'a [UiElement], text: &str) -> Option<&'a UiElement> {
    elements
        .iter()
        .find(|e| !text.is_empty() && e.content_desc.contains(text))
}

/// Nth element of a widget class, 0-based
pub fn find_nth_by_class<'a>(
    elements: &'a [UiElement],
    class: &str,
    index: usize,
) -> Option<&'a UiElement> {
    elements.iter().filter(|e| e.class == class).nth(index)
}

/// First input field whose own text contains `text`
pub fn find_field_by_text<'a>(elements: &'a [UiElement], text: &str) -> Option<&'a UiElement> {
    elements
        .iter()
        .find(|e| e.class == EDIT_TEXT_CLASS && !text.is_empty() && e.text.contains(text))
}

/// Locate the input field belonging to a label: the nearest `EditText` either
/// below the label or to its right. Below wins over right when both exist,
/// matching the common portrait form layout.
pub fn find_field_near<'a>(elements: &'a [UiElement], anchor: &Bounds) -> Option<&'a UiElement> {
    let fields: Vec<&UiElement> = elements
        .iter()
        .filter(|e| e.class == EDIT_TEXT_CLASS)
        .collect();

    let below = fields
        .iter()
        .filter(|e| e.bounds.top >= anchor.bottom)
        .min_by_key(|e| e.bounds.top - anchor.bottom)
        .copied();

    if below.is_some() {
        return below;
    }

    fields
        .iter()
        .filter(|e| {
            // Same row: vertical spans overlap
            e.bounds.left >= anchor.right
                && e.bounds.top < anchor.bottom
                && e.bounds.bottom > anchor.top
        })
        .min_by_key(|e| e.bounds.left - anchor.right)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(class: &str, text: &str, bounds: Bounds) -> UiElement {
        UiElement {
            class: class.to_string(),
            text: text.to_string(),
            resource_id: String::new(),
            content_desc: String::new(),
            bounds,
            clickable: false,
            enabled: true,
        }
    }

    fn bounds(left: i32, top: i32, right: i32, bottom: i32) -> Bounds {
        Bounds {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn test_bounds_parse_and_center() {
        let b = Bounds::from_string("[0,100][200,300]").unwrap();
        assert_eq!(b, bounds(0, 100, 200, 300));
        assert_eq!(b.center(), (100, 200));
        assert!(Bounds::from_string("garbage").is_none());
    }

    #[test]
    fn test_parse_hierarchy() {
        let xml = r#"<?xml version='1.0'?><hierarchy><node class="android.widget.Button" text="Simpan" resource-id="com.app:id/save" content-desc="" bounds="[0,0][100,100]" clickable="true" enabled="true"/></hierarchy>"#;
        let elements = parse_hierarchy(xml).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "Simpan");
        assert_eq!(elements[0].resource_id, "com.app:id/save");
        assert!(elements[0].clickable);
    }

    #[test]
    fn test_parse_hierarchy_decodes_entities() {
        let xml = r#"<?xml version='1.0'?><hierarchy><node class="View" text="Total &amp; Pajak&#10;Rp 5.000" bounds="[0,0][10,10]"/></hierarchy>"#;
        let elements = parse_hierarchy(xml).unwrap();
        assert_eq!(elements[0].text, "Total & Pajak\nRp 5.000");
    }

    #[test]
    fn test_find_by_id_suffix() {
        let mut e = element("View", "", bounds(0, 0, 10, 10));
        e.resource_id = "com.app:id/username".to_string();
        let elements = vec![e];
        assert!(find_by_id(&elements, "username").is_some());
        assert!(find_by_id(&elements, "com.app:id/username").is_some());
        assert!(find_by_id(&elements, "password").is_none());
    }

    #[test]
    fn test_contains_ignores_empty_needle() {
        let elements = vec![element("View", "anything", bounds(0, 0, 10, 10))];
        assert!(find_by_text_contains(&elements, "").is_none());
        assert!(find_by_desc_contains(&elements, "").is_none());
    }

    #[test]
    fn test_find_nth_by_class() {
        let elements = vec![
            element(EDIT_TEXT_CLASS, "first", bounds(0, 0, 10, 10)),
            element("android.widget.Button", "x", bounds(0, 10, 10, 20)),
            element(EDIT_TEXT_CLASS, "second", bounds(0, 20, 10, 30)),
        ];
        assert_eq!(
            find_nth_by_class(&elements, EDIT_TEXT_CLASS, 1).unwrap().text,
            "second"
        );
        assert!(find_nth_by_class(&elements, EDIT_TEXT_CLASS, 2).is_none());
    }

    #[test]
    fn test_field_near_prefers_below() {
        let label = bounds(0, 100, 200, 140);
        let elements = vec![
            element(EDIT_TEXT_CLASS, "", bounds(0, 150, 200, 190)),
            element(EDIT_TEXT_CLASS, "", bounds(220, 100, 400, 140)),
        ];
        let found = find_field_near(&elements, &label).unwrap();
        assert_eq!(found.bounds.top, 150);
    }

    #[test]
    fn test_field_near_falls_back_to_right() {
        let label = bounds(0, 100, 200, 140);
        let elements = vec![
            element("android.widget.TextView", "Nama", label.clone()),
            element(EDIT_TEXT_CLASS, "", bounds(220, 100, 400, 140)),
        ];
        let found = find_field_near(&elements, &label).unwrap();
        assert_eq!(found.bounds.left, 220);
    }

    #[test]
    fn test_field_near_none() {
        let label = bounds(0, 500, 200, 540);
        // Field strictly above the label: neither below nor right
        let elements = vec![element(EDIT_TEXT_CLASS, "", bounds(0, 0, 200, 40))];
        assert!(find_field_near(&elements, &label).is_none());
    }
}
