/// Minimal XML tree used by the XML/SOAP registrar clients.
///
/// Elements are matched by local name so namespace prefixes (`soap:`,
/// `s:`, vendor prefixes) never matter to the callers.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::RegistrarError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Attribute by local name, case-insensitive.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attr(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Depth-first search for the first descendant (or self) with this name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name.eq_ignore_ascii_case(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Every descendant (or self) with this name, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        if self.name.eq_ignore_ascii_case(name) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(name, out);
        }
    }

    /// Follow a `/`-separated path of descendant names and return the text.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        let mut node = self;
        for part in path.split('/') {
            node = node.find(part)?;
        }
        let text = node.text.trim();
        if text.is_empty() { None } else { Some(text) }
    }

    pub fn bool_at(&self, path: &str) -> Option<bool> {
        self.text_at(path).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

pub fn parse(xml: &str) -> Result<XmlElement, RegistrarError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| RegistrarError::MalformedResponse(format!("XML text: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&value);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RegistrarError::MalformedResponse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    root.ok_or_else(|| RegistrarError::MalformedResponse("empty XML document".into()))
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, RegistrarError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| RegistrarError::MalformedResponse(format!("XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| RegistrarError::MalformedResponse(format!("XML attribute: {}", e)))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(XmlElement { name, attributes, ..Default::default() })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Escape text or attribute content.
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// `<name>escaped value</name>`
pub fn tag(name: &str, value: &str) -> String {
    format!("<{0}>{1}</{0}>", name, escape(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_names_ignore_namespaces() {
        let doc = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
            <s:Body><a:Result xmlns:a="urn:x"><a:Status>SUCCESS</a:Status></a:Result></s:Body>
        </s:Envelope>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "Envelope");
        assert_eq!(root.text_at("Result/Status"), Some("SUCCESS"));
    }

    #[test]
    fn attributes_and_empty_elements() {
        let doc = r#"<ApiResponse Status="OK"><CommandResponse>
            <DomainCheckResult Domain="a.com" Available="true"/>
            <DomainCheckResult Domain="b.com" Available="false"/>
        </CommandResponse></ApiResponse>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.attr("status"), Some("OK"));
        let results = root.find_all("DomainCheckResult");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].attr_bool("Available"), Some(true));
        assert_eq!(results[1].attr("Domain"), Some("b.com"));
    }

    #[test]
    fn entities_are_unescaped() {
        let root = parse("<m>Tom &amp; Jerry</m>").unwrap();
        assert_eq!(root.text, "Tom & Jerry");
        assert_eq!(tag("o", "A&B <x>"), "<o>A&amp;B &lt;x&gt;</o>");
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse("not xml at all"), Err(RegistrarError::MalformedResponse(_))));
        assert!(matches!(parse("<a><b></a>"), Err(RegistrarError::MalformedResponse(_))));
    }
}
