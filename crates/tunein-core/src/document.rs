//! Arena-backed XML document model with an indexed field locator.
//!
//! Record templates are field-value trees where every interesting field is
//! uniquely identified by an `(element, attribute, value)` triple, e.g.
//! `<field name="EventName">`. Rather than searching the tree for every
//! write, a [`FieldIndex`] is built once per loaded document and handed out
//! [`NodeId`] handles that stay valid while subtrees are appended.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

/// Errors that can occur while loading or writing a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The XML is malformed.
    #[error("Malformed XML: {0}")]
    Parse(String),

    /// The document has no root element.
    #[error("Document has no root element")]
    Empty,

    /// Serialization failed.
    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// An XML document stored as a flat arena of nodes.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a document holding a single empty root element.
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![Node::Element(Element::new(root_name))],
            root: NodeId(0),
        }
    }

    /// Load and parse a document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the file cannot be read, or a parse
    /// error if its content is not well-formed XML.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a document from a string.
    ///
    /// Whitespace-only text between elements is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] for malformed XML and
    /// [`DocumentError::Empty`] if there is no root element.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(DocumentError::Parse(format!(
                        "at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
            };

            match event {
                Event::Start(start) => {
                    let id = push_element(&mut nodes, &start)?;
                    attach(&mut nodes, &stack, &mut root, id)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    let id = push_element(&mut nodes, &start)?;
                    attach(&mut nodes, &stack, &mut root, id)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| DocumentError::Parse(e.to_string()))?
                        .into_owned();
                    push_leaf(&mut nodes, &stack, Node::Text(value));
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    push_leaf(&mut nodes, &stack, Node::CData(value));
                }
                Event::Comment(comment) => {
                    let value = String::from_utf8_lossy(&comment).into_owned();
                    push_leaf(&mut nodes, &stack, Node::Comment(value));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DocumentError::Parse("unexpected end of document".to_string()));
        }

        let root = root.ok_or(DocumentError::Empty)?;
        Ok(Self { nodes, root })
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0] {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0] {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Element name of `id` (empty for non-element nodes).
    pub fn name(&self, id: NodeId) -> &str {
        self.element(id).map_or("", |e| e.name.as_str())
    }

    /// Value of attribute `key` on element `id`.
    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or add) attribute `key` on element `id`.
    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: &str) {
        if let Some(element) = self.element_mut(id) {
            if let Some(slot) = element.attributes.iter_mut().find(|(k, _)| k == key) {
                slot.1 = value.to_string();
            } else {
                element
                    .attributes
                    .push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Concatenated text content of `id` and all its descendants.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0] {
            Node::Text(t) | Node::CData(t) => out.push_str(t),
            Node::Element(element) => {
                for &child in &element.children {
                    self.collect_text(child, out);
                }
            }
            Node::Comment(_) => {}
        }
    }

    /// Replace every child of element `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        let text = NodeId(self.nodes.len());
        self.nodes.push(Node::Text(value.to_string()));
        if let Some(element) = self.element_mut(id) {
            element.children = vec![text];
        }
    }

    /// Child elements of `id`, in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.element(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&c| matches!(self.nodes[c.0], Node::Element(_)))
    }

    /// Child elements of `id` named `name`.
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.child_elements(id).filter(move |&c| self.name(c) == name)
    }

    /// First child element of `id` named `name`.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(id, name).next()
    }

    /// Text of the first child element named `name`, if present.
    pub fn child_text(&self, id: NodeId, name: &str) -> Option<String> {
        self.child(id, name).map(|c| self.text(c))
    }

    /// Set the text of child `name`, creating the element if missing.
    pub fn set_child_text(&mut self, id: NodeId, name: &str, value: &str) -> NodeId {
        let child = match self.child(id, name) {
            Some(child) => child,
            None => self.append_element(id, name),
        };
        self.set_text(child, value);
        child
    }

    /// Append a new empty element under `parent`.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::Element(Element::new(name)));
        if let Some(element) = self.element_mut(parent) {
            element.children.push(id);
        }
        id
    }

    /// All descendants of `id` (excluding `id`) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self
            .element(id)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = pending.pop() {
            if let Some(element) = self.element(next) {
                out.push(next);
                pending.extend(element.children.iter().rev().copied());
            }
        }
        out
    }

    /// First descendant element of `id` named `name`.
    pub fn find_descendant(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(id).into_iter().find(|&d| self.name(d) == name)
    }

    /// Deep-copy the root of `other` and append it under `parent`.
    ///
    /// Returns the handle of the copied root inside `self`.
    pub fn append_document(&mut self, parent: NodeId, other: &Document) -> NodeId {
        let copied = self.import(other, other.root);
        if let Some(element) = self.element_mut(parent) {
            element.children.push(copied);
        }
        copied
    }

    fn import(&mut self, other: &Document, id: NodeId) -> NodeId {
        let node = match &other.nodes[id.0] {
            Node::Element(element) => {
                let children: Vec<NodeId> = element
                    .children
                    .iter()
                    .map(|&child| self.import(other, child))
                    .collect();
                Node::Element(Element {
                    name: element.name.clone(),
                    attributes: element.attributes.clone(),
                    children,
                })
            }
            leaf => leaf.clone(),
        };
        let new_id = NodeId(self.nodes.len());
        self.nodes.push(node);
        new_id
    }

    /// Serialize with an XML declaration and two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Write`] if serialization fails.
    pub fn to_xml_string(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| DocumentError::Write(e.to_string()))?;
        self.write_node(&mut writer, self.root)?;
        String::from_utf8(writer.into_inner()).map_err(|e| DocumentError::Write(e.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), DocumentError> {
        let event = match &self.nodes[id.0] {
            Node::Text(text) => Event::Text(BytesText::new(text)),
            Node::CData(data) => Event::CData(BytesCData::new(data.as_str())),
            Node::Comment(comment) => Event::Comment(BytesText::from_escaped(comment.as_str())),
            Node::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for (key, value) in &element.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if element.children.is_empty() {
                    Event::Empty(start)
                } else {
                    writer
                        .write_event(Event::Start(start))
                        .map_err(|e| DocumentError::Write(e.to_string()))?;
                    for &child in &element.children {
                        self.write_node(writer, child)?;
                    }
                    Event::End(BytesEnd::new(element.name.as_str()))
                }
            }
        };
        writer
            .write_event(event)
            .map_err(|e| DocumentError::Write(e.to_string()))
    }

    /// Write the document to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let xml = self.to_xml_string()?;
        std::fs::write(path, xml).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn push_element(nodes: &mut Vec<Node>, start: &BytesStart<'_>) -> Result<NodeId, DocumentError> {
    let mut element = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::Parse(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    let id = NodeId(nodes.len());
    nodes.push(Node::Element(element));
    Ok(id)
}

fn attach(
    nodes: &mut [Node],
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    id: NodeId,
) -> Result<(), DocumentError> {
    match stack.last() {
        Some(parent) => {
            if let Node::Element(element) = &mut nodes[parent.0] {
                element.children.push(id);
            }
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(id);
            Ok(())
        }
        None => Err(DocumentError::Parse("multiple root elements".to_string())),
    }
}

fn push_leaf(nodes: &mut Vec<Node>, stack: &[NodeId], node: Node) {
    // Text outside the root element carries no meaning.
    let Some(parent) = stack.last().copied() else {
        return;
    };
    let id = NodeId(nodes.len());
    nodes.push(node);
    if let Node::Element(element) = &mut nodes[parent.0] {
        element.children.push(id);
    }
}

/// Locates a field by `(element, attribute, value)`, e.g.
/// `<field name="EventName">`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Element name (`field`, `object`, ...).
    pub element: &'static str,
    /// Attribute used as the identifier.
    pub attribute: &'static str,
    /// Attribute value identifying the field.
    pub value: &'static str,
}

impl FieldRef {
    /// `<field name="…">`
    pub const fn field(name: &'static str) -> Self {
        Self {
            element: "field",
            attribute: "name",
            value: name,
        }
    }

    /// `<field hash="…">`, used by tables without field names.
    pub const fn hashed(hash: &'static str) -> Self {
        Self {
            element: "field",
            attribute: "hash",
            value: hash,
        }
    }

    /// `<object name="…">`
    pub const fn object(name: &'static str) -> Self {
        Self {
            element: "object",
            attribute: "name",
            value: name,
        }
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}=\"{}\">", self.element, self.attribute, self.value)
    }
}

/// Index of every `(element, attribute, value)` triple of a document.
///
/// The first element in document order wins, matching a linear descendant
/// search.
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    fields: HashMap<(String, String, String), NodeId>,
}

impl FieldIndex {
    /// Index all attributes of every element below the root.
    pub fn build(doc: &Document) -> Self {
        let mut fields = HashMap::new();
        for id in doc.descendants(doc.root()) {
            let Some(element) = doc.element(id) else {
                continue;
            };
            for (key, value) in &element.attributes {
                fields
                    .entry((element.name.clone(), key.clone(), value.clone()))
                    .or_insert(id);
            }
        }
        Self { fields }
    }

    /// Look up a field handle.
    pub fn get(&self, field: FieldRef) -> Option<NodeId> {
        self.fields
            .get(&(
                field.element.to_string(),
                field.attribute.to_string(),
                field.value.to_string(),
            ))
            .copied()
    }

    /// Number of indexed triples.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document had no attributes at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
