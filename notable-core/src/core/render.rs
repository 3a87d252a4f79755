//! Plain-text / markdown rendering of rich-document node trees.
//!
//! Documents arrive as JSON in the editor's node format: every node has a
//! `type` tag and optionally `content` (or `children`), `text`, `marks` and
//! `attrs`. Parsing is lenient: absent or ill-typed fields fall back to empty
//! values and unknown node types render their children, so [`render_document`]
//! never fails.

use serde_json::{Map, Value};

// ── Node model ───────────────────────────────────────────────────────────────

/// Node type tag, with a catch-all for types this renderer does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Text,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    Blockquote,
    CodeBlock,
    HorizontalRule,
    Other(String),
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        match tag {
            "doc" => Self::Doc,
            "paragraph" => Self::Paragraph,
            "text" => Self::Text,
            "heading" => Self::Heading,
            "bulletList" => Self::BulletList,
            "orderedList" => Self::OrderedList,
            "listItem" => Self::ListItem,
            "blockquote" => Self::Blockquote,
            "codeBlock" => Self::CodeBlock,
            "horizontalRule" => Self::HorizontalRule,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Inline formatting applied to a text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkKind {
    Bold,
    Italic,
    Strike,
    Code,
    Link,
    Other(String),
}

impl From<&str> for MarkKind {
    fn from(tag: &str) -> Self {
        match tag {
            "bold" => Self::Bold,
            "italic" => Self::Italic,
            "strike" => Self::Strike,
            "code" => Self::Code,
            "link" => Self::Link,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub kind: MarkKind,
    pub attrs: Map<String, Value>,
}

impl Mark {
    fn from_value(value: &Value) -> Self {
        Self {
            kind: MarkKind::from(value.get("type").and_then(Value::as_str).unwrap_or("")),
            attrs: object_field(value, "attrs"),
        }
    }

    fn apply(&self, text: String) -> String {
        match self.kind {
            MarkKind::Bold => format!("**{text}**"),
            MarkKind::Italic => format!("*{text}*"),
            MarkKind::Strike => format!("~~{text}~~"),
            MarkKind::Code => format!("`{text}`"),
            MarkKind::Link => match self.attrs.get("href").and_then(Value::as_str) {
                Some(href) => format!("[{text}]({href})"),
                None => text,
            },
            MarkKind::Other(_) => text,
        }
    }
}

/// One node of a rich document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocNode {
    pub kind: NodeKind,
    pub text: String,
    pub children: Vec<DocNode>,
    pub marks: Vec<Mark>,
    pub attrs: Map<String, Value>,
}

impl DocNode {
    /// Builds a node tree from editor JSON. Never fails; a non-object value
    /// becomes an empty node of an unknown kind (arrays keep their elements
    /// as children).
    pub fn from_value(value: &Value) -> Self {
        let children = match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            _ => value
                .get("content")
                .or_else(|| value.get("children"))
                .and_then(Value::as_array)
                .map(|items| items.iter().map(Self::from_value).collect())
                .unwrap_or_default(),
        };

        Self {
            kind: NodeKind::from(value.get("type").and_then(Value::as_str).unwrap_or("")),
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            children,
            marks: value
                .get("marks")
                .and_then(Value::as_array)
                .map(|marks| marks.iter().map(Mark::from_value).collect())
                .unwrap_or_default(),
            attrs: object_field(value, "attrs"),
        }
    }

    /// Renders this node and its subtree, trimmed of surrounding whitespace.
    pub fn render(&self) -> String {
        self.render_node().trim().to_string()
    }

    fn render_node(&self) -> String {
        match &self.kind {
            NodeKind::Doc => self
                .children
                .iter()
                .map(Self::render_node)
                .filter(|block| !block.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
            NodeKind::Paragraph => self.render_children_concat(),
            NodeKind::Text => self
                .marks
                .iter()
                .fold(self.text.clone(), |text, mark| mark.apply(text)),
            NodeKind::Heading => {
                let level = self.attr_i64("level").unwrap_or(1).clamp(1, 6) as usize;
                format!("{} {}", "#".repeat(level), self.render_children_concat())
            }
            NodeKind::BulletList => self.render_prefixed_lines(|_| "- ".to_string()),
            NodeKind::OrderedList => {
                let start = self.attr_i64("start").unwrap_or(1);
                self.render_prefixed_lines(|index| format!("{}. ", start.saturating_add(index as i64)))
            }
            NodeKind::ListItem => self
                .children
                .iter()
                .map(|child| child.render_node().trim().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            NodeKind::Blockquote => self.render_prefixed_lines(|_| "> ".to_string()),
            NodeKind::CodeBlock => {
                let language = self
                    .attrs
                    .get("language")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                format!("```{language}\n{}\n```", self.render_children_concat())
            }
            NodeKind::HorizontalRule => "---".to_string(),
            NodeKind::Other(_) => self
                .children
                .iter()
                .map(Self::render_node)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn render_children_concat(&self) -> String {
        self.children.iter().map(Self::render_node).collect()
    }

    fn render_prefixed_lines(&self, prefix: impl Fn(usize) -> String) -> String {
        self.children
            .iter()
            .enumerate()
            .map(|(index, child)| format!("{}{}", prefix(index), child.render_node().trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Reads an integer attribute, accepting numbers and numeric strings.
    fn attr_i64(&self, key: &str) -> Option<i64> {
        match self.attrs.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn object_field(value: &Value, key: &str) -> Map<String, Value> {
    value
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Renders an editor JSON document to markdown-flavoured plain text.
pub fn render_document(document: &Value) -> String {
    DocNode::from_value(document).render()
}
