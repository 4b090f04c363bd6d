//! Markup printer for the in-memory host tree.

use super::memory::{HostNodeKind, MemoryRenderer};
use super::HostId;
use crate::props::{Props, Value};

/// Default attribute name for host ids.
pub const DEFAULT_ID_ATTR: &str = "data-host-id";

/// Configuration for markup printing.
#[derive(Debug, Clone)]
pub struct MarkupConfig {
    /// Whether to emit host id attributes.
    pub emit_ids: bool,
    /// Attribute name for host ids (default: "data-host-id").
    pub id_attr_name: String,
}

impl MarkupConfig {
    /// Plain markup, no ids.
    pub const PLAIN: Self = Self {
        emit_ids: false,
        id_attr_name: String::new(),
    };

    /// Markup with host ids, for debugging move and reuse behaviour.
    pub const DEBUG: Self = Self {
        emit_ids: true,
        id_attr_name: String::new(),
    };

    /// Set custom attribute name for host ids.
    pub fn with_id_attr(mut self, attr_name: impl Into<String>) -> Self {
        self.id_attr_name = attr_name.into();
        self
    }

    pub fn id_attr(&self) -> &str {
        if self.id_attr_name.is_empty() {
            DEFAULT_ID_ATTR
        } else {
            &self.id_attr_name
        }
    }
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self::PLAIN
    }
}

/// Render one host node and its subtree.
pub(super) fn render_node(host: &MemoryRenderer, id: HostId, config: &MarkupConfig, output: &mut String) {
    let Some(node) = host.node(id) else {
        return;
    };
    match &node.kind {
        HostNodeKind::Text(text) => output.push_str(&escape_html(text)),
        HostNodeKind::Container => {
            for child in &node.children {
                render_node(host, *child, config, output);
            }
        }
        HostNodeKind::Element { tag, props } => {
            output.push('<');
            output.push_str(tag);
            render_props(props, output);
            if config.emit_ids {
                output.push(' ');
                output.push_str(config.id_attr());
                output.push_str("=\"");
                output.push_str(&id.0.to_string());
                output.push('"');
            }

            if is_void_element(tag) && node.children.is_empty() {
                output.push_str(" />");
                return;
            }
            output.push('>');
            for child in &node.children {
                render_node(host, *child, config, output);
            }
            output.push_str("</");
            output.push_str(tag);
            output.push('>');
        }
    }
}

/// Render properties as attributes. `false` and null are omitted, `true`
/// renders as a bare attribute.
fn render_props(props: &Props, output: &mut String) {
    for (name, value) in props.iter() {
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => {
                output.push(' ');
                output.push_str(name);
            }
            _ => {
                output.push(' ');
                output.push_str(name);
                output.push_str("=\"");
                output.push_str(&escape_attr(&value.to_string()));
                output.push('"');
            }
        }
    }
}

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape attribute value special characters.
fn escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Check if element is a void element (self-closing).
fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "source" | "track" | "wbr"
    )
}
