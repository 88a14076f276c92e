//! # Document 模块
//!
//! [`XmlDocument`] 的 arena 实现：节点创建、挂接、属性、解析与序列化。
//!
//! 解析使用 quick-xml 的事件流构建 arena；序列化为手写单遍输出，
//! 不做格式化，不输出 XML 声明。

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use super::node::{NodeId, NodeKind, XmlNode};

/// XML 解析 / 结构错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    /// quick-xml 报告的解析失败
    #[error("XML 解析失败：{0}")]
    Parse(String),

    /// 文档结构不合法（如未闭合的元素）
    #[error("XML 文档格式错误：{0}")]
    Malformed(String),
}

/// XML 文档
///
/// 所有节点归文档所有，0 号位固定是文档节点。调用方通过 [`NodeId`]
/// 句柄访问与修改节点；句柄只对发放它的文档有意义。
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// 创建空文档（只含文档节点）
    pub fn new() -> Self {
        Self {
            nodes: vec![XmlNode::new(NodeKind::Document)],
        }
    }

    /// 文档节点句柄
    pub fn document_node(&self) -> NodeId {
        NodeId(0)
    }

    /// 根元素（文档节点的第一个元素子节点）
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&id| self.nodes[id.0].kind == NodeKind::Element)
    }

    fn push_node(&mut self, node: XmlNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// 创建元素节点（未挂接）
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let mut node = XmlNode::new(NodeKind::Element);
        node.name = name.to_string();
        self.push_node(node)
    }

    /// 创建文本节点（未挂接）
    pub fn create_text(&mut self, value: &str) -> NodeId {
        let mut node = XmlNode::new(NodeKind::Text);
        node.value = value.to_string();
        self.push_node(node)
    }

    /// 创建 CDATA 节点（未挂接）
    pub fn create_cdata(&mut self, value: &str) -> NodeId {
        let mut node = XmlNode::new(NodeKind::CData);
        node.value = value.to_string();
        self.push_node(node)
    }

    /// 创建处理指令节点（未挂接）
    pub fn create_pi(&mut self, target: &str, data: &str) -> NodeId {
        let mut node = XmlNode::new(NodeKind::ProcessingInstruction);
        node.name = target.to_string();
        node.value = data.to_string();
        self.push_node(node)
    }

    /// 创建注释节点（未挂接）
    pub fn create_comment(&mut self, value: &str) -> NodeId {
        let mut node = XmlNode::new(NodeKind::Comment);
        node.value = value.to_string();
        self.push_node(node)
    }

    /// 把 `child` 追加为 `parent` 的最后一个子节点
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.0].parent.is_none(), "节点已有父节点");
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// 设置 / 覆盖属性
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let attrs = &mut self.nodes[id.0].attributes;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// 按名取属性值
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 全部属性（声明顺序）
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        &self.nodes[id.0].attributes
    }

    /// 节点类型
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    /// 节点名（元素标签名 / 处理指令 target，其余为空）
    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    /// 节点自身文本（文本 / CDATA / 注释内容，处理指令 data）
    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].value
    }

    /// 父节点
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// 子节点（文档顺序）
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// 把节点从其父节点摘除
    ///
    /// 节点仍留在 arena 中，但从树上不可达；对无父节点的节点是空操作。
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// 摘除节点的全部子节点
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// XPath 1.0 string-value
    ///
    /// 文本 / CDATA 返回内容本身；元素与文档节点返回所有后代文本的拼接；
    /// 其余类型返回空串。
    pub fn string_value(&self, id: NodeId) -> String {
        match self.nodes[id.0].kind {
            NodeKind::Text | NodeKind::CData => self.nodes[id.0].value.clone(),
            NodeKind::Element | NodeKind::Document => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            _ => String::new(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id.0].children {
            match self.nodes[child.0].kind {
                NodeKind::Text | NodeKind::CData => out.push_str(&self.nodes[child.0].value),
                NodeKind::Element => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    // ---------------------------------------------------------------------
    // 解析：quick-xml 事件流 → arena
    // ---------------------------------------------------------------------

    /// 解析已有的 XML 文本
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut doc = Self::new();
        let mut reader = Reader::from_str(text);
        // 当前打开的元素栈；栈底固定是文档节点
        let mut stack: Vec<NodeId> = vec![doc.document_node()];

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let id = doc.read_element(e)?;
                    let parent = *stack.last().expect("栈底是文档节点");
                    doc.append_child(parent, id);
                    stack.push(id);
                }
                Ok(Event::End(_)) => {
                    if stack.len() <= 1 {
                        return Err(XmlError::Malformed("多余的闭合标签".to_string()));
                    }
                    stack.pop();
                }
                Ok(Event::Empty(ref e)) => {
                    let id = doc.read_element(e)?;
                    let parent = *stack.last().expect("栈底是文档节点");
                    doc.append_child(parent, id);
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlError::Parse(err.to_string()))?;
                    // 元素之间的纯空白不建节点
                    if !text.chars().all(char::is_whitespace) {
                        let parent = *stack.last().expect("栈底是文档节点");
                        if parent != doc.document_node() {
                            let id = doc.create_text(&text);
                            doc.append_child(parent, id);
                        }
                    }
                }
                Ok(Event::CData(ref e)) => {
                    let value = std::str::from_utf8(e.as_ref())
                        .map_err(|err| XmlError::Parse(err.to_string()))?
                        .to_string();
                    let parent = *stack.last().expect("栈底是文档节点");
                    if parent != doc.document_node() {
                        let id = doc.create_cdata(&value);
                        doc.append_child(parent, id);
                    }
                }
                Ok(Event::Comment(ref e)) => {
                    let value = std::str::from_utf8(e.as_ref())
                        .map_err(|err| XmlError::Parse(err.to_string()))?
                        .to_string();
                    let parent = *stack.last().expect("栈底是文档节点");
                    let id = doc.create_comment(&value);
                    doc.append_child(parent, id);
                }
                Ok(Event::PI(ref e)) => {
                    let target = std::str::from_utf8(e.target())
                        .map_err(|err| XmlError::Parse(err.to_string()))?
                        .to_string();
                    let data = std::str::from_utf8(e.content())
                        .map_err(|err| XmlError::Parse(err.to_string()))?
                        .trim_start()
                        .to_string();
                    let parent = *stack.last().expect("栈底是文档节点");
                    let id = doc.create_pi(&target, &data);
                    doc.append_child(parent, id);
                }
                Ok(Event::Eof) => {
                    if stack.len() > 1 {
                        let open: Vec<&str> =
                            stack[1..].iter().map(|&id| doc.name(id)).collect();
                        return Err(XmlError::Malformed(format!(
                            "未闭合的元素：<{}>",
                            open.join(">, <")
                        )));
                    }
                    break;
                }
                // 声明 / DOCTYPE 等跳过
                Ok(_) => {}
                Err(err) => {
                    return Err(XmlError::Parse(format!(
                        "偏移 {}：{err}",
                        reader.error_position()
                    )));
                }
            }
        }

        Ok(doc)
    }

    fn read_element(&mut self, e: &BytesStart) -> Result<NodeId, XmlError> {
        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| XmlError::Parse(err.to_string()))?
            .to_string();
        let id = self.create_element(&name);
        for attr in e.attributes() {
            let attr = attr.map_err(|err| XmlError::Parse(err.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| XmlError::Parse(err.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Parse(err.to_string()))?
                .to_string();
            self.set_attribute(id, &key, &value);
        }
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // 序列化：arena → 字符串
    // ---------------------------------------------------------------------

    /// 序列化为 XML 文本
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[0].children {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match node.kind {
            NodeKind::Element => {
                out.push('<');
                out.push_str(&node.name);
                for (k, v) in &node.attributes {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    escape_attr(v, out);
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&node.name);
                out.push('>');
            }
            NodeKind::Text => escape_text(&node.value, out),
            NodeKind::CData => {
                out.push_str("<![CDATA[");
                out.push_str(&node.value);
                out.push_str("]]>");
            }
            NodeKind::ProcessingInstruction => {
                out.push_str("<?");
                out.push_str(&node.name);
                if !node.value.is_empty() {
                    out.push(' ');
                    out.push_str(&node.value);
                }
                out.push_str("?>");
            }
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&node.value);
                out.push_str("-->");
            }
            NodeKind::Document => {}
        }
    }
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// 转义文本内容
fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// 转义属性值（额外转义双引号）
fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let doc = XmlDocument::new();
        assert_eq!(doc.root_element(), None);
        assert_eq!(doc.to_xml(), "");
    }

    #[test]
    fn test_build_and_serialize() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        let child = doc.create_element("child");
        doc.append_child(root, child);
        doc.set_attribute(child, "id", "1");
        let text = doc.create_text("value");
        doc.append_child(child, text);

        assert_eq!(doc.root_element(), Some(root));
        assert_eq!(doc.to_xml(), r#"<root><child id="1">value</child></root>"#);
    }

    #[test]
    fn test_set_attribute_overwrites() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        doc.set_attribute(root, "a", "1");
        doc.set_attribute(root, "a", "2");

        assert_eq!(doc.attribute(root, "a"), Some("2"));
        assert_eq!(doc.attributes(root).len(), 1);
    }

    #[test]
    fn test_detach_preserves_sibling_order() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("c");
        doc.append_child(root, a);
        doc.append_child(root, b);
        doc.append_child(root, c);

        doc.detach(b);

        assert_eq!(doc.children(root), &[a, c]);
        assert_eq!(doc.parent(b), None);
        assert_eq!(doc.to_xml(), "<root><a/><c/></root>");
    }

    #[test]
    fn test_clear_children() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        let a = doc.create_element("a");
        doc.append_child(root, a);
        let t = doc.create_text("x");
        doc.append_child(root, t);

        doc.clear_children(root);

        assert!(doc.children(root).is_empty());
        assert_eq!(doc.parent(a), None);
    }

    #[test]
    fn test_string_value() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        let a = doc.create_element("a");
        doc.append_child(root, a);
        let t1 = doc.create_text("hello ");
        doc.append_child(a, t1);
        let cd = doc.create_cdata("world");
        doc.append_child(root, cd);

        assert_eq!(doc.string_value(root), "hello world");
        assert_eq!(doc.string_value(a), "hello ");
        assert_eq!(doc.string_value(cd), "world");
    }

    #[test]
    fn test_parse_round_trip() {
        let doc =
            XmlDocument::parse(r#"<root><child id="1">value</child><empty/></root>"#).unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.name(root), "root");
        assert_eq!(doc.children(root).len(), 2);
        assert_eq!(
            doc.to_xml(),
            r#"<root><child id="1">value</child><empty/></root>"#
        );
    }

    #[test]
    fn test_parse_cdata_and_pi() {
        let doc = XmlDocument::parse(
            "<root><?xml-stylesheet href=\"a.css\"?><![CDATA[<raw>]]></root>",
        )
        .unwrap();
        let root = doc.root_element().unwrap();
        let children = doc.children(root).to_vec();
        assert_eq!(doc.kind(children[0]), NodeKind::ProcessingInstruction);
        assert_eq!(doc.name(children[0]), "xml-stylesheet");
        assert_eq!(doc.kind(children[1]), NodeKind::CData);
        assert_eq!(doc.text(children[1]), "<raw>");
        assert!(doc.to_xml().contains("<![CDATA[<raw>]]>"));
    }

    #[test]
    fn test_parse_skips_whitespace_text() {
        let doc = XmlDocument::parse("<root>\n  <a/>\n  <b/>\n</root>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.children(root).len(), 2);
    }

    #[test]
    fn test_parse_unclosed_element_fails() {
        let err = XmlDocument::parse("<root><a>").unwrap_err();
        assert!(matches!(err, XmlError::Malformed(_)));
    }

    #[test]
    fn test_escaping() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(doc.document_node(), root);
        doc.set_attribute(root, "q", "a\"b<c");
        let t = doc.create_text("1 < 2 & 3 > 2");
        doc.append_child(root, t);

        assert_eq!(
            doc.to_xml(),
            r#"<root q="a&quot;b&lt;c">1 &lt; 2 &amp; 3 &gt; 2</root>"#
        );
    }
}
