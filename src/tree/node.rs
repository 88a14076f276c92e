//! # Node 模块
//!
//! arena 节点的紧凑表示。

/// 节点句柄
///
/// arena 中的稳定索引。只在发放它的 [`XmlDocument`](super::XmlDocument)
/// 上有效，文档从不回收节点，句柄不会悬空。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 文档节点（arena 的 0 号位，整棵树的锚点）
    Document,
    /// 元素
    Element,
    /// 文本
    Text,
    /// CDATA 段
    CData,
    /// 处理指令
    ProcessingInstruction,
    /// 注释
    Comment,
}

impl NodeKind {
    /// 类型名，用于错误信息
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Element => "element",
            NodeKind::Text => "text",
            NodeKind::CData => "cdata",
            NodeKind::ProcessingInstruction => "processing-instruction",
            NodeKind::Comment => "comment",
        }
    }
}

/// arena 中的一个节点
///
/// `name` 对元素是标签名、对处理指令是 target，其余类型为空；
/// `value` 对文本 / CDATA / 注释是内容、对处理指令是 data。
#[derive(Debug, Clone)]
pub(crate) struct XmlNode {
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl XmlNode {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: String::new(),
            value: String::new(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}
