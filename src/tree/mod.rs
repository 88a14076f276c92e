//! # Tree 模块
//!
//! 树协作方：XML 文档的节点存储、属性、子节点管理与序列化。
//!
//! ## 设计说明
//!
//! 节点集中存放在 arena（`Vec<XmlNode>`）中，对外只发放稳定的
//! [`NodeId`] 句柄；节点本身永远归文档所有，光标与指令只持有句柄。
//! 被 REMOVE 摘除的节点保留在 arena 里，但不再从树上可达。
//!
//! ## 模块结构
//!
//! - `node`: [`NodeId`]、[`NodeKind`]、[`XmlNode`] 定义
//! - `document`: [`XmlDocument`] arena 实现（含解析与序列化）

mod document;
mod node;

pub use document::{XmlDocument, XmlError};
pub use node::{NodeId, NodeKind};
