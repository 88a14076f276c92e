//! # Xembly
//!
//! XML 增量构建 / 修改 DSL 的核心解释器库。
//!
//! ## 架构概述
//!
//! `xembly` 是纯逻辑核心，不依赖任何 IO。脚本文本经解析得到指令序列，
//! 指令序列驱动一个带快照栈的游标在文档树上移动并施加修改：
//!
//! ```text
//! 脚本文本 ──parse──► Directives ──Xembler::apply──► XmlDocument
//!                         ▲                │
//!                         │                │ (游标 + 快照栈)
//!                    链式构建 API          ▼
//!                                     序列化 XML
//! ```
//!
//! ## 核心类型
//!
//! - [`Directive`]：十四条原子指令之一
//! - [`Directives`]：指令序列，兼流式构建器
//! - [`Xembler`]：把指令序列应用到文档
//! - [`XmlDocument`]：arena 结构的文档树
//!
//! ## 使用示例
//!
//! ```ignore
//! use xembly::{Directives, Xembler};
//!
//! // 从脚本文本构建
//! let directives = Directives::from_script(
//!     "ADD 'orders'; ADD 'order'; ATTR 'id', '553'; SET '$140.00';",
//! )?;
//! let xml = Xembler::new(directives).xml()?;
//!
//! // 或者用链式 API，二者等价
//! let directives = Directives::new()
//!     .add("orders")?
//!     .add("order")?
//!     .attr("id", "553")?
//!     .set("$140.00");
//! ```
//!
//! ## 模块结构
//!
//! - [`directive`]：指令定义和构建器
//! - [`cursor`]：游标与快照栈
//! - [`script`]：脚本解析（扫描器和指令解析器）
//! - [`runtime`]：执行引擎
//! - [`tree`]：文档树协作方
//! - [`xpath`]：查询协作方
//! - [`error`]：错误类型定义

pub mod cursor;
pub mod directive;
pub mod error;
pub mod runtime;
pub mod script;
pub mod tree;
pub mod xpath;

// 重导出核心类型
pub use cursor::Cursor;
pub use directive::{Directive, Directives};
pub use error::{
    ArgumentError, CursorError, DirectiveError, ParseError, StrictError, XemblyError,
    XemblyResult,
};
pub use runtime::Xembler;
pub use tree::{NodeId, NodeKind, XmlDocument, XmlError};
pub use xpath::{Value, XpathError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        // 验证公共类型都可以正常使用
        let directives = Directives::new().add("root").unwrap().set("hi");
        let xembler = Xembler::new(directives);
        let doc: XmlDocument = xembler.document().unwrap();
        assert_eq!(doc.to_xml(), "<root>hi</root>");

        let _cursor = Cursor::new();
        let _err: XemblyError = StrictError::EmptyCursor.into();
    }
}
