//! # Engine 模块
//!
//! [`Xembler`] 把一段指令序列应用到文档上：
//! 初始游标指向根元素（文档为空时指向文档节点），
//! 逐条执行，第一条失败的指令中止整段执行，已生效的改动不回滚。

use crate::cursor::Cursor;
use crate::directive::Directives;
use crate::error::XemblyResult;
use crate::runtime::execute;
use crate::tree::XmlDocument;

/// 指令序列执行器
#[derive(Debug, Clone)]
pub struct Xembler {
    directives: Directives,
}

impl Xembler {
    pub fn new(directives: Directives) -> Self {
        Self { directives }
    }

    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// 把指令序列应用到已有文档
    ///
    /// # 返回
    ///
    /// 成功为 `()`；失败时返回第一条出错指令的错误，
    /// 该指令之前的改动保留在文档中，之后的指令不再执行。
    pub fn apply(&self, doc: &mut XmlDocument) -> XemblyResult<()> {
        let mut cursor = Cursor::new();
        let initial = doc.root_element().unwrap_or_else(|| doc.document_node());
        cursor.set(vec![initial]);

        for directive in &self.directives {
            execute(doc, &mut cursor, directive)?;
        }
        Ok(())
    }

    /// 从空文档构建
    pub fn document(&self) -> XemblyResult<XmlDocument> {
        let mut doc = XmlDocument::new();
        self.apply(&mut doc)?;
        Ok(doc)
    }

    /// 从空文档构建并序列化
    pub fn xml(&self) -> XemblyResult<String> {
        Ok(self.document()?.to_xml())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CursorError, XemblyError};

    #[test]
    fn test_build_from_script() {
        let directives =
            Directives::from_script("ADD 'root'; ADD 'child'; ATTR 'id', '1'; SET 'value';")
                .unwrap();
        let xml = Xembler::new(directives).xml().unwrap();
        assert!(xml.contains(r#"<root><child id="1">value</child></root>"#));
    }

    #[test]
    fn test_build_from_builder() {
        let directives = Directives::new()
            .add("orders")
            .unwrap()
            .add("order")
            .unwrap()
            .attr("id", "553")
            .unwrap()
            .set("$140.00");
        let xml = Xembler::new(directives).xml().unwrap();
        insta::assert_snapshot!(xml, @r#"<orders><order id="553">$140.00</order></orders>"#);
    }

    #[test]
    fn test_apply_to_existing_document() {
        let mut doc = XmlDocument::parse("<root><a/></root>").unwrap();
        let directives = Directives::new().add("b").unwrap();
        Xembler::new(directives).apply(&mut doc).unwrap();
        assert_eq!(doc.to_xml(), "<root><a/><b/></root>");
    }

    #[test]
    fn test_initial_cursor_is_document_node_when_empty() {
        // 空文档上 UP 立即失败：文档节点没有父节点
        let directives = Directives::new().up();
        let err = Xembler::new(directives).document().unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Cursor(CursorError::NoParent {
                directive: "UP",
                ..
            })
        ));
    }

    #[test]
    fn test_push_pop_restores_position() {
        let directives = Directives::new()
            .add("root")
            .unwrap()
            .push()
            .add("a")
            .unwrap()
            .pop()
            .add("b")
            .unwrap();
        let xml = Xembler::new(directives).xml().unwrap();
        // a 先于 b
        assert!(xml.contains("<root><a/><b/></root>"));
    }

    #[test]
    fn test_add_if_idempotent_end_to_end() {
        let directives = Directives::new()
            .add("config")
            .unwrap()
            .add_if("setting")
            .unwrap()
            .set("v")
            .up()
            .add_if("setting")
            .unwrap();
        let doc = Xembler::new(directives).document().unwrap();
        let config = doc.root_element().unwrap();
        assert_eq!(doc.children(config).len(), 1);
        assert_eq!(doc.string_value(config), "v");
    }

    #[test]
    fn test_failure_keeps_earlier_changes() {
        let mut doc = XmlDocument::new();
        let directives = Directives::new()
            .add("root")
            .unwrap()
            .strict(99)
            .set("never");
        let result = Xembler::new(directives).apply(&mut doc);
        assert!(result.is_err());
        // STRICT 之前的 ADD 已生效，之后的 SET 未执行
        let root = doc.root_element().unwrap();
        assert_eq!(doc.name(root), "root");
        assert_eq!(doc.string_value(root), "");
    }

    #[test]
    fn test_cdata_and_pi_serialization() {
        let directives = Directives::new()
            .add("doc")
            .unwrap()
            .pi("xml-stylesheet", "href='a.css'")
            .unwrap()
            .add("code")
            .unwrap()
            .cdata("if (a < b) { }");
        let xml = Xembler::new(directives).xml().unwrap();
        insta::assert_snapshot!(
            xml,
            @"<doc><?xml-stylesheet href='a.css'?><code><![CDATA[if (a < b) { }]]></code></doc>"
        );
    }

    #[test]
    fn test_xpath_navigation_end_to_end() {
        let script = "ADD 'root'; ADD 'a'; ATTR 'k', '1'; UP; ADD 'a'; ATTR 'k', '2'; UP; \
                      XPATH 'a[@k=\"2\"]'; SET 'picked';";
        let directives = Directives::from_script(script).unwrap();
        let xml = Xembler::new(directives).xml().unwrap();
        assert!(xml.contains(r#"<a k="2">picked</a>"#));
        assert!(xml.contains(r#"<a k="1"/>"#));
    }

    #[test]
    fn test_same_directives_apply_to_many_documents() {
        let directives = Directives::new().add("x").unwrap();
        let xembler = Xembler::new(directives);
        let first = xembler.xml().unwrap();
        let second = xembler.xml().unwrap();
        assert_eq!(first, second);
    }
}
