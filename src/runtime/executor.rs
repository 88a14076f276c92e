//! # Executor 模块
//!
//! 单条指令的执行语义。每条指令先检查前置条件（游标非空、节点类型、
//! 父节点存在等），再对树和游标施加效果。
//!
//! 去重规则：`UP` 和 `XPATH` 对聚合输出做首见序去重；
//! `ADD` / `ADDIF` 等逐节点指令绝不跨输入节点去重，
//! 每个输入节点独立产出自己的结果。

use crate::cursor::Cursor;
use crate::directive::Directive;
use crate::error::{CursorError, DirectiveError, StrictError, XemblyResult};
use crate::tree::{NodeId, NodeKind, XmlDocument};
use crate::xpath;

/// 对 (树, 游标) 执行一条指令
pub(crate) fn execute(
    doc: &mut XmlDocument,
    cursor: &mut Cursor,
    directive: &Directive,
) -> XemblyResult<()> {
    match directive {
        Directive::Add { name } => {
            let nodes = non_empty(cursor, "ADD")?;
            let mut created = Vec::with_capacity(nodes.len());
            for node in nodes {
                let child = doc.create_element(name);
                doc.append_child(node, child);
                created.push(child);
            }
            cursor.set(created);
        }

        Directive::AddIf { name } => {
            let nodes = non_empty(cursor, "ADDIF")?;
            let mut result = Vec::with_capacity(nodes.len());
            for node in nodes {
                // 文档序第一个同名子元素
                let existing = doc
                    .children(node)
                    .iter()
                    .copied()
                    .find(|&c| doc.kind(c) == NodeKind::Element && doc.name(c) == name);
                let child = match existing {
                    Some(c) => c,
                    None => {
                        let c = doc.create_element(name);
                        doc.append_child(node, c);
                        c
                    }
                };
                result.push(child);
            }
            cursor.set(result);
        }

        Directive::Attr { name, value } => {
            let nodes = non_empty(cursor, "ATTR")?;
            for node in nodes {
                require_element(doc, node)?;
                doc.set_attribute(node, name, value);
            }
        }

        Directive::Xattr { name, expression } => {
            let nodes = non_empty(cursor, "XATTR")?;
            for node in nodes {
                require_element(doc, node)?;
                let value = query(doc, node, expression)?;
                doc.set_attribute(node, name, &value);
            }
        }

        Directive::Set { value } => {
            let nodes = non_empty(cursor, "SET")?;
            for node in nodes {
                doc.clear_children(node);
                let text = doc.create_text(value);
                doc.append_child(node, text);
            }
        }

        Directive::Xset { expression } => {
            let nodes = non_empty(cursor, "XSET")?;
            for node in nodes {
                // 先求值后改树：表达式看到的是该节点被改写前的内容
                let value = query(doc, node, expression)?;
                doc.clear_children(node);
                let text = doc.create_text(&value);
                doc.append_child(node, text);
            }
        }

        Directive::Cdata { value } => {
            let nodes = non_empty(cursor, "CDATA")?;
            for node in nodes {
                doc.clear_children(node);
                let cdata = doc.create_cdata(value);
                doc.append_child(node, cdata);
            }
        }

        Directive::Pi { target, data } => {
            let nodes = non_empty(cursor, "PI")?;
            for node in nodes {
                let pi = doc.create_pi(target, data);
                doc.append_child(node, pi);
            }
        }

        Directive::Ns { prefix, uri } => {
            let nodes = non_empty(cursor, "NS")?;
            let attr_name = match prefix {
                Some(p) => format!("xmlns:{p}"),
                None => "xmlns".to_string(),
            };
            for node in nodes {
                require_element(doc, node)?;
                doc.set_attribute(node, &attr_name, uri);
            }
        }

        Directive::Strict { count } => match count {
            Some(expected) => {
                let actual = cursor.count();
                if actual != *expected {
                    return Err(StrictError::CountMismatch {
                        expected: *expected,
                        actual,
                    }
                    .into());
                }
            }
            None => {
                if cursor.is_empty() {
                    return Err(StrictError::EmptyCursor.into());
                }
            }
        },

        Directive::Up => {
            let nodes = non_empty(cursor, "UP")?;
            let mut parents: Vec<NodeId> = Vec::new();
            for node in nodes {
                let parent = doc.parent(node).ok_or_else(|| CursorError::NoParent {
                    directive: "UP",
                    name: node_label(doc, node),
                })?;
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
            cursor.set(parents);
        }

        Directive::Remove => {
            let nodes = non_empty(cursor, "REMOVE")?;
            for node in nodes {
                if doc.parent(node).is_none() {
                    return Err(CursorError::NoParent {
                        directive: "REMOVE",
                        name: node_label(doc, node),
                    }
                    .into());
                }
                doc.detach(node);
            }
            cursor.set(Vec::new());
        }

        Directive::Push => cursor.push(),

        Directive::Pop => cursor.pop()?,

        Directive::Xpath { expression } => {
            let nodes = non_empty(cursor, "XPATH")?;
            let mut selected: Vec<NodeId> = Vec::new();
            for node in nodes {
                let matches = xpath::select_nodes(doc, node, expression).map_err(|source| {
                    DirectiveError::Xpath {
                        expression: expression.clone(),
                        source,
                    }
                })?;
                for m in matches {
                    if !selected.contains(&m) {
                        selected.push(m);
                    }
                }
            }
            cursor.set(selected);
        }
    }

    Ok(())
}

/// 取游标节点集的拷贝，空游标报错
fn non_empty(cursor: &Cursor, directive: &'static str) -> Result<Vec<NodeId>, CursorError> {
    if cursor.is_empty() {
        return Err(CursorError::EmptyCursor { directive });
    }
    Ok(cursor.nodes().to_vec())
}

fn require_element(doc: &XmlDocument, node: NodeId) -> Result<(), DirectiveError> {
    let kind = doc.kind(node);
    if kind != NodeKind::Element {
        return Err(DirectiveError::NotAnElement {
            kind: kind.as_str(),
        });
    }
    Ok(())
}

/// 求值表达式并按标量规则转成字符串
fn query(doc: &XmlDocument, node: NodeId, expression: &str) -> Result<String, DirectiveError> {
    let value = xpath::evaluate(doc, node, expression).map_err(|source| DirectiveError::Xpath {
        expression: expression.to_string(),
        source,
    })?;
    Ok(value.string_value(doc))
}

/// 错误消息用的节点标签：元素用标签名，其余用节点类型名
fn node_label(doc: &XmlDocument, node: NodeId) -> String {
    if doc.kind(node) == NodeKind::Element {
        doc.name(node).to_string()
    } else {
        doc.kind(node).as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XemblyError;

    /// 新建文档并把游标放到人工根元素上
    fn setup(root: &str) -> (XmlDocument, Cursor, NodeId) {
        let mut doc = XmlDocument::new();
        let root_id = doc.create_element(root);
        doc.append_child(doc.document_node(), root_id);
        let mut cursor = Cursor::new();
        cursor.set(vec![root_id]);
        (doc, cursor, root_id)
    }

    fn run(doc: &mut XmlDocument, cursor: &mut Cursor, directive: &Directive) {
        execute(doc, cursor, directive).unwrap();
    }

    // -------------------------------------------------------------------------
    // ADD / ADDIF
    // -------------------------------------------------------------------------

    #[test]
    fn test_add_moves_cursor_to_new_children() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::add("child").unwrap());
        assert_eq!(cursor.count(), 1);
        let child = cursor.nodes()[0];
        assert_eq!(doc.name(child), "child");
        assert_eq!(doc.parent(child), Some(root));
    }

    #[test]
    fn test_add_creates_one_child_per_cursor_node() {
        let (mut doc, mut cursor, root) = setup("root");
        let a1 = doc.create_element("a");
        let a2 = doc.create_element("a");
        doc.append_child(root, a1);
        doc.append_child(root, a2);
        // 游标两个节点，ADD 不跨输入去重，各得一个 b
        cursor.set(vec![a1, a2]);
        run(&mut doc, &mut cursor, &Directive::add("b").unwrap());
        assert_eq!(cursor.count(), 2);
        assert_eq!(doc.parent(cursor.nodes()[0]), Some(a1));
        assert_eq!(doc.parent(cursor.nodes()[1]), Some(a2));
    }

    #[test]
    fn test_add_if_reuses_existing_child() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::add_if("cfg").unwrap());
        let first = cursor.nodes()[0];
        run(&mut doc, &mut cursor, &Directive::Up);
        run(&mut doc, &mut cursor, &Directive::add_if("cfg").unwrap());
        assert_eq!(cursor.nodes()[0], first);
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn test_add_on_empty_cursor_fails() {
        let (mut doc, mut cursor, _) = setup("root");
        cursor.set(vec![]);
        let err = execute(&mut doc, &mut cursor, &Directive::add("x").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Cursor(CursorError::EmptyCursor { directive: "ADD" })
        ));
    }

    // -------------------------------------------------------------------------
    // ATTR / XATTR / NS
    // -------------------------------------------------------------------------

    #[test]
    fn test_attr_sets_and_overwrites() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::attr("id", "1").unwrap());
        run(&mut doc, &mut cursor, &Directive::attr("id", "2").unwrap());
        assert_eq!(doc.attribute(root, "id"), Some("2"));
        assert_eq!(doc.attributes(root).len(), 1);
    }

    #[test]
    fn test_attr_on_text_node_fails() {
        let (mut doc, mut cursor, root) = setup("root");
        let text = doc.create_text("hi");
        doc.append_child(root, text);
        cursor.set(vec![text]);
        let err =
            execute(&mut doc, &mut cursor, &Directive::attr("id", "1").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Directive(DirectiveError::NotAnElement { .. })
        ));
    }

    #[test]
    fn test_xattr_stringifies_number_without_fraction() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::add("a").unwrap());
        run(&mut doc, &mut cursor, &Directive::Up);
        run(&mut doc, &mut cursor, &Directive::add("a").unwrap());
        run(&mut doc, &mut cursor, &Directive::Up);
        run(
            &mut doc,
            &mut cursor,
            &Directive::xattr("total", "count(a)").unwrap(),
        );
        assert_eq!(doc.attribute(root, "total"), Some("2"));
    }

    #[test]
    fn test_xattr_invalid_expression_fails() {
        let (mut doc, mut cursor, _) = setup("root");
        let err = execute(
            &mut doc,
            &mut cursor,
            &Directive::xattr("a", "//[bad").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Directive(DirectiveError::Xpath { .. })
        ));
    }

    #[test]
    fn test_ns_default_and_prefixed() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::ns(None, "http://a"));
        run(
            &mut doc,
            &mut cursor,
            &Directive::ns(Some("x".to_string()), "http://b"),
        );
        assert_eq!(doc.attribute(root, "xmlns"), Some("http://a"));
        assert_eq!(doc.attribute(root, "xmlns:x"), Some("http://b"));
    }

    // -------------------------------------------------------------------------
    // SET / XSET / CDATA / PI
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_replaces_children() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::add("old").unwrap());
        run(&mut doc, &mut cursor, &Directive::Up);
        run(&mut doc, &mut cursor, &Directive::set("text"));
        assert_eq!(doc.children(root).len(), 1);
        assert_eq!(doc.string_value(root), "text");
    }

    #[test]
    fn test_xset_sees_content_before_rewrite() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::set("5"));
        run(
            &mut doc,
            &mut cursor,
            &Directive::xset("number(.) + 1").unwrap(),
        );
        assert_eq!(doc.string_value(root), "6");
    }

    #[test]
    fn test_cdata_replaces_children() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::set("gone"));
        run(&mut doc, &mut cursor, &Directive::cdata("<raw>"));
        let children = doc.children(root);
        assert_eq!(children.len(), 1);
        assert_eq!(doc.kind(children[0]), NodeKind::CData);
        assert_eq!(doc.string_value(root), "<raw>");
    }

    #[test]
    fn test_pi_appends_without_clearing() {
        let (mut doc, mut cursor, root) = setup("root");
        run(&mut doc, &mut cursor, &Directive::set("keep"));
        run(
            &mut doc,
            &mut cursor,
            &Directive::pi("style", "href='a.css'").unwrap(),
        );
        assert_eq!(doc.children(root).len(), 2);
        assert_eq!(doc.string_value(root), "keep");
    }

    // -------------------------------------------------------------------------
    // STRICT
    // -------------------------------------------------------------------------

    #[test]
    fn test_strict_count_mismatch() {
        let (mut doc, mut cursor, _) = setup("root");
        run(&mut doc, &mut cursor, &Directive::Strict { count: Some(1) });
        let err =
            execute(&mut doc, &mut cursor, &Directive::Strict { count: Some(2) }).unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Strict(StrictError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_strict_zero_requires_empty() {
        let (mut doc, mut cursor, _) = setup("root");
        // 非空游标上 STRICT 0 失败
        assert!(
            execute(&mut doc, &mut cursor, &Directive::Strict { count: Some(0) }).is_err()
        );
        cursor.set(vec![]);
        run(&mut doc, &mut cursor, &Directive::Strict { count: Some(0) });
    }

    #[test]
    fn test_strict_no_argument_requires_non_empty() {
        let (mut doc, mut cursor, _) = setup("root");
        run(&mut doc, &mut cursor, &Directive::Strict { count: None });
        cursor.set(vec![]);
        let err =
            execute(&mut doc, &mut cursor, &Directive::Strict { count: None }).unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Strict(StrictError::EmptyCursor)
        ));
    }

    // -------------------------------------------------------------------------
    // UP / REMOVE
    // -------------------------------------------------------------------------

    #[test]
    fn test_up_deduplicates_shared_parent() {
        let (mut doc, mut cursor, root) = setup("root");
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        doc.append_child(root, a);
        doc.append_child(root, b);
        cursor.set(vec![a, b]);
        run(&mut doc, &mut cursor, &Directive::Up);
        assert_eq!(cursor.nodes(), &[root]);
    }

    #[test]
    fn test_up_without_parent_fails() {
        let mut doc = XmlDocument::new();
        let mut cursor = Cursor::new();
        cursor.set(vec![doc.document_node()]);
        let err = execute(&mut doc, &mut cursor, &Directive::Up).unwrap_err();
        assert!(matches!(
            err,
            XemblyError::Cursor(CursorError::NoParent {
                directive: "UP",
                ..
            })
        ));
    }

    #[test]
    fn test_remove_detaches_and_empties_cursor() {
        let (mut doc, mut cursor, root) = setup("root");
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("c");
        doc.append_child(root, a);
        doc.append_child(root, b);
        doc.append_child(root, c);
        cursor.set(vec![b]);
        run(&mut doc, &mut cursor, &Directive::Remove);
        assert!(cursor.is_empty());
        // 剩余兄弟保持原序
        assert_eq!(doc.children(root), &[a, c]);
    }

    // -------------------------------------------------------------------------
    // XPATH
    // -------------------------------------------------------------------------

    #[test]
    fn test_xpath_relocates_cursor() {
        let (mut doc, mut cursor, _) = setup("root");
        run(&mut doc, &mut cursor, &Directive::add("item").unwrap());
        run(&mut doc, &mut cursor, &Directive::attr("id", "1").unwrap());
        run(&mut doc, &mut cursor, &Directive::Up);
        run(&mut doc, &mut cursor, &Directive::add("item").unwrap());
        run(&mut doc, &mut cursor, &Directive::attr("id", "2").unwrap());
        run(&mut doc, &mut cursor, &Directive::Up);

        run(
            &mut doc,
            &mut cursor,
            &Directive::xpath("item[@id='2']").unwrap(),
        );
        assert_eq!(cursor.count(), 1);
        assert_eq!(doc.attribute(cursor.nodes()[0], "id"), Some("2"));
    }

    #[test]
    fn test_xpath_unions_and_deduplicates() {
        let (mut doc, mut cursor, root) = setup("root");
        let a = doc.create_element("item");
        let b = doc.create_element("item");
        doc.append_child(root, a);
        doc.append_child(root, b);
        // 两个输入节点都选中同一批后代
        cursor.set(vec![root, root]);
        run(&mut doc, &mut cursor, &Directive::xpath("item").unwrap());
        assert_eq!(cursor.nodes(), &[a, b]);
    }

    #[test]
    fn test_xpath_may_produce_empty_cursor() {
        let (mut doc, mut cursor, _) = setup("root");
        run(
            &mut doc,
            &mut cursor,
            &Directive::xpath("nothing").unwrap(),
        );
        assert!(cursor.is_empty());
    }
}
