//! # Parser 模块
//!
//! 指令层解析：从扫描器取单词和参数，组装 [`Directive`] 列表。
//!
//! 语法要点：
//!
//! - 指令名大小写不敏感（`add` / `ADD` / `Add` 等价）
//! - 双参指令（`ATTR` / `XATTR` / `PI` / `NS`）的参数间逗号可选
//! - 指令间的分号可选
//! - `STRICT` 的计数参数按数字前瞻识别，缺省为"非空断言"形式

use crate::directive::Directive;
use crate::error::{ArgumentError, ParseError};
use crate::script::scanner::Scanner;

/// 解析脚本文本为指令列表
///
/// # 返回
///
/// 全部指令，或第一个带行列位置的解析错误。
pub fn parse(text: &str) -> Result<Vec<Directive>, ParseError> {
    let mut scanner = Scanner::new(text);
    let mut directives = Vec::new();

    loop {
        scanner.skip_trivia();
        if scanner.is_eof() {
            break;
        }
        let (line, column) = scanner.position();

        // 多余的分隔符直接跳过
        if scanner.eat(';') {
            continue;
        }

        let Some(word) = scanner.word() else {
            // 无法构成单词的字符：定位报错，绝不原地空转
            let ch = scanner.peek().unwrap_or('\0');
            return Err(ParseError::UnexpectedChar { line, column, ch });
        };

        directives.push(parse_directive(&mut scanner, word, line, column)?);

        scanner.skip_trivia();
        scanner.eat(';');
    }

    Ok(directives)
}

/// 解析单条指令（指令名已读出，`line`/`column` 指向指令名起点）
fn parse_directive(
    scanner: &mut Scanner,
    word: String,
    line: usize,
    column: usize,
) -> Result<Directive, ParseError> {
    let positioned = |source: ArgumentError| ParseError::Argument {
        line,
        column,
        source,
    };

    match word.to_ascii_uppercase().as_str() {
        "ADD" => {
            let name = scanner.argument("ADD")?;
            Directive::add(name).map_err(positioned)
        }
        "ADDIF" => {
            let name = scanner.argument("ADDIF")?;
            Directive::add_if(name).map_err(positioned)
        }
        "ATTR" => {
            let name = scanner.argument("ATTR")?;
            scanner.skip_trivia();
            scanner.eat(',');
            let value = scanner.argument("ATTR")?;
            Directive::attr(name, value).map_err(positioned)
        }
        "XATTR" => {
            let name = scanner.argument("XATTR")?;
            scanner.skip_trivia();
            scanner.eat(',');
            let expression = scanner.argument("XATTR")?;
            Directive::xattr(name, expression).map_err(positioned)
        }
        "SET" => Ok(Directive::set(scanner.argument("SET")?)),
        "XSET" => {
            let expression = scanner.argument("XSET")?;
            Directive::xset(expression).map_err(positioned)
        }
        "CDATA" => Ok(Directive::cdata(scanner.argument("CDATA")?)),
        "PI" => {
            let target = scanner.argument("PI")?;
            scanner.skip_trivia();
            scanner.eat(',');
            let data = scanner.argument("PI")?;
            Directive::pi(target, data).map_err(positioned)
        }
        "NS" => {
            let first = scanner.argument("NS")?;
            scanner.skip_trivia();
            if scanner.eat(',') {
                let uri = scanner.argument("NS")?;
                Ok(Directive::ns(Some(first), uri))
            } else {
                Ok(Directive::ns(None, first))
            }
        }
        "STRICT" => {
            scanner.skip_trivia();
            if scanner.peek().is_some_and(|c| c.is_ascii_digit()) {
                let (digit_line, digit_column) = scanner.position();
                let digits = scanner.digits();
                let count = digits.parse().map_err(|_| ParseError::InvalidArgument {
                    line: digit_line,
                    column: digit_column,
                    message: format!("STRICT 计数 '{digits}' 超出范围"),
                })?;
                Ok(Directive::Strict { count: Some(count) })
            } else {
                Ok(Directive::Strict { count: None })
            }
        }
        "UP" => Ok(Directive::Up),
        "REMOVE" => Ok(Directive::Remove),
        "PUSH" => Ok(Directive::Push),
        "POP" => Ok(Directive::Pop),
        "XPATH" => {
            let expression = scanner.argument("XPATH")?;
            Directive::xpath(expression).map_err(positioned)
        }
        _ => Err(ParseError::UnknownDirective {
            line,
            column,
            name: word,
        }),
    }
}
