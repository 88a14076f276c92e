//! # Scanner 模块
//!
//! 词法扫描器：逐字符读取脚本文本，维护 1 起始的行列位置。
//! 注释（`#` 或 `//` 到行尾）在词法层被跳过，不进入指令层。

use crate::error::ParseError;

/// 字符级扫描器
pub(super) struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    pub(super) fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub(super) fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub(super) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// 当前读取位置 (行, 列)
    pub(super) fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// 消费一个字符并更新行列
    pub(super) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// 若下一个字符是 `expected` 则消费之
    pub(super) fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// 跳过空白和注释
    pub(super) fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.skip_to_line_end(),
                Some('/') if self.peek_at(1) == Some('/') => self.skip_to_line_end(),
                _ => break,
            }
        }
    }

    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// 读一个指令名单词（字母、数字、下划线）
    ///
    /// 下一个字符不是单词字符时返回 `None`，不消费任何输入。
    pub(super) fn word(&mut self) -> Option<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() { None } else { Some(out) }
    }

    /// 读一串十进制数字
    pub(super) fn digits(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    /// 读一个参数：引号字符串或裸 token
    ///
    /// 裸 token 读到空白、`,`、`;` 或输入结束为止。
    /// `directive` 只用于缺参错误的报告。
    pub(super) fn argument(&mut self, directive: &str) -> Result<String, ParseError> {
        self.skip_trivia();
        let (line, column) = self.position();

        match self.peek() {
            None => Err(ParseError::ExpectedArgument {
                line,
                column,
                directive: directive.to_string(),
            }),
            Some(quote @ ('\'' | '"')) => self.quoted(quote, line, column),
            Some(_) => {
                let mut out = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == ',' || c == ';' {
                        break;
                    }
                    out.push(c);
                    self.bump();
                }
                if out.is_empty() {
                    return Err(ParseError::ExpectedArgument {
                        line,
                        column,
                        directive: directive.to_string(),
                    });
                }
                Ok(out)
            }
        }
    }

    /// 读引号字符串；`line`/`column` 指向开引号，用于未闭合错误
    fn quoted(&mut self, quote: char, line: usize, column: usize) -> Result<String, ParseError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { line, column }),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(ParseError::UnterminatedString { line, column }),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    // \\ \' \" 及其他字符：取转义后的字符本身
                    Some(escaped) => out.push(escaped),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
