//! Tool call parser.
//!
//! Extracts tool invocations from free-form model output. Two block
//! syntaxes are recognised:
//!
//! ```text
//! <invoke name="saveNote">
//!   <parameter name="title">Cake</parameter>
//!   <parameter name="tags">baking, dessert</parameter>
//! </invoke>
//!
//! <call>saveNote(title="Cake", tags="baking, dessert")</call>
//! ```
//!
//! Grammar (informal):
//! ```text
//! response  = { text | block }
//! block     = invoke | call
//! invoke    = "<invoke" attrs ( "/>" | ">" { ws | parameter | text } "</invoke>" )
//! parameter = "<parameter" attrs ( "/>" | ">" value "</parameter>" )
//! attrs     = { ws IDENT ws? "=" ws? QUOTED }
//! value     = CDATA | text            ; entities decoded, trimmed
//! call      = "<call>" IDENT "(" [ arg { "," arg } ] ")" "</call>"
//! arg       = IDENT "=" STRING        ; \" \\ \n \t escapes
//! ```
//!
//! Values are kept as raw strings. Whether `tags` is a list is decided by
//! the tool's schema at execution time, not here.

use filvyn_core::tool::ToolCall;
use tracing::{debug, warn};

/// Why a response could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated <{tag}> starting at byte {offset}")]
    Unterminated { tag: &'static str, offset: usize },

    #[error("<{tag}> at byte {offset} has no name")]
    MissingName { tag: &'static str, offset: usize },

    #[error("malformed attribute at byte {offset}")]
    BadAttribute { offset: usize },

    #[error("malformed call at byte {offset}: {reason}")]
    BadCall { offset: usize, reason: &'static str },
}

/// Parse every tool call in `text`.
///
/// Never fails: a malformed response is logged and yields no calls.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    match try_parse_tool_calls(text) {
        Ok(calls) => {
            if calls.is_empty() {
                warn!(response_len = text.len(), "Model response contains no tool calls");
            } else {
                debug!(count = calls.len(), "Parsed tool calls");
            }
            calls
        }
        Err(e) => {
            warn!(error = %e, response_len = text.len(), "Malformed tool call markup, ignoring response");
            Vec::new()
        }
    }
}

/// Parse every tool call in `text`, reporting the first malformed block.
pub fn try_parse_tool_calls(text: &str) -> Result<Vec<ToolCall>, ParseError> {
    let mut scanner = Scanner::new(text);
    let mut calls = Vec::new();

    while let Some(block) = scanner.next_block() {
        let call = match block {
            Block::Invoke(start) => scanner.invoke(start)?,
            Block::Call(start) => scanner.call(start)?,
        };
        calls.push(call);
    }
    Ok(calls)
}

enum Block {
    Invoke(usize),
    Call(usize),
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// `lit` followed by whitespace, `>` or end of input.
    fn at_tag(&self, lit: &str) -> bool {
        self.rest()
            .strip_prefix(lit)
            .is_some_and(|after| after.chars().next().is_none_or(|c| c == '>' || c.is_whitespace()))
    }

    /// Consume everything up to and including `lit`, returning what came before it.
    fn take_until(&mut self, lit: &str) -> Option<&'a str> {
        let rest = self.rest();
        let idx = rest.find(lit)?;
        self.pos += idx + lit.len();
        Some(&rest[..idx])
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_alphanumeric() || c == '_' || (i > 0 && (c == '-' || c == '.'))))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    /// Skip prose up to the start of the next block.
    fn next_block(&mut self) -> Option<Block> {
        while !self.at_end() {
            let idx = self.rest().find('<')?;
            self.pos += idx;
            let start = self.pos;
            if self.at_tag("<invoke") {
                self.pos += "<invoke".len();
                return Some(Block::Invoke(start));
            }
            if self.eat("<call>") {
                return Some(Block::Call(start));
            }
            self.bump();
        }
        None
    }

    /// Attributes up to the end of the start tag. The flag is set when the
    /// tag closes itself with `/>`.
    fn attrs(&mut self, tag: &'static str, start: usize) -> Result<(Vec<(&'a str, String)>, bool), ParseError> {
        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(">") {
                return Ok((attrs, false));
            }
            if self.eat("/>") {
                return Ok((attrs, true));
            }
            if self.at_end() {
                return Err(ParseError::Unterminated { tag, offset: start });
            }
            let offset = self.pos;
            let name = self.ident().ok_or(ParseError::BadAttribute { offset })?;
            self.skip_ws();
            if !self.eat("=") {
                return Err(ParseError::BadAttribute { offset });
            }
            self.skip_ws();
            let quote = match self.peek() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(ParseError::BadAttribute { offset }),
            };
            self.bump();
            let mut buf = [0u8; 4];
            let value = self
                .take_until(quote.encode_utf8(&mut buf))
                .ok_or(ParseError::Unterminated { tag, offset: start })?;
            attrs.push((name, decode_entities(value)));
        }
    }

    fn name_attr(
        &mut self,
        tag: &'static str,
        start: usize,
    ) -> Result<(String, bool), ParseError> {
        let (attrs, self_closing) = self.attrs(tag, start)?;
        let name = attrs
            .into_iter()
            .find(|(k, _)| *k == "name")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ParseError::MissingName { tag, offset: start })?;
        Ok((name, self_closing))
    }

    fn invoke(&mut self, start: usize) -> Result<ToolCall, ParseError> {
        let (name, self_closing) = self.name_attr("invoke", start)?;
        let mut call = ToolCall::new(name);
        if self_closing {
            return Ok(call);
        }

        loop {
            self.skip_ws();
            if self.eat("</invoke>") {
                return Ok(call);
            }
            if self.at_end() {
                return Err(ParseError::Unterminated { tag: "invoke", offset: start });
            }
            if self.at_tag("<parameter") {
                let param_start = self.pos;
                self.pos += "<parameter".len();
                let (name, value) = self.parameter(param_start)?;
                if !value.is_empty() {
                    call.params.insert(name, value);
                }
                continue;
            }
            // Stray text between parameters
            self.bump();
            match self.rest().find('<') {
                Some(idx) => self.pos += idx,
                None => self.pos = self.src.len(),
            }
        }
    }

    fn parameter(&mut self, start: usize) -> Result<(String, String), ParseError> {
        const TAG: &str = "parameter";
        let (name, self_closing) = self.name_attr(TAG, start)?;
        if self_closing {
            return Ok((name, String::new()));
        }
        let unterminated = ParseError::Unterminated { tag: TAG, offset: start };

        let body_start = self.pos;
        self.skip_ws();
        if self.eat("<![CDATA[") {
            let value = self.take_until("]]>").ok_or(unterminated.clone())?;
            self.skip_ws();
            if !self.eat("</parameter>") {
                return Err(unterminated);
            }
            return Ok((name, value.to_string()));
        }

        self.pos = body_start;
        let raw = self.take_until("</parameter>").ok_or(unterminated)?;
        Ok((name, decode_entities(raw).trim().to_string()))
    }

    fn call(&mut self, start: usize) -> Result<ToolCall, ParseError> {
        let bad = |reason| ParseError::BadCall { offset: start, reason };

        self.skip_ws();
        let name = self.ident().ok_or(bad("missing tool name"))?;
        let mut call = ToolCall::new(name);
        self.skip_ws();
        if !self.eat("(") {
            return Err(bad("expected '('"));
        }

        self.skip_ws();
        if !self.eat(")") {
            loop {
                self.skip_ws();
                let key = self.ident().ok_or(bad("expected argument name"))?;
                self.skip_ws();
                if !self.eat("=") {
                    return Err(bad("expected '='"));
                }
                self.skip_ws();
                let value = self.string().ok_or(bad("unterminated string"))?;
                if !value.is_empty() {
                    call.params.insert(key.to_string(), value);
                }
                self.skip_ws();
                if self.eat(",") {
                    continue;
                }
                if self.eat(")") {
                    break;
                }
                return Err(bad("expected ',' or ')'"));
            }
        }

        self.skip_ws();
        if !self.eat("</call>") {
            return Err(ParseError::Unterminated { tag: "call", offset: start });
        }
        Ok(call)
    }

    /// A double-quoted string with backslash escapes.
    fn string(&mut self) -> Option<String> {
        if !self.eat("\"") {
            return None;
        }
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Some(out);
                }
                '\\' => {
                    let (_, escaped) = chars.next()?;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
        None
    }
}

/// Decode the five predefined XML entities. Anything else is left as is.
fn decode_entities(s: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&amp;", '&'),
    ];

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, params: &[(&str, &str)]) -> ToolCall {
        params
            .iter()
            .fold(ToolCall::new(name), |c, (k, v)| c.with_param(*k, *v))
    }

    #[test]
    fn single_invoke() {
        let text = r#"<invoke name="saveNote">
    <parameter name="title">Cake</parameter>
    <parameter name="content">flour, sugar</parameter>
  </invoke>"#;
        assert_eq!(
            parse_tool_calls(text),
            vec![call("saveNote", &[("title", "Cake"), ("content", "flour, sugar")])]
        );
    }

    #[test]
    fn multiple_blocks_keep_source_order() {
        let text = r#"Sure, let me help.
<invoke name="reassureUser"><parameter name="message">On it</parameter></invoke>
Some prose in between.
<invoke name="searchNotes"><parameter name="query">cake</parameter></invoke>
<invoke name="complete"></invoke>"#;
        let calls = parse_tool_calls(text);
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["reassureUser", "searchNotes", "complete"]);
        assert!(calls[2].params.is_empty());
    }

    #[test]
    fn no_blocks_is_empty() {
        assert!(parse_tool_calls("").is_empty());
        assert!(parse_tool_calls("I saved your note!").is_empty());
        assert!(parse_tool_calls("a < b and <b>bold</b>").is_empty());
    }

    #[test]
    fn comma_values_are_not_split() {
        let text = r#"<invoke name="saveNote"><parameter name="tags">a,b, c</parameter></invoke>"#;
        assert_eq!(parse_tool_calls(text)[0].params["tags"], "a,b, c");
    }

    #[test]
    fn values_are_trimmed_and_decoded() {
        let text = r#"<invoke name="replyUser">
    <parameter name="message">
        Use `a &lt; b` &amp; &quot;quotes&quot; &unknown;
    </parameter>
</invoke>"#;
        assert_eq!(
            parse_tool_calls(text)[0].params["message"],
            r#"Use `a < b` & "quotes" &unknown;"#
        );
    }

    #[test]
    fn cdata_is_verbatim() {
        let text = "<invoke name=\"saveNote\"><parameter name=\"content\"><![CDATA[  <b>x</b> &amp; y\n]]></parameter></invoke>";
        assert_eq!(parse_tool_calls(text)[0].params["content"], "  <b>x</b> &amp; y\n");
    }

    #[test]
    fn empty_parameters_are_dropped() {
        let text = r#"<invoke name="listNotes"><parameter name="tag">   </parameter></invoke>"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].params.is_empty());
    }

    #[test]
    fn single_quoted_and_spaced_attributes() {
        let text = "<invoke  name = 'viewNote' ><parameter name='cid'>baga1</parameter></invoke>";
        assert_eq!(parse_tool_calls(text), vec![call("viewNote", &[("cid", "baga1")])]);
    }

    #[test]
    fn unknown_names_pass_through() {
        let text = r#"<invoke name="launchRocket"><parameter name="fuel">lots</parameter></invoke>"#;
        assert_eq!(parse_tool_calls(text), vec![call("launchRocket", &[("fuel", "lots")])]);
    }

    #[test]
    fn multibyte_content() {
        let text = r#"<invoke name="saveNote"><parameter name="title">番茄炒鸡蛋食谱</parameter><parameter name="tags">食谱, 烹饪</parameter></invoke>"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls[0].params["title"], "番茄炒鸡蛋食谱");
        assert_eq!(calls[0].params["tags"], "食谱, 烹饪");
    }

    #[test]
    fn legacy_call_syntax() {
        let text = r#"<call>search(query="测试")</call><call>saveNote(title="Say \"hi\"", tags="a,b,c")</call>"#;
        assert_eq!(
            parse_tool_calls(text),
            vec![
                call("search", &[("query", "测试")]),
                call("saveNote", &[("title", "Say \"hi\""), ("tags", "a,b,c")]),
            ]
        );
    }

    #[test]
    fn legacy_call_with_multiline_content() {
        let text = "<call>saveNote(title=\"Recipe\", content=\"### Steps\n\n1. Mix\\n2. Bake\")</call>";
        assert_eq!(
            parse_tool_calls(text)[0].params["content"],
            "### Steps\n\n1. Mix\n2. Bake"
        );
    }

    #[test]
    fn legacy_call_without_args() {
        assert_eq!(parse_tool_calls("<call>complete()</call>"), vec![call("complete", &[])]);
    }

    #[test]
    fn self_closing_invoke() {
        assert_eq!(
            try_parse_tool_calls(r#"<invoke name="complete"/>"#),
            Ok(vec![call("complete", &[])])
        );
        assert_eq!(
            try_parse_tool_calls(r#"<invoke name="complete" />"#),
            Ok(vec![call("complete", &[])])
        );
    }

    #[test]
    fn self_closing_invoke_after_a_full_one() {
        let text = "<invoke name=\"replyUser\"><parameter name=\"message\">Saved!</parameter></invoke>\n<invoke name=\"complete\"/>";
        assert_eq!(
            parse_tool_calls(text),
            vec![call("replyUser", &[("message", "Saved!")]), call("complete", &[])]
        );
    }

    #[test]
    fn self_closing_parameter_is_empty() {
        let text = r#"<invoke name="listNotes"><parameter name="tag"/></invoke>"#;
        assert_eq!(parse_tool_calls(text), vec![call("listNotes", &[])]);
    }

    #[test]
    fn unterminated_invoke_is_malformed() {
        let text = r#"<invoke name="saveNote"><parameter name="title">Cake</parameter>"#;
        assert_eq!(
            try_parse_tool_calls(text),
            Err(ParseError::Unterminated { tag: "invoke", offset: 0 })
        );
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn unterminated_parameter_is_malformed() {
        let text = r#"<invoke name="saveNote"><parameter name="title">Cake</invoke>"#;
        assert!(matches!(
            try_parse_tool_calls(text),
            Err(ParseError::Unterminated { tag: "parameter", .. })
        ));
    }

    #[test]
    fn missing_name_is_malformed() {
        let text = r#"<invoke><parameter name="x">1</parameter></invoke>"#;
        assert!(matches!(
            try_parse_tool_calls(text),
            Err(ParseError::MissingName { tag: "invoke", .. })
        ));
        let text = r#"<invoke name="a"><parameter>1</parameter></invoke>"#;
        assert!(matches!(
            try_parse_tool_calls(text),
            Err(ParseError::MissingName { tag: "parameter", .. })
        ));
    }

    #[test]
    fn one_bad_block_discards_the_response() {
        let text = r#"<invoke name="replyUser"><parameter name="message">hi</parameter></invoke>
<call>saveNote(title="unterminated)</call>"#;
        assert!(matches!(try_parse_tool_calls(text), Err(ParseError::BadCall { .. })));
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn similar_tag_names_are_prose() {
        let text = r#"<invoker name="x"></invoker>"#;
        assert_eq!(try_parse_tool_calls(text), Ok(vec![]));
    }
}
