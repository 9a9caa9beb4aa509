//! Solution equivalence checking
//!
//! Decides whether a candidate submission matches the canonical solution
//! while ignoring formatting. Both sides go through the same pipeline:
//!
//! 1. Tokenize as JavaScript-like source (words, numbers, strings,
//!    template literals, regex literals, punctuation with longest-match
//!    operators)
//! 2. Drop whitespace, blank lines, indentation and comments
//! 3. Drop statement-terminating semicolons, i.e. every `;` whose innermost
//!    enclosing bracket is not a parenthesis (`for (;;)` keeps its
//!    semicolons, a callback body `{ log(x); }` does not)
//! 4. Erase quote style: `'a'` and `"a"` are the same token, and `\'` or
//!    `\"` inside a string reads as the bare quote
//!
//! A `/` starts a regex literal where an operand is expected (at the start,
//! after an operator or opening bracket, or after keywords such as `return`)
//! and is division otherwise. Regex literals compare verbatim, flags included.
//!
//! The resulting token sequences must match exactly. Identifier renaming is
//! not tolerated: `function f(a, b)` and `function f(x, y)` differ.
//!
//! Unterminated literals or comments, mismatched brackets and characters
//! outside the language are reported as [`NormalizeError`]; callers that only
//! want a verdict use [`is_equivalent`], which reads any failure as "not
//! equivalent".

use thiserror::Error;

/// Reasons a piece of source text cannot be normalized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("Unterminated template literal starting on line {line}")]
    UnterminatedTemplate { line: usize },

    #[error("Unterminated regex literal starting on line {line}")]
    UnterminatedRegex { line: usize },

    #[error("Unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("Unexpected '{found}' on line {line}")]
    UnbalancedBracket { found: char, line: usize },

    #[error("Unclosed '{open}' opened on line {line}")]
    UnclosedBracket { open: char, line: usize },

    #[error("Unexpected character '{ch}' on line {line}")]
    UnexpectedChar { ch: char, line: usize },
}

/// A normalized token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier or keyword
    Word(String),
    /// Numeric literal, compared verbatim
    Number(String),
    /// Body of a single- or double-quoted string
    Str(String),
    /// Body of a template literal
    Template(String),
    /// Regex literal with its slashes and flags
    Regex(String),
    /// Operator or punctuation
    Punct(&'static str),
}

/// Operators, longest first so the scanner can take the first match
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", ".", "<", ">", "+",
    "-", "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", "@", "#",
];

/// Keywords after which a `/` begins a regex literal
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Whether `candidate` is equivalent to `solution`
///
/// Never fails: text that cannot be normalized is simply not equivalent.
pub fn is_equivalent(candidate: &str, solution: &str) -> bool {
    try_equivalent(candidate, solution).unwrap_or(false)
}

/// Like [`is_equivalent`], but reports normalization failures
pub fn try_equivalent(candidate: &str, solution: &str) -> Result<bool, NormalizeError> {
    if candidate == solution {
        return Ok(true);
    }
    // A blank submission only matches a blank solution
    if candidate.trim().is_empty() {
        return Ok(solution.trim().is_empty());
    }

    let candidate = normalize(candidate)?;
    let solution = normalize(solution)?;
    Ok(candidate == solution)
}

/// Normalize source text into its comparable token sequence
pub fn normalize(source: &str) -> Result<Vec<Token>, NormalizeError> {
    let tokens = Scanner::new(source).scan()?;

    let mut open: Vec<&'static str> = Vec::new();
    let mut normalized = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Punct(bracket @ ("(" | "[" | "{")) => open.push(bracket),
            Token::Punct(")" | "]" | "}") => {
                open.pop();
            }
            Token::Punct(";") if open.last() != Some(&"(") => continue,
            _ => {}
        }
        normalized.push(token);
    }

    Ok(normalized)
}

/// Single-pass tokenizer with bracket balancing
struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    rest: &'a str,
    line: usize,
    brackets: Vec<(char, usize)>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            rest: source,
            line: 1,
            brackets: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.rest = &self.rest[ch.len_utf8()..];
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn scan(mut self) -> Result<Vec<Token>, NormalizeError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if self.rest.starts_with("//") {
                self.skip_line_comment();
            } else if self.rest.starts_with("/*") {
                self.skip_block_comment()?;
            } else if ch == '/' && regex_allowed(tokens.last()) {
                tokens.push(self.regex()?);
            } else if ch == '\'' || ch == '"' {
                tokens.push(self.string(ch)?);
            } else if ch == '`' {
                tokens.push(self.template()?);
            } else if ch.is_ascii_digit() {
                tokens.push(Token::Number(self.take_while(is_number_char)));
            } else if is_word_start(ch) {
                tokens.push(Token::Word(self.take_while(is_word_char)));
            } else {
                tokens.push(self.punct()?);
            }
        }

        if let Some((open, line)) = self.brackets.pop() {
            return Err(NormalizeError::UnclosedBracket { open, line });
        }

        Ok(tokens)
    }

    fn take_while(&mut self, pred: fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            out.push(ch);
            self.bump();
        }
        out
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), NormalizeError> {
        let line = self.line;
        self.bump();
        self.bump();
        loop {
            if self.rest.starts_with("*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(NormalizeError::UnterminatedComment { line });
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, NormalizeError> {
        let line = self.line;
        self.bump();
        let mut body = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => return Ok(Token::Str(body)),
                Some('\\') => match self.bump() {
                    Some(escaped @ ('\'' | '"')) => body.push(escaped),
                    Some(escaped) => {
                        body.push('\\');
                        body.push(escaped);
                    }
                    None => return Err(NormalizeError::UnterminatedString { line }),
                },
                Some('\n') | None => return Err(NormalizeError::UnterminatedString { line }),
                Some(ch) => body.push(ch),
            }
        }
    }

    fn template(&mut self) -> Result<Token, NormalizeError> {
        let line = self.line;
        self.bump();
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('`') => return Ok(Token::Template(body)),
                Some('\\') => {
                    body.push('\\');
                    match self.bump() {
                        Some(escaped) => body.push(escaped),
                        None => return Err(NormalizeError::UnterminatedTemplate { line }),
                    }
                }
                Some(ch) => body.push(ch),
                None => return Err(NormalizeError::UnterminatedTemplate { line }),
            }
        }
    }

    fn regex(&mut self) -> Result<Token, NormalizeError> {
        let line = self.line;
        self.bump();
        let mut body = String::from("/");
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('\n') | None => return Err(NormalizeError::UnterminatedRegex { line }),
                    Some(escaped) => {
                        body.push('\\');
                        body.push(escaped);
                    }
                },
                Some('/') if !in_class => break,
                Some('\n') | None => return Err(NormalizeError::UnterminatedRegex { line }),
                Some(ch) => {
                    match ch {
                        '[' => in_class = true,
                        ']' => in_class = false,
                        _ => {}
                    }
                    body.push(ch);
                }
            }
        }
        body.push('/');
        body.push_str(&self.take_while(is_word_char));
        Ok(Token::Regex(body))
    }

    fn punct(&mut self) -> Result<Token, NormalizeError> {
        let line = self.line;
        let Some(op) = PUNCTUATORS.iter().copied().find(|op| self.rest.starts_with(op)) else {
            let ch = self.peek().unwrap_or('\0');
            return Err(NormalizeError::UnexpectedChar { ch, line });
        };

        for _ in 0..op.chars().count() {
            self.bump();
        }

        match op {
            "(" | "[" | "{" => self.brackets.push((op.chars().next().unwrap_or('('), line)),
            ")" | "]" | "}" => {
                let found = op.chars().next().unwrap_or(')');
                let expected = match found {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => return Err(NormalizeError::UnbalancedBracket { found, line }),
                }
            }
            _ => {}
        }

        Ok(Token::Punct(op))
    }
}

/// Whether a `/` following `prev` starts a regex rather than a division
fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(Token::Punct(op)) => !matches!(*op, ")" | "]" | "++" | "--"),
        Some(Token::Word(word)) => REGEX_KEYWORDS.contains(&word.as_str()),
        Some(_) => false,
    }
}

fn is_word_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphabetic()
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphanumeric()
}

fn is_number_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '.' || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_equivalent() {
        for s in ["", "x", "function f(a,b){return a+b}", "'unterminated", "{{{"] {
            assert!(is_equivalent(s, s), "{s:?} should equal itself");
        }
    }

    #[test]
    fn test_reflowed_submission_accepted() {
        assert!(is_equivalent(
            "function f(a, b) { return a + b; }",
            "function f(a,b){return a+b}"
        ));
        assert!(is_equivalent(
            "function f(a,b){\n\n    return a+b;\n}\n",
            "function f(a, b) {\n  return a + b\n}"
        ));
    }

    #[test]
    fn test_logic_change_rejected() {
        assert!(!is_equivalent(
            "function f(a, b) { return a - b; }",
            "function f(a,b){return a+b}"
        ));
        assert!(!is_equivalent(
            "function f(a,b){}",
            "function f(a,b){return a+b}"
        ));
    }

    #[test]
    fn test_identifier_renaming_rejected() {
        assert!(!is_equivalent(
            "function f(x, y) { return x + y }",
            "function f(a, b) { return a + b }"
        ));
    }

    #[test]
    fn test_comments_ignored() {
        assert!(is_equivalent(
            "// add them\nfunction f(a,b){ /* sum */ return a+b }",
            "function f(a,b){return a+b}"
        ));
    }

    #[test]
    fn test_quote_style_ignored() {
        assert!(is_equivalent("log('hi')", "log(\"hi\")"));
        assert!(!is_equivalent("log('hi')", "log('ho')"));
        assert!(!is_equivalent("log(`hi`)", "log('hi')"));
    }

    #[test]
    fn test_semicolons_inside_parens_are_significant() {
        assert!(!is_equivalent(
            "for (i = 0; i < n; i++) {}",
            "for (i = 0, i < n, i++) {}"
        ));
        assert!(is_equivalent(
            "for (i = 0; i < n; i++) { x++; };",
            "for (i = 0; i < n; i++) { x++ }"
        ));
    }

    #[test]
    fn test_semicolons_in_callback_bodies_ignored() {
        assert!(is_equivalent(
            "xs.forEach(x => { log(x); });",
            "xs.forEach(x => { log(x) })"
        ));
        assert!(is_equivalent(
            "promise.then(() => {\n  log('a');\n  log('b');\n})",
            "promise.then(() => {\n  log('a')\n  log('b')\n})"
        ));
        assert!(is_equivalent(
            "setTimeout(() => { done(); }, 10);",
            "setTimeout(()=>{done()},10)"
        ));
        assert!(!is_equivalent("f(a; b)", "f(a b)"));
    }

    #[test]
    fn test_regex_literals() {
        assert_eq!(
            try_equivalent("s.replace(/'/g, '')", "s.replace( /'/g, '' );"),
            Ok(true)
        );
        assert!(normalize("const open = /[(]/.test(s)").is_ok());
        assert!(is_equivalent(
            "if (/a\\/b/.test(p)) { return /x/i }",
            "if ( /a\\/b/.test(p) ) {\n  return /x/i;\n}"
        ));
        assert!(!is_equivalent("s.match(/a/g)", "s.match(/a/i)"));
        assert_eq!(
            normalize("let r = /abc").unwrap_err(),
            NormalizeError::UnterminatedRegex { line: 1 }
        );
    }

    #[test]
    fn test_slash_after_operand_is_division() {
        assert!(is_equivalent("total = (a + b) / 2 / n", "total=(a+b)/2/n"));
        assert_eq!(
            normalize("x / y").unwrap(),
            vec![
                Token::Word("x".to_string()),
                Token::Punct("/"),
                Token::Word("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_escaped_quotes_match_other_quote_style() {
        assert!(is_equivalent("s = 'it\\'s'", "s = \"it's\""));
        assert!(is_equivalent("s = \"say \\\"hi\\\"\"", "s = 'say \"hi\"'"));
        assert!(is_equivalent("s = 'a\\nb'", "s = \"a\\nb\""));
        assert!(!is_equivalent("s = 'a\\nb'", "s = 'anb'"));
    }

    #[test]
    fn test_blank_candidate_never_matches_non_empty_solution() {
        assert!(!is_equivalent("", "return 1"));
        assert!(!is_equivalent("   \n\t", "return 1"));
        assert!(is_equivalent("  ", ""));
    }

    #[test]
    fn test_operators_use_longest_match() {
        assert!(!is_equivalent("a === b", "a == = b"));
        assert!(is_equivalent("a===b", "a === b"));
        assert!(!is_equivalent("a => b", "a = > b"));
    }

    #[test]
    fn test_whitespace_inside_strings_is_significant() {
        assert!(!is_equivalent("s = 'a b'", "s = 'ab'"));
    }

    #[test]
    fn test_unterminated_string_is_failure() {
        let err = try_equivalent("let s = 'oops", "let s = 'oops'").unwrap_err();
        assert_eq!(err, NormalizeError::UnterminatedString { line: 1 });
        assert!(!is_equivalent("let s = 'oops", "let s = 'oops'"));
    }

    #[test]
    fn test_unbalanced_brackets_are_failure() {
        assert!(matches!(
            normalize("function f() { return (1 }"),
            Err(NormalizeError::UnbalancedBracket { found: '}', line: 1 })
        ));
        assert!(matches!(
            normalize("if (x) {\n  y()\n"),
            Err(NormalizeError::UnclosedBracket { open: '{', line: 1 })
        ));
    }

    #[test]
    fn test_unterminated_comment_is_failure() {
        assert_eq!(
            normalize("a\n/* never closed").unwrap_err(),
            NormalizeError::UnterminatedComment { line: 2 }
        );
    }

    #[test]
    fn test_malformed_solution_is_not_equivalent() {
        assert!(!is_equivalent("return 1", "return (1"));
    }

    #[test]
    fn test_normalize_drops_statement_semicolons() {
        let tokens = normalize("a;\nb;").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Word("a".to_string()), Token::Word("b".to_string())]
        );
    }

    #[test]
    fn test_deterministic() {
        let a = "const xs = [1, 2, 3].map(n => n * 2);";
        let b = "const xs=[1,2,3].map(n=>n*2)";
        let first = is_equivalent(a, b);
        for _ in 0..10 {
            assert_eq!(is_equivalent(a, b), first);
        }
        assert!(first);
    }
}
