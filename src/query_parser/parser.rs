//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! bool_q    := clause (AND clause | OR clause | clause)*
//! clause    := (REQ | '+')? boosted | (NOT | '!' | '-') boosted
//! boosted   := query ('^' NUMBER)?
//! query     := fields ':' query | '(' bool_q ')' | phrase | range | word
//! fields    := '*' | WORD ('|' WORD)*
//! phrase    := '"' (WORD | '<>' | WORD '|' WORD)* '"' ('~' NUMBER)?
//! range     := ('[' | '{') WORD 'TO'? WORD (']' | '}') | ('[' | '{') WORD '>'
//!            | '<' WORD (']' | '}')? | '<=' WORD | '>' WORD | '>=' WORD
//! word      := WORD ('~' NUMBER?)?
//! ```
//!
//! `AND` makes the clause after it required, and the clause before it when
//! that is the only clause so far. Clauses without an operator are joined
//! with the default operator.

use std::sync::Arc;

use tracing::debug;

use super::lexer::{Lexer, Spanned, Token};
use crate::error::{Result, SegdexError};
use crate::search::{
    BooleanClause, BooleanQuery, FuzzyQuery, MatchAllQuery, Occur, PhraseQuery, PrefixQuery,
    Query, RangeQuery, TermQuery, TermRange, WildcardQuery, DEFAULT_MIN_SIMILARITY,
};
use crate::tokenizer::{Analyzer, Tokenizer};

/// How clauses without an explicit operator combine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DefaultOperator {
    #[default]
    Or,
    And,
}

/// Parses query strings into [`Query`] trees
#[derive(Clone, Debug)]
pub struct QueryParser {
    default_fields: Vec<String>,
    /// Fields `*:` expands to
    all_fields: Vec<String>,
    analyzer: Arc<dyn Analyzer>,
    default_operator: DefaultOperator,
    handle_parse_errors: bool,
    lowercase_wildcards: bool,
}

impl QueryParser {
    pub fn new(default_field: impl Into<String>) -> Self {
        let default_field = default_field.into();
        Self {
            all_fields: vec![default_field.clone()],
            default_fields: vec![default_field],
            analyzer: Arc::new(Tokenizer::default()),
            default_operator: DefaultOperator::Or,
            handle_parse_errors: false,
            lowercase_wildcards: true,
        }
    }

    /// Fields searched by unqualified terms
    pub fn with_default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if !fields.is_empty() {
            self.default_fields = fields;
        }
        self
    }

    /// Fields searched by `*:`
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_default_operator(mut self, operator: DefaultOperator) -> Self {
        self.default_operator = operator;
        self
    }

    /// Fall back to a disjunction of the input's plain terms instead of
    /// failing on malformed input
    pub fn handle_parse_errors(mut self, enabled: bool) -> Self {
        self.handle_parse_errors = enabled;
        self
    }

    pub fn with_lowercase_wildcards(mut self, enabled: bool) -> Self {
        self.lowercase_wildcards = enabled;
        self
    }

    pub fn default_fields(&self) -> &[String] {
        &self.default_fields
    }

    /// Parse `input`; an input without any searchable clause yields an
    /// empty boolean query
    pub fn parse(&self, input: &str) -> Result<Query> {
        match self.parse_strict(input) {
            Ok(query) => Ok(query),
            Err(e) if self.handle_parse_errors => {
                debug!(input, error = %e, "query parse failed, falling back to plain terms");
                Ok(self.plain_terms(input))
            }
            Err(e) => Err(e),
        }
    }

    fn parse_strict(&self, input: &str) -> Result<Query> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut state = ParseState {
            parser: self,
            tokens,
            index: 0,
        };
        let fields = self.default_fields.clone();
        let query = state.parse_bool(&fields)?;
        let trailing = state.current();
        if trailing.token != Token::Eof {
            return Err(SegdexError::parse(
                trailing.position,
                format!("unexpected {}", describe(&trailing.token)),
            ));
        }
        Ok(query.unwrap_or_else(|| Query::Boolean(BooleanQuery::new())))
    }

    fn plain_terms(&self, input: &str) -> Query {
        let cleaned: String = input
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let mut query = BooleanQuery::new();
        for field in &self.default_fields {
            for token in self.analyzer.tokenize(field, &cleaned) {
                query.push(TermQuery::new(field.clone(), token.text), Occur::Should);
            }
        }
        match query.clauses.len() {
            1 => query.clauses.remove(0).query,
            _ => Query::Boolean(query),
        }
    }

    fn term_query(&self, field: &str, word: &str) -> Option<Query> {
        let tokens = self.analyzer.tokenize(field, word);
        match tokens.len() {
            0 => None,
            1 => tokens
                .into_iter()
                .next()
                .map(|token| Query::from(TermQuery::new(field, token.text))),
            _ => {
                let first = tokens[0].position;
                let mut phrase = PhraseQuery::new(field);
                for token in tokens {
                    phrase.push_at(vec![token.text], token.position - first);
                }
                Some(phrase.into())
            }
        }
    }

    fn fuzzy_query(&self, field: &str, word: &str, min_similarity: f32) -> Option<Query> {
        let token = self.analyzer.tokenize(field, word).into_iter().next()?;
        Some(
            FuzzyQuery::new(field, token.text)
                .with_min_similarity(min_similarity)
                .into(),
        )
    }

    fn wildcard_query(&self, field: &str, pattern: &str) -> Query {
        if pattern == "*" {
            return MatchAllQuery::new().into();
        }
        let pattern = if self.lowercase_wildcards {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        match pattern.strip_suffix('*') {
            Some(prefix) if !prefix.contains(['*', '?']) => PrefixQuery::new(field, prefix).into(),
            _ => WildcardQuery::new(field, pattern.as_str()).into(),
        }
    }

    /// Phrase content: words, `a|b` alternatives and `<>` gaps
    fn phrase_query(&self, field: &str, content: &str, slop: u32) -> Option<Query> {
        let mut phrase = PhraseQuery::new(field).with_slop(slop);
        let mut position = 0u32;
        for part in content.split_whitespace() {
            if part == "<>" {
                position += 1;
                continue;
            }
            let alternatives: Vec<&str> = part.split('|').filter(|a| !a.is_empty()).collect();
            if alternatives.len() == 1 {
                let tokens = self.analyzer.tokenize(field, alternatives[0]);
                let Some(first) = tokens.first().map(|t| t.position) else {
                    continue;
                };
                let mut last = 0;
                for token in tokens {
                    last = token.position - first;
                    phrase.push_at(vec![token.text], position + last);
                }
                position += last + 1;
            } else {
                let terms: Vec<String> = alternatives
                    .iter()
                    .filter_map(|alt| self.analyzer.tokenize(field, alt).into_iter().next())
                    .map(|token| token.text)
                    .collect();
                if terms.is_empty() {
                    continue;
                }
                phrase.push_at(terms, position);
                position += 1;
            }
        }

        match phrase.positions.as_slice() {
            [] => None,
            [only] if only.terms.len() == 1 => {
                Some(TermQuery::new(field, only.terms[0].clone()).into())
            }
            _ => Some(phrase.into()),
        }
    }
}

/// Cursor over the tokens of one parse
struct ParseState<'p> {
    parser: &'p QueryParser,
    tokens: Vec<Spanned>,
    index: usize,
}

impl<'p> ParseState<'p> {
    fn current(&self) -> Spanned {
        let last = self.tokens.len() - 1;
        self.tokens[self.index.min(last)].clone()
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + 1).min(last)].token
    }

    fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> SegdexError {
        SegdexError::parse(self.current().position, message)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let current = self.current();
        if current.token == expected {
            self.advance();
            Ok(())
        } else {
            Err(SegdexError::parse(
                current.position,
                format!("expected {}, found {}", describe(&expected), describe(&current.token)),
            ))
        }
    }

    fn parse_bool(&mut self, fields: &[String]) -> Result<Option<Query>> {
        let mut clauses: Vec<BooleanClause> = Vec::new();
        loop {
            match self.current().token {
                Token::Eof | Token::RightParen => break,
                Token::And => {
                    self.advance();
                    if let Some(clause) = self.parse_clause(fields)? {
                        add_and(&mut clauses, clause);
                    }
                }
                Token::Or => {
                    self.advance();
                    if let Some(clause) = self.parse_clause(fields)? {
                        clauses.push(clause);
                    }
                }
                _ => {
                    if let Some(clause) = self.parse_clause(fields)? {
                        match self.parser.default_operator {
                            DefaultOperator::Or => clauses.push(clause),
                            DefaultOperator::And => add_and(&mut clauses, clause),
                        }
                    }
                }
            }
        }
        Ok(bool_query(clauses))
    }

    fn parse_clause(&mut self, fields: &[String]) -> Result<Option<BooleanClause>> {
        let occur = match self.current().token {
            Token::Req => {
                self.advance();
                Occur::Must
            }
            Token::Not => {
                self.advance();
                Occur::MustNot
            }
            _ => Occur::Should,
        };
        let query = self.parse_boosted(fields)?;
        Ok(query.map(|q| BooleanClause::new(q, occur)))
    }

    fn parse_boosted(&mut self, fields: &[String]) -> Result<Option<Query>> {
        let query = self.parse_query(fields)?;
        if let Token::Caret(boost) = self.current().token {
            let boost = boost.ok_or_else(|| self.error("expected a boost value after '^'"))?;
            self.advance();
            return Ok(query.map(|q| q.with_boost(boost)));
        }
        Ok(query)
    }

    fn parse_query(&mut self, fields: &[String]) -> Result<Option<Query>> {
        let current = self.current();
        match current.token {
            Token::LeftParen => {
                self.advance();
                let query = self.parse_bool(fields)?;
                self.expect(Token::RightParen)?;
                Ok(query)
            }
            Token::Phrase(content) => {
                self.advance();
                let slop = match self.current().token {
                    Token::Tilde(slop) => {
                        self.advance();
                        slop.unwrap_or(0.0) as u32
                    }
                    _ => 0,
                };
                Ok(self.each_field(fields, |p, field| p.phrase_query(field, &content, slop)))
            }
            Token::LeftBracket
            | Token::LeftBrace
            | Token::Lt
            | Token::LtEq
            | Token::Gt
            | Token::GtEq => self.parse_range(fields),
            Token::Word(word) => {
                if matches!(self.peek(), Token::Colon | Token::Pipe) {
                    let fields = self.parse_fields()?;
                    return self.parse_query(&fields);
                }
                self.advance();
                self.parse_word(fields, &word)
            }
            other => Err(SegdexError::parse(
                current.position,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    fn parse_fields(&mut self) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        loop {
            match self.current().token {
                Token::Word(name) if name == "*" => {
                    fields.extend(self.parser.all_fields.iter().cloned());
                }
                Token::Word(name) => fields.push(name),
                other => {
                    return Err(self.error(format!("expected a field name, found {}", describe(&other))))
                }
            }
            self.advance();
            match self.current().token {
                Token::Pipe => self.advance(),
                Token::Colon => {
                    self.advance();
                    break;
                }
                other => return Err(self.error(format!("expected ':', found {}", describe(&other)))),
            }
        }
        fields.dedup();
        Ok(fields)
    }

    fn parse_word(&mut self, fields: &[String], word: &str) -> Result<Option<Query>> {
        if let Token::Tilde(similarity) = self.current().token {
            let min_similarity = similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);
            if !(0.0..1.0).contains(&min_similarity) {
                return Err(self.error("fuzzy similarity must be in [0, 1)"));
            }
            self.advance();
            return Ok(self.each_field(fields, |p, field| p.fuzzy_query(field, word, min_similarity)));
        }
        if word.contains(['*', '?']) {
            if word == "*" {
                return Ok(Some(MatchAllQuery::new().into()));
            }
            return Ok(self.each_field(fields, |p, field| Some(p.wildcard_query(field, word))));
        }
        Ok(self.each_field(fields, |p, field| p.term_query(field, word)))
    }

    fn parse_range(&mut self, fields: &[String]) -> Result<Option<Query>> {
        let start = self.current();
        self.advance();
        let (lower, upper, include_lower, include_upper) = match start.token {
            Token::Lt | Token::LtEq => {
                let upper = self.range_word()?;
                let inclusive = match self.current().token {
                    Token::RightBracket => {
                        self.advance();
                        true
                    }
                    Token::RightBrace => {
                        self.advance();
                        false
                    }
                    _ => start.token == Token::LtEq,
                };
                (None, Some(upper), false, inclusive)
            }
            Token::Gt | Token::GtEq => {
                let lower = self.range_word()?;
                (Some(lower), None, start.token == Token::GtEq, false)
            }
            _ => {
                let include_lower = start.token == Token::LeftBracket;
                let lower = self.range_word()?;
                if self.current().token == Token::Gt {
                    self.advance();
                    (Some(lower), None, include_lower, false)
                } else {
                    if matches!(&self.current().token, Token::Word(w) if w == "TO") {
                        self.advance();
                    }
                    let upper = self.range_word()?;
                    let include_upper = match self.current().token {
                        Token::RightBracket => true,
                        Token::RightBrace => false,
                        other => {
                            return Err(self.error(format!(
                                "expected ']' or '}}' to close the range, found {}",
                                describe(&other)
                            )))
                        }
                    };
                    self.advance();
                    (Some(lower), Some(upper), include_lower, include_upper)
                }
            }
        };

        let mut queries = Vec::with_capacity(fields.len());
        for field in fields {
            let range = TermRange::new(
                field.clone(),
                lower.clone(),
                upper.clone(),
                include_lower,
                include_upper,
            )
            .map_err(|e| SegdexError::parse(start.position, e.to_string()))?;
            queries.push(Query::from(RangeQuery::new(range)));
        }
        Ok(combine_fields(queries))
    }

    fn range_word(&mut self) -> Result<String> {
        match self.current().token {
            Token::Word(word) => {
                self.advance();
                Ok(word)
            }
            other => Err(self.error(format!("expected a range bound, found {}", describe(&other)))),
        }
    }

    fn each_field<F>(&self, fields: &[String], build: F) -> Option<Query>
    where
        F: Fn(&QueryParser, &str) -> Option<Query>,
    {
        let queries = fields
            .iter()
            .filter_map(|field| build(self.parser, field))
            .collect();
        combine_fields(queries)
    }
}

/// One query per field becomes a disjunction
fn combine_fields(mut queries: Vec<Query>) -> Option<Query> {
    match queries.len() {
        0 => None,
        1 => queries.pop(),
        _ => {
            let mut query = BooleanQuery::new();
            for q in queries {
                query.push(q, Occur::Should);
            }
            Some(query.into())
        }
    }
}

fn add_and(clauses: &mut Vec<BooleanClause>, mut clause: BooleanClause) {
    if let [only] = clauses.as_mut_slice() {
        if !only.is_prohibited() {
            only.occur = Occur::Must;
        }
    }
    if !clause.is_prohibited() {
        clause.occur = Occur::Must;
    }
    clauses.push(clause);
}

fn bool_query(mut clauses: Vec<BooleanClause>) -> Option<Query> {
    match clauses.len() {
        0 => None,
        1 if !clauses[0].is_prohibited() => clauses.pop().map(|c| c.query),
        _ => {
            let mut query = BooleanQuery::new();
            query.clauses = clauses;
            Some(query.into())
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(w) => format!("'{}'", w),
        Token::Phrase(_) => "phrase".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::Req => "REQ".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::Tilde(_) => "'~'".to_string(),
        Token::Caret(_) => "'^'".to_string(),
        Token::LeftParen => "'('".to_string(),
        Token::RightParen => "')'".to_string(),
        Token::LeftBracket => "'['".to_string(),
        Token::RightBracket => "']'".to_string(),
        Token::LeftBrace => "'{'".to_string(),
        Token::RightBrace => "'}'".to_string(),
        Token::Lt => "'<'".to_string(),
        Token::LtEq => "'<='".to_string(),
        Token::Gt => "'>'".to_string(),
        Token::GtEq => "'>='".to_string(),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> QueryParser {
        QueryParser::new("xxx").with_fields(["f1", "f2", "f3"])
    }

    fn check(input: &str, expected: &str) {
        let query = parser().parse(input).unwrap();
        assert_eq!(query.to_query_string("xxx"), expected, "input: {}", input);
    }

    #[test]
    fn test_terms_and_fields() {
        check("word", "word");
        check("field:word", "field:word");
        check("f1|f2:word", "f1:word f2:word");
        check("*:xxx", "f1:xxx f2:xxx f3:xxx");
    }

    #[test]
    fn test_boolean_operators() {
        check("one two AND three", "one two +three");
        check("one AND two", "+one +two");
        check("one OR two", "one two");
        check("one && two || three", "+one +two three");
        check("+one -two", "+one -two");
        check("REQ one NOT two", "+one -two");
        check("!one", "-one");
        check("field:(one AND (two OR three))", "+field:one +(field:two field:three)");
        check("*:(xxx AND bbb)", "+(f1:xxx f2:xxx f3:xxx) +(f1:bbb f2:bbb f3:bbb)");
    }

    #[test]
    fn test_default_and_operator() {
        let parser = parser().with_default_operator(DefaultOperator::And);
        let query = parser.parse("one two -three").unwrap();
        assert_eq!(query.to_query_string("xxx"), "+one +two -three");
    }

    #[test]
    fn test_phrases() {
        check("\"one two three\"", "\"one two three\"");
        check("\"onewordphrase\"", "onewordphrase");
        check(
            "field:\"one <> <> <> three|four|five <>\"",
            "field:\"one <> <> <> three|four|five\"",
        );
        check("\"quick fox\"~3", "\"quick fox\"~3");
        check("\"\"", "");
    }

    #[test]
    fn test_boosts() {
        check("one^2", "one^2.0");
        check("(one AND two)^100.23", "(+one +two)^100.23");
        check("(REQ field:\"one two three\")^23", "field:\"one two three\"^23.0");
        check("*:a?d*^20.0", "(f1:a?d* f2:a?d* f3:a?d*)^20.0");
    }

    #[test]
    fn test_multi_term_queries() {
        check("field:abc~", "field:abc~0.5");
        check("abc~0.7", "abc~0.7");
        check("te*", "te*");
        check("T?E*t", "t?e*t");
        check("*", "*");
    }

    #[test]
    fn test_ranges() {
        check("[aaa bbb]", "[aaa bbb]");
        check("field:{aaa TO bbb]", "field:{aaa bbb]");
        check("[aaa>", "[aaa>");
        check("{aaa>", "{aaa>");
        check("<bbb]", "<bbb]");
        check("<bbb}", "<bbb}");
        check(">aaa", "{aaa>");
        check(">=aaa", "[aaa>");
        check("<aaa", "<aaa}");
        check("field:<=aaa", "field:<aaa]");
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parser().parse("one (two").unwrap_err();
        assert!(matches!(err, SegdexError::QueryParse { position: 8, .. }));

        let err = parser().parse("one two)").unwrap_err();
        assert!(matches!(err, SegdexError::QueryParse { position: 7, .. }));

        let err = parser().parse("[bbb aaa]").unwrap_err();
        assert!(matches!(err, SegdexError::QueryParse { position: 0, .. }));
    }

    #[test]
    fn test_handle_parse_errors_falls_back_to_terms() {
        let parser = parser().handle_parse_errors(true);
        let query = parser.parse("one (two \"three").unwrap();
        assert_eq!(query.to_query_string("xxx"), "one two three");
    }

    #[test]
    fn test_empty_input() {
        let query = parser().parse("   ").unwrap();
        assert_eq!(query.to_query_string("xxx"), "");
    }
}
