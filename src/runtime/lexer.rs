//! The lexer driver
//!
//! [`Lexer`] is the shell a generated lexer wraps around a
//! [`LexerSimulator`]: it runs the token loop, applies `skip`/`more`/mode
//! commands, builds [`Token`]s and recovers from unrecognized input by
//! dropping one character and recording a [`LexerErrorReport`].
//!
//! Grammar-specific code plugs in through [`LexerHooks`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::runtime::atn_builder::*;
//! use parsanol_atn::runtime::{DfaCache, InputStream, Lexer};
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.lexer_rule("ID", 1, plus(range('a', 'z')));
//! builder.lexer_rule("WS", 2, seq(vec![plus(ch(' ')), action(LexerAction::Skip)]));
//! let atn = Arc::new(builder.build().unwrap());
//! let cache = Arc::new(DfaCache::for_lexer(&atn));
//!
//! let mut lexer = Lexer::new(atn, cache, InputStream::new("hello world"));
//! let tokens = lexer.all_tokens().unwrap();
//! let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, vec!["hello", "world"]);
//! ```

use std::sync::Arc;

use super::atn::Atn;
use super::char_stream::CharStream;
use super::dfa_cache::DfaCache;
use super::error::{error_display, AtnError, AtnResult, LexerErrorReport};
use super::lexer_action::LexerControl;
use super::lexer_simulator::{LexerRecognizer, LexerSimulator, LexerView};
use super::token::{Token, DEFAULT_CHANNEL, EOF, INVALID_TYPE};

/// The mode a lexer starts in
pub const DEFAULT_MODE: usize = 0;

/// Token type asking the lexer to keep matching into the same token
pub const MORE: i32 = -2;

/// Token type asking the lexer to drop the token
pub const SKIP: i32 = -3;

/// Smallest character value
pub const MIN_CHAR_VALUE: i32 = 0;

/// Largest character value
pub const MAX_CHAR_VALUE: i32 = 0x10FFFF;

/// Lexer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerConfig {
    /// Stop recording error reports after this many (0 = unlimited)
    pub max_errors: usize,
    /// Log every DFA step (with the `logging` feature)
    pub trace: bool,
    /// Cache DFA edges; when off every step simulates the ATN
    pub dfa_enabled: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            max_errors: 0,
            trace: false,
            dfa_enabled: true,
        }
    }
}

impl LexerConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error report limit
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Enable step tracing
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Enable or disable DFA caching
    pub fn with_dfa(mut self, enabled: bool) -> Self {
        self.dfa_enabled = enabled;
        self
    }
}

/// The per-token state lexer commands act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerState {
    token_type: i32,
    channel: i32,
    mode: usize,
    mode_stack: Vec<usize>,
    hit_eof: bool,
    text: Option<String>,
    token_start_char_index: usize,
    token_start_line: u32,
    token_start_column: u32,
}

impl Default for LexerState {
    fn default() -> Self {
        Self::new()
    }
}

impl LexerState {
    /// Fresh state in the default mode
    pub fn new() -> Self {
        Self {
            token_type: INVALID_TYPE,
            channel: DEFAULT_CHANNEL,
            mode: DEFAULT_MODE,
            mode_stack: Vec::new(),
            hit_eof: false,
            text: None,
            token_start_char_index: 0,
            token_start_line: 1,
            token_start_column: 0,
        }
    }

    /// Type of the token being built
    #[inline]
    pub fn token_type(&self) -> i32 {
        self.token_type
    }

    /// Channel of the token being built
    #[inline]
    pub fn channel(&self) -> i32 {
        self.channel
    }

    /// Current mode
    #[inline]
    pub fn mode(&self) -> usize {
        self.mode
    }

    /// Modes saved by `push_mode`, innermost last
    #[inline]
    pub fn mode_stack(&self) -> &[usize] {
        &self.mode_stack
    }

    /// Text override of the token being built
    #[inline]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replace the token text
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }
}

impl LexerControl for LexerState {
    fn skip(&mut self) {
        self.token_type = SKIP;
    }

    fn more(&mut self) {
        self.token_type = MORE;
    }

    fn set_mode(&mut self, mode: usize) {
        self.mode = mode;
    }

    fn push_mode(&mut self, mode: usize) {
        log_debug!("push mode {} (from {})", mode, self.mode);
        self.mode_stack.push(self.mode);
        self.mode = mode;
    }

    fn pop_mode(&mut self) -> AtnResult<usize> {
        let mode = self.mode_stack.pop().ok_or(AtnError::EmptyModeStack)?;
        log_debug!("pop mode {} (back to {})", self.mode, mode);
        self.mode = mode;
        Ok(mode)
    }

    fn set_type(&mut self, token_type: i32) {
        self.token_type = token_type;
    }

    fn set_channel(&mut self, channel: i32) {
        self.channel = channel;
    }

    fn custom_action(
        &mut self,
        _input: &dyn CharStream,
        _rule_index: usize,
        _action_index: usize,
    ) -> AtnResult<()> {
        Ok(())
    }
}

impl LexerRecognizer for LexerState {
    fn sempred(&mut self, _view: &LexerView<'_>, _rule_index: usize, _pred_index: usize) -> bool {
        true
    }
}

/// Grammar-specific predicates and actions
pub trait LexerHooks {
    /// Evaluate predicate `pred_index` of rule `rule_index`
    fn sempred(&mut self, _view: &LexerView<'_>, _rule_index: usize, _pred_index: usize) -> bool {
        true
    }

    /// Run embedded action `action_index` of rule `rule_index`
    ///
    /// `input` is positioned where the action appeared in the rule.
    fn action(
        &mut self,
        _lexer: &mut LexerState,
        _input: &dyn CharStream,
        _rule_index: usize,
        _action_index: usize,
    ) -> AtnResult<()> {
        Ok(())
    }
}

/// Hooks for grammars without predicates or embedded actions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LexerHooks for NoHooks {}

/// Routes simulator callbacks to the lexer state and the hooks
struct Dispatch<'a, H> {
    state: &'a mut LexerState,
    hooks: &'a mut H,
}

impl<H: LexerHooks> LexerControl for Dispatch<'_, H> {
    fn skip(&mut self) {
        self.state.skip();
    }

    fn more(&mut self) {
        self.state.more();
    }

    fn set_mode(&mut self, mode: usize) {
        self.state.set_mode(mode);
    }

    fn push_mode(&mut self, mode: usize) {
        self.state.push_mode(mode);
    }

    fn pop_mode(&mut self) -> AtnResult<usize> {
        self.state.pop_mode()
    }

    fn set_type(&mut self, token_type: i32) {
        self.state.set_type(token_type);
    }

    fn set_channel(&mut self, channel: i32) {
        self.state.set_channel(channel);
    }

    fn custom_action(
        &mut self,
        input: &dyn CharStream,
        rule_index: usize,
        action_index: usize,
    ) -> AtnResult<()> {
        self.hooks
            .action(self.state, input, rule_index, action_index)
    }
}

impl<H: LexerHooks> LexerRecognizer for Dispatch<'_, H> {
    fn sempred(&mut self, view: &LexerView<'_>, rule_index: usize, pred_index: usize) -> bool {
        self.hooks.sempred(view, rule_index, pred_index)
    }
}

/// A token source over one input
pub struct Lexer<I, H = NoHooks> {
    input: I,
    interpreter: LexerSimulator,
    state: LexerState,
    hooks: H,
    config: LexerConfig,
    errors: Vec<LexerErrorReport>,
    token_count: usize,
}

impl<I: CharStream> Lexer<I, NoHooks> {
    /// Create a lexer without hooks
    pub fn new(atn: Arc<Atn>, cache: Arc<DfaCache>, input: I) -> Self {
        Self::with_hooks(atn, cache, input, NoHooks)
    }
}

impl<I: CharStream, H: LexerHooks> Lexer<I, H> {
    /// Create a lexer routing predicates and actions to `hooks`
    pub fn with_hooks(atn: Arc<Atn>, cache: Arc<DfaCache>, input: I, hooks: H) -> Self {
        Self {
            input,
            interpreter: LexerSimulator::new(atn, cache),
            state: LexerState::new(),
            hooks,
            config: LexerConfig::default(),
            errors: Vec::new(),
            token_count: 0,
        }
    }

    /// Apply `config`
    pub fn with_config(mut self, config: LexerConfig) -> Self {
        self.interpreter = self
            .interpreter
            .clone()
            .with_dfa(config.dfa_enabled)
            .with_trace(config.trace);
        self.config = config;
        self
    }

    // ========================================================================
    // Token loop
    // ========================================================================

    /// Match and return the next token
    ///
    /// Unrecognized input is reported and dropped one character at a time.
    /// Once the input is exhausted every call returns an `EOF` token.
    pub fn next_token(&mut self) -> AtnResult<Token> {
        let marker = self.input.mark();
        let result = self.next_token_inner();
        self.input.release(marker);
        result
    }

    fn next_token_inner(&mut self) -> AtnResult<Token> {
        'outer: loop {
            if self.state.hit_eof {
                return Ok(self.emit_eof());
            }
            self.state.channel = DEFAULT_CHANNEL;
            self.state.token_start_char_index = self.input.index();
            self.state.token_start_column = self.interpreter.column();
            self.state.token_start_line = self.interpreter.line();
            self.state.text = None;

            loop {
                self.state.token_type = INVALID_TYPE;
                let mode = self.state.mode;
                let mut dispatch = Dispatch {
                    state: &mut self.state,
                    hooks: &mut self.hooks,
                };
                let ttype = match self
                    .interpreter
                    .match_token(&mut self.input, mode, &mut dispatch)
                {
                    Ok(ttype) => ttype,
                    Err(err) if err.is_recoverable() => {
                        self.report(&err);
                        self.recover()?;
                        SKIP
                    }
                    Err(err) => return Err(err),
                };
                if self.input.la(1) == EOF {
                    self.state.hit_eof = true;
                }
                if self.state.token_type == INVALID_TYPE {
                    self.state.token_type = ttype;
                }
                if self.state.token_type == SKIP {
                    continue 'outer;
                }
                if self.state.token_type != MORE {
                    break;
                }
            }
            return Ok(self.emit());
        }
    }

    /// Every remaining token, without the final `EOF`
    pub fn all_tokens(&mut self) -> AtnResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token.is_eof() {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn emit(&mut self) -> Token {
        let start = self.state.token_start_char_index;
        let index = self.input.index();
        let text = match self.state.text.take() {
            Some(text) => text,
            None => self.input.text(start, index),
        };
        let token = Token {
            token_type: self.state.token_type,
            channel: self.state.channel,
            start,
            stop: index as isize - 1,
            line: self.state.token_start_line,
            column: self.state.token_start_column,
            text,
            token_index: self.token_count,
        };
        self.token_count += 1;
        token
    }

    fn emit_eof(&self) -> Token {
        let index = self.input.index();
        Token {
            token_type: EOF,
            channel: DEFAULT_CHANNEL,
            start: index,
            stop: index as isize - 1,
            line: self.interpreter.line(),
            column: self.interpreter.column(),
            text: String::new(),
            token_index: self.token_count,
        }
    }

    fn report(&mut self, err: &AtnError) {
        let start = self.state.token_start_char_index;
        let index = self.input.index();
        let text = self.input.text(start, index + 1);
        let message = format!("token recognition error at: '{}'", error_display(&text));
        log_debug!(
            "line {}:{} {} ({})",
            self.state.token_start_line,
            self.state.token_start_column,
            message,
            err
        );
        #[cfg(not(feature = "logging"))]
        let _ = err;
        if self.config.max_errors != 0 && self.errors.len() >= self.config.max_errors {
            return;
        }
        self.errors.push(LexerErrorReport {
            line: self.state.token_start_line,
            column: self.state.token_start_column,
            start_index: start,
            stop_index: index,
            message,
        });
    }

    fn recover(&mut self) -> AtnResult<()> {
        if self.input.la(1) != EOF {
            self.interpreter.consume(&mut self.input)?;
        }
        Ok(())
    }

    // ========================================================================
    // Modes
    // ========================================================================

    /// Current mode
    #[inline]
    pub fn mode(&self) -> usize {
        self.state.mode
    }

    /// Switch to `mode`
    pub fn set_mode(&mut self, mode: usize) {
        self.state.set_mode(mode);
    }

    /// Save the current mode and switch to `mode`
    pub fn push_mode(&mut self, mode: usize) {
        self.state.push_mode(mode);
    }

    /// Return to the last saved mode
    pub fn pop_mode(&mut self) -> AtnResult<usize> {
        self.state.pop_mode()
    }

    /// Saved modes, innermost last
    #[inline]
    pub fn mode_stack(&self) -> &[usize] {
        &self.state.mode_stack
    }

    // ========================================================================
    // Token state
    // ========================================================================

    /// Drop the current token
    pub fn skip(&mut self) {
        self.state.skip();
    }

    /// Extend the current token with the next match
    pub fn more(&mut self) {
        self.state.more();
    }

    /// Type of the token being built
    #[inline]
    pub fn token_type(&self) -> i32 {
        self.state.token_type
    }

    /// Override the token type
    pub fn set_type(&mut self, token_type: i32) {
        self.state.set_type(token_type);
    }

    /// Channel of the token being built
    #[inline]
    pub fn channel(&self) -> i32 {
        self.state.channel
    }

    /// Override the token channel
    pub fn set_channel(&mut self, channel: i32) {
        self.state.set_channel(channel);
    }

    /// Text of the current token: the override if set, else the match
    pub fn text(&self) -> String {
        match &self.state.text {
            Some(text) => text.clone(),
            None => self.interpreter.text(&self.input),
        }
    }

    /// Override the token text
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.state.set_text(text);
    }

    /// Current line (1-based)
    #[inline]
    pub fn line(&self) -> u32 {
        self.interpreter.line()
    }

    /// Current column (0-based)
    #[inline]
    pub fn column(&self) -> u32 {
        self.interpreter.column()
    }

    /// Override the current line
    pub fn set_line(&mut self, line: u32) {
        self.interpreter.set_line(line);
    }

    /// Override the current column
    pub fn set_column(&mut self, column: u32) {
        self.interpreter.set_column(column);
    }

    /// Index of the next character
    #[inline]
    pub fn char_index(&self) -> usize {
        self.input.index()
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Errors recorded so far
    #[inline]
    pub fn errors(&self) -> &[LexerErrorReport] {
        &self.errors
    }

    /// The input
    #[inline]
    pub fn input(&self) -> &I {
        &self.input
    }

    /// The simulator
    #[inline]
    pub fn interpreter(&self) -> &LexerSimulator {
        &self.interpreter
    }

    /// The hooks
    #[inline]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The hooks, for update
    #[inline]
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Rewind the input and forget every token, mode and error
    pub fn reset(&mut self) {
        self.input.seek(0);
        self.state = LexerState::new();
        self.interpreter.reset();
        self.errors.clear();
        self.token_count = 0;
    }
}

impl<I: CharStream, H: LexerHooks> Iterator for Lexer<I, H> {
    type Item = AtnResult<Token>;

    /// Tokens up to and excluding `EOF`
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(token) if token.is_eof() => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::atn_builder::*;
    use crate::runtime::char_stream::InputStream;
    use crate::runtime::interval_set::IntervalSet;

    fn lexer_for(builder: AtnBuilder, text: &str) -> Lexer<InputStream> {
        let atn = Arc::new(builder.build().unwrap());
        let cache = Arc::new(DfaCache::for_lexer(&atn));
        Lexer::new(atn, cache, InputStream::new(text))
    }

    fn words() -> AtnBuilder {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("ID", 1, plus(range('a', 'z')));
        builder.lexer_rule("WS", 2, seq(vec![plus(ch(' ')), action(LexerAction::Skip)]));
        builder
    }

    #[test]
    fn test_skip_and_positions() {
        let mut lexer = lexer_for(words(), "ab cd");
        let first = lexer.next_token().unwrap();
        assert_eq!((first.token_type, first.start, first.stop), (1, 0, 1));
        let second = lexer.next_token().unwrap();
        assert_eq!((second.start, second.stop, second.column), (3, 4, 3));
        assert_eq!(second.token_index, 1);
        assert!(lexer.next_token().unwrap().is_eof());
        // EOF repeats
        assert!(lexer.next_token().unwrap().is_eof());
    }

    #[test]
    fn test_recovery_drops_one_char() {
        let mut lexer = lexer_for(words(), "a#b");
        let tokens = lexer.all_tokens().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, "b");
        assert_eq!(lexer.errors().len(), 1);
        assert_eq!(
            lexer.errors()[0].to_string(),
            "line 1:1 token recognition error at: '#'"
        );
    }

    #[test]
    fn test_max_errors() {
        let atn_builder = words();
        let atn = Arc::new(atn_builder.build().unwrap());
        let cache = Arc::new(DfaCache::for_lexer(&atn));
        let mut lexer = Lexer::new(atn, cache, InputStream::new("#%&a"))
            .with_config(LexerConfig::new().with_max_errors(2));
        let tokens = lexer.all_tokens().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(lexer.errors().len(), 2);
    }

    #[test]
    fn test_modes_push_and_pop() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("QUOTE", 1, seq(vec![ch('"'), action(LexerAction::PushMode(1))]));
        builder.lexer_rule("ID", 2, plus(range('a', 'z')));
        builder.add_mode();
        builder.lexer_rule("END", 3, seq(vec![ch('"'), action(LexerAction::PopMode)]));
        builder.lexer_rule("CHARS", 4, plus(not_set(IntervalSet::single('"' as i32))));

        let mut lexer = lexer_for(builder, "a\"b c\"d");
        let types: Vec<i32> = lexer
            .all_tokens()
            .unwrap()
            .iter()
            .map(|t| t.token_type)
            .collect();
        assert_eq!(types, vec![2, 1, 4, 3, 2]);
        assert_eq!(lexer.mode(), DEFAULT_MODE);
    }

    #[test]
    fn test_more_extends_token() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("A", 1, seq(vec![ch('a'), action(LexerAction::More)]));
        builder.lexer_rule("B", 2, ch('b'));
        let mut lexer = lexer_for(builder, "ab");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.token_type, 2);
        assert_eq!(token.text, "ab");
    }

    #[test]
    fn test_pop_empty_mode_stack() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("X", 1, seq(vec![ch('x'), action(LexerAction::PopMode)]));
        let mut lexer = lexer_for(builder, "x");
        assert!(matches!(lexer.next_token(), Err(AtnError::EmptyModeStack)));
        assert!(matches!(lexer.pop_mode(), Err(AtnError::EmptyModeStack)));
    }

    #[test]
    fn test_channel_and_type_commands() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule(
            "WS",
            1,
            seq(vec![
                ch(' '),
                action(LexerAction::Channel(crate::runtime::token::HIDDEN_CHANNEL)),
                action(LexerAction::Type(9)),
            ]),
        );
        let mut lexer = lexer_for(builder, " ");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.channel, crate::runtime::token::HIDDEN_CHANNEL);
        assert_eq!(token.token_type, 9);
    }

    struct Keywords {
        enabled: bool,
        actions: Vec<String>,
    }

    impl LexerHooks for Keywords {
        fn sempred(&mut self, _view: &LexerView<'_>, _rule: usize, _pred: usize) -> bool {
            self.enabled
        }

        fn action(
            &mut self,
            lexer: &mut LexerState,
            input: &dyn CharStream,
            rule_index: usize,
            action_index: usize,
        ) -> AtnResult<()> {
            self.actions
                .push(format!("{}:{}@{}", rule_index, action_index, input.index()));
            lexer.set_text("<kw>");
            Ok(())
        }
    }

    fn keyword_lexer(enabled: bool) -> Lexer<InputStream, Keywords> {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule(
            "KW",
            1,
            seq(vec![predicate(0), text("if"), custom_action(0)]),
        );
        builder.lexer_rule("ID", 2, plus(range('a', 'z')));
        let atn = Arc::new(builder.build().unwrap());
        let cache = Arc::new(DfaCache::for_lexer(&atn));
        Lexer::with_hooks(
            atn,
            cache,
            InputStream::new("if"),
            Keywords {
                enabled,
                actions: Vec::new(),
            },
        )
    }

    #[test]
    fn test_hooks_predicate_and_action() {
        let mut lexer = keyword_lexer(true);
        let token = lexer.next_token().unwrap();
        assert_eq!(token.token_type, 1);
        assert_eq!(token.text, "<kw>");
        assert_eq!(lexer.hooks().actions, vec!["0:0@2".to_string()]);

        let mut lexer = keyword_lexer(false);
        let token = lexer.next_token().unwrap();
        assert_eq!(token.token_type, 2);
        assert!(lexer.hooks().actions.is_empty());
    }

    #[test]
    fn test_reset_and_iterator() {
        let mut lexer = lexer_for(words(), "x y");
        assert_eq!(lexer.by_ref().count(), 2);
        lexer.reset();
        assert_eq!(lexer.char_index(), 0);
        let texts: Vec<String> = lexer.map(|t| t.unwrap().text).collect();
        assert_eq!(texts, vec!["x", "y"]);
    }
}
