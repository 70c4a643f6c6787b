// wv2sleuth - core/cmdline.rs
//
// Minimal command-line tokenizer for inspecting other processes' command
// lines.  Splits on whitespace outside double-quoted spans and strips the
// quotes, which is how the runtime's own launcher composes its child
// process arguments.  Not a full Windows CommandLineToArgvW emulation: no
// backslash-escape handling, because the flags this tool extracts
// (`--type=`, `--user-data-dir=`) never contain escaped quotes.

/// A tokenized command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    /// Tokenize a raw command-line string.
    ///
    /// Splits on runs of whitespace outside double quotes; quote characters
    /// delimit a span and are not part of the token, so
    /// `"C:\a b\x.exe" --flag=1` yields `C:\a b\x.exe` and `--flag=1`, and
    /// `--user-data-dir="C:\u d"` yields the single token
    /// `--user-data-dir=C:\u d`.
    pub fn parse(raw: &str) -> CommandLine {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut has_content = false;

        for ch in raw.chars() {
            match ch {
                '"' => {
                    // Quote characters toggle the span and are never emitted.
                    // An empty quoted span ("") still produces a token.
                    in_quotes = !in_quotes;
                    has_content = true;
                }
                c if c.is_whitespace() && !in_quotes => {
                    if has_content {
                        tokens.push(std::mem::take(&mut current));
                        has_content = false;
                    }
                }
                c => {
                    current.push(c);
                    has_content = true;
                }
            }
        }
        if has_content {
            tokens.push(current);
        }

        CommandLine { tokens }
    }

    /// Wrap an already-tokenized argument list.
    pub fn from_tokens(tokens: Vec<String>) -> CommandLine {
        CommandLine { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The first token — by convention the executable path.
    pub fn executable(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Extract the value of a `key=value` token.
    ///
    /// `key_value("--user-data-dir")` on a command line containing
    /// `--user-data-dir=X` returns `Some("X")`; returns `None` when no such
    /// token exists.  The first match wins.
    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find_map(|t| t.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
    }

    /// Whether the exact token is present.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Append a token unless it is already present.
    pub fn add_if_absent(&mut self, token: &str) {
        if !self.contains(token) {
            self.tokens.push(token.to_string());
        }
    }

    /// Remove every occurrence of the exact token.
    pub fn remove(&mut self, token: &str) {
        self.tokens.retain(|t| t != token);
    }
}

impl std::fmt::Display for CommandLine {
    /// Re-quote tokens containing whitespace so the rendering round-trips
    /// through `parse`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for token in &self.tokens {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if token.chars().any(char::is_whitespace) {
                write!(f, "\"{token}\"")?;
            } else {
                f.write_str(token)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
