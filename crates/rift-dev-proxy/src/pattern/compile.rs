//! Path template compilation.
//!
//! Templates follow the Express-style syntax used by mock definition keys:
//!
//! - `/users/:id` - named segment
//! - `/users/:id?` - optional named segment
//! - `/files/:path+` / `/files/:path*` - repeated segments (one-or-more / zero-or-more)
//! - `/users/:id(\\d+)` - named segment with a custom pattern
//! - `/assets/(.*)` - unnamed group, exposed under a numeric key
//! - `/api/*` - bare wildcard, exposed under a numeric key
//!
//! A compiled template is a single anchored regex plus the ordered list of
//! parameter keys its capture groups map to.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{ParamValue, PatternError, ResolvedParams};

/// Tokenizer for templates. Groups, in order:
/// 1 escaped char, 2 prefix, 3 name, 4 capture, 5 group, 6 modifier, 7 asterisk.
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(
            r"(\\.)|([/.])?(?:(?::(\w+)(?:\(((?:\\.|[^\\()])+)\))?|\(((?:\\.|[^\\()])+)\))([+*?])?|(\*))",
        )
        .expect("token regex is valid")
    })
}

/// Options controlling how a template is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternOptions {
    /// Match path case-sensitively. Mock routes are case-insensitive.
    pub case_sensitive: bool,
    /// When false a single trailing slash on the request path is tolerated.
    pub strict_trailing_slash: bool,
    /// When true the template must consume the whole path; when false the
    /// template only needs to match a prefix ending on a segment boundary.
    pub exact_end: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict_trailing_slash: false,
            exact_end: true,
        }
    }
}

/// Key of one capture group in a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamKey {
    pub name: String,
    pub delimiter: char,
    pub optional: bool,
    pub repeat: bool,
}

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Param {
        key: ParamKey,
        prefix: Option<char>,
        partial: bool,
        pattern: String,
    },
}

/// A path template compiled into an anchored regex.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    regex: Regex,
    keys: Vec<ParamKey>,
}

impl CompiledPattern {
    /// Compile `template` with the given options.
    pub fn compile(template: &str, options: PatternOptions) -> Result<Self, PatternError> {
        let tokens = parse(template);
        let mut keys = Vec::new();
        let source = tokens_to_regex(&tokens, options, &mut keys);

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .build()
            .map_err(|e| PatternError::InvalidTemplate {
                template: template.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            keys,
        })
    }

    /// Template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Ordered parameter keys.
    pub fn keys(&self) -> &[ParamKey] {
        &self.keys
    }

    /// Cheap structural test, no parameter extraction.
    pub fn is_match(&self, pathname: &str) -> bool {
        self.regex.is_match(pathname)
    }

    /// Match `pathname` and extract URL-decoded parameters.
    ///
    /// Returns `None` when the path does not conform to the template.
    pub fn match_path(&self, pathname: &str) -> Option<ResolvedParams> {
        let captures = self.regex.captures(pathname)?;
        let mut params: ResolvedParams = HashMap::new();

        for (i, key) in self.keys.iter().enumerate() {
            let Some(raw) = captures.get(i + 1).map(|m| m.as_str()) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            let decoded = decode_component(raw);
            let value = if key.repeat {
                ParamValue::Multi(
                    decoded
                        .split(key.delimiter)
                        .map(|s| s.to_string())
                        .collect(),
                )
            } else {
                ParamValue::Single(decoded)
            };
            params.insert(key.name.clone(), value);
        }

        Some(params)
    }
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse(template: &str) -> Vec<Token> {
    let re = token_regex();
    let mut tokens = Vec::new();
    let mut path = String::new();
    let mut index = 0;
    let mut unnamed = 0usize;

    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        path.push_str(&template[index..whole.start()]);
        index = whole.end();

        if let Some(escaped) = caps.get(1) {
            path.push_str(&escaped.as_str()[1..]);
            continue;
        }

        let next = template[index..].chars().next();
        let prefix = caps.get(2).and_then(|m| m.as_str().chars().next());
        let name = caps.get(3).map(|m| m.as_str().to_string());
        let capture = caps.get(4).map(|m| m.as_str());
        let group = caps.get(5).map(|m| m.as_str());
        let modifier = caps.get(6).map(|m| m.as_str());
        let asterisk = caps.get(7).is_some();

        if !path.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut path)));
        }

        let partial = matches!((prefix, next), (Some(p), Some(n)) if n != p);
        let repeat = matches!(modifier, Some("+") | Some("*"));
        let optional = matches!(modifier, Some("?") | Some("*"));
        let delimiter = prefix.unwrap_or('/');
        let pattern = match (capture.or(group), asterisk) {
            (Some(custom), _) => custom.to_string(),
            (None, true) => ".*".to_string(),
            (None, false) => format!("[^{}]+?", regex::escape(&delimiter.to_string())),
        };
        let name = name.unwrap_or_else(|| {
            let n = unnamed.to_string();
            unnamed += 1;
            n
        });

        tokens.push(Token::Param {
            key: ParamKey {
                name,
                delimiter,
                optional,
                repeat,
            },
            prefix,
            partial,
            pattern,
        });
    }

    if index < template.len() {
        path.push_str(&template[index..]);
    }
    if !path.is_empty() {
        tokens.push(Token::Literal(path));
    }

    tokens
}

fn tokens_to_regex(tokens: &[Token], options: PatternOptions, keys: &mut Vec<ParamKey>) -> String {
    let mut route = String::new();

    for token in tokens {
        match token {
            Token::Literal(s) => route.push_str(&regex::escape(s)),
            Token::Param {
                key,
                prefix,
                partial,
                pattern,
            } => {
                let prefix = prefix
                    .map(|p| regex::escape(&p.to_string()))
                    .unwrap_or_default();
                let mut capture = format!("(?:{pattern})");
                if key.repeat {
                    capture = format!("{capture}(?:{prefix}{capture})*");
                }
                let piece = if key.optional {
                    if *partial {
                        format!("{prefix}({capture})?")
                    } else {
                        format!("(?:{prefix}({capture}))?")
                    }
                } else {
                    format!("{prefix}({capture})")
                };
                route.push_str(&piece);
                keys.push(key.clone());
            }
        }
    }

    let ends_with_delimiter = route.ends_with('/');
    if !options.strict_trailing_slash {
        if ends_with_delimiter {
            route.pop();
        }
        route.push_str("/?");
    }

    if options.exact_end {
        route.push('$');
    } else if !(options.strict_trailing_slash && ends_with_delimiter) {
        route.push_str("(?:/|$)");
    }

    format!("^{route}")
}
