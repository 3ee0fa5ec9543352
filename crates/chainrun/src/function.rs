//! # Compiled functions
//!
//! A [`Function`] is one compiled chain link as produced by the build tooling:
//! the sandboxed binary plus the metadata the runtime needs to place it in a
//! chain. Functions are immutable once loaded.

/// Source language the function was compiled from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Language {
    Go,
    #[default]
    Rust,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Rust => "rust",
            Self::TypeScript => "ts",
            Self::JavaScript => "js",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(Self::Go),
            "rust" => Ok(Self::Rust),
            "ts" => Ok(Self::TypeScript),
            "js" => Ok(Self::JavaScript),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// A compiled chain link.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub tag: String,
    pub language: Language,
    /// Hash of the context schema the function was compiled against.
    pub signature_hash: String,
    /// The function keeps no state between invocations, so its instances
    /// may be pooled.
    pub stateless: bool,
    /// The function hands the context on with `next` instead of producing
    /// the final result itself.
    pub middleware: bool,
    /// Sandboxed binary (WebAssembly, binary or text format).
    pub binary: Vec<u8>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        tag: impl Into<String>,
        signature_hash: impl Into<String>,
        binary: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            language: Language::default(),
            signature_hash: signature_hash.into(),
            stateless: true,
            middleware: false,
            binary: binary.into(),
        }
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    pub fn middleware(mut self, middleware: bool) -> Self {
        self.middleware = middleware;
        self
    }

    /// Returns `name:tag`.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}
