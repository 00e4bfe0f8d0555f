//! Route path patterns.
//!
//! Paths are written `/transactions/:id` (or `/transactions/{id}`). The
//! pattern is compiled into the route syntax understood by the HTTP router and
//! can be decoded back from it, which the introspector relies on.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    Param(String),
    /// Trailing catch-all (`*rest`).
    Wildcard(String),
}

/// Parsed, normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn parse(path: &str) -> Result<Self, BuildError> {
        let invalid = |reason: &str| BuildError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let raw: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(param_name(name).ok_or_else(|| invalid("bad parameter name"))?)
            } else if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Segment::Param(param_name(inner).ok_or_else(|| invalid("bad parameter name"))?)
            } else if let Some(name) = part.strip_prefix('*') {
                if i + 1 != raw.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                Segment::Wildcard(name.to_string())
            } else if part.contains([':', '{', '}', '*']) {
                return Err(invalid("reserved character in literal segment"));
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        let mut seen = std::collections::HashSet::new();
        for name in segments.iter().filter_map(|s| match s {
            Segment::Param(n) => Some(n),
            _ => None,
        }) {
            if !seen.insert(name) {
                return Err(invalid("duplicate parameter name"));
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params().any(|p| p == name)
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard(_)))
    }

    /// Concatenate `self` and `other` (`/wallet` + `/transactions`).
    pub fn join(&self, other: &PathPattern) -> PathPattern {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        PathPattern { segments }
    }

    /// Compile into router syntax.
    pub fn compile(&self) -> CompiledPattern {
        CompiledPattern(render(&self.segments))
    }
}

impl core::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&render(&self.segments))
    }
}

impl Serialize for PathPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A route string exactly as handed to the HTTP router.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledPattern(String);

impl CompiledPattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the literal path fragment this pattern was compiled from.
    pub fn decode(&self) -> Result<PathPattern, BuildError> {
        PathPattern::parse(&self.0)
    }
}

fn render(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Param(s) => {
                out.push(':');
                out.push_str(s);
            }
            Segment::Wildcard(s) => {
                out.push('*');
                out.push_str(s);
            }
        }
    }
    out
}

fn param_name(name: &str) -> Option<String> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| name.to_string())
}
