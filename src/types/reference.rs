// ABOUTME: Image reference grammar: [domain[:port]/]path[:tag][@digest].
// ABOUTME: Splits user input into an optional repository, tag and digest.

use std::fmt;
use thiserror::Error;

/// Longest repository name the grammar accepts.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

const TAG_LENGTH_MAX: usize = 128;
const DIGEST_HEX_MIN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseReferenceError {
    #[error("repository name must have at least one component")]
    Empty,

    #[error("invalid reference format: {0}")]
    InvalidFormat(String),

    #[error("invalid reference format: repository name must be lowercase: {0}")]
    NameContainsUppercase(String),

    #[error("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters: {0}")]
    NameTooLong(String),

    #[error("invalid tag format: {0}")]
    InvalidTag(String),

    #[error("invalid digest format: {0}")]
    InvalidDigest(String),
}

/// Result of parsing an image reference.
///
/// Every part is optional: `:v1` carries only a tag and
/// `@sha256:...` only a digest. Callers that need a repository check for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRef {
    repo: Option<String>,
    tag: Option<String>,
    digest: Option<String>,
}

impl ParsedRef {
    /// The canonical repository name, including any registry domain.
    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry domain, when the first path component names one.
    pub fn domain(&self) -> Option<&str> {
        let repo = self.repo.as_deref()?;
        let (first, _) = repo.split_once('/')?;
        looks_like_domain(first).then_some(first)
    }

    /// `(repo, tag)` with absent parts as empty strings, as daemons expect.
    pub fn split(&self) -> (String, String) {
        (
            self.repo.clone().unwrap_or_default(),
            self.tag.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ParsedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(repo) = &self.repo {
            f.write_str(repo)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Parse a reference without applying any defaults.
///
/// No registry or `latest` tag is filled in; `localhost/z` yields the
/// repository `localhost/z` and no tag.
pub fn parse(input: &str) -> Result<ParsedRef, ParseReferenceError> {
    if input.is_empty() {
        return Err(ParseReferenceError::Empty);
    }

    let (rest, digest) = match input.split_once('@') {
        Some((before, after)) => {
            validate_digest(after)?;
            (before, Some(after.to_string()))
        }
        None => (input, None),
    };

    // A colon followed by a slash belongs to a registry port, not a tag.
    let (name, tag) = match rest.rsplit_once(':') {
        Some((before, after)) if !after.contains('/') => {
            validate_tag(after)?;
            (before, Some(after.to_string()))
        }
        _ => (rest, None),
    };

    if name.is_empty() {
        if tag.is_none() && digest.is_none() {
            return Err(ParseReferenceError::InvalidFormat(input.to_string()));
        }
        return Ok(ParsedRef {
            repo: None,
            tag,
            digest,
        });
    }

    if name.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(ParseReferenceError::NameTooLong(name.to_string()));
    }

    if !is_valid_name(name) {
        if is_valid_name(&name.to_ascii_lowercase()) {
            return Err(ParseReferenceError::NameContainsUppercase(input.to_string()));
        }
        return Err(ParseReferenceError::InvalidFormat(input.to_string()));
    }

    Ok(ParsedRef {
        repo: Some(name.to_string()),
        tag,
        digest,
    })
}

fn is_valid_name(name: &str) -> bool {
    let components: Vec<&str> = name.split('/').collect();
    match components.as_slice() {
        [] => false,
        [only] => is_path_component(only),
        [first, rest @ ..] => {
            (is_domain(first) || is_path_component(first))
                && rest.iter().all(|c| is_path_component(c))
        }
    }
}

fn looks_like_domain(component: &str) -> bool {
    (component.contains('.') || component.contains(':') || component == "localhost")
        && is_domain(component)
}

/// `[a-z0-9]+` runs joined by `.`, `_`, `__` or any number of `-`.
fn is_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if bytes.is_empty() || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        if alnum(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !alnum(bytes[i]) {
            i += 1;
        }
        let sep = &component[start..i];
        let ok = matches!(sep, "." | "_" | "__") || sep.bytes().all(|b| b == b'-');
        if !ok {
            return false;
        }
    }
    true
}

/// `host(.host)*(:port)?` where hosts are alphanumeric with inner dashes.
fn is_domain(component: &str) -> bool {
    let (host, port) = match component.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (component, None),
    };

    if let Some(port) = port
        && (port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()))
    {
        return false;
    }

    !host.is_empty()
        && host.split('.').all(|label| {
            let bytes = label.as_bytes();
            !bytes.is_empty()
                && bytes[0].is_ascii_alphanumeric()
                && bytes[bytes.len() - 1].is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        })
}

fn validate_tag(tag: &str) -> Result<(), ParseReferenceError> {
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            word(first)
                && tag.len() <= TAG_LENGTH_MAX
                && chars.all(|c| word(c) || c == '.' || c == '-')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ParseReferenceError::InvalidTag(tag.to_string()))
    }
}

fn validate_digest(digest: &str) -> Result<(), ParseReferenceError> {
    let invalid = || ParseReferenceError::InvalidDigest(digest.to_string());
    let (algorithm, hex) = digest.split_once(':').ok_or_else(invalid)?;

    let algorithm_ok = algorithm
        .split(['+', '.', '_', '-'])
        .all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric())
        });
    let hex_ok = hex.len() >= DIGEST_HEX_MIN && hex.bytes().all(|b| b.is_ascii_hexdigit());

    if algorithm_ok && hex_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}
