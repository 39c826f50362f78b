//! Function signatures with validated names and derived selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors related to signature parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature string is empty.
    Empty,
    /// The function name is not a valid Unicode identifier.
    InvalidName { name: String, message: String },
    /// The parameter list is malformed.
    Malformed { text: String, message: String },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Empty => write!(f, "invalid signature: empty"),
            SignatureError::InvalidName { name, message } => {
                write!(f, "invalid function name '{}': {}", name, message)
            }
            SignatureError::Malformed { text, message } => {
                write!(f, "malformed signature '{}': {}", text, message)
            }
        }
    }
}

impl std::error::Error for SignatureError {}

/// The 4-byte routing key derived from a signature.
///
/// Two different signatures can share a selector; resolvers key on the
/// selector, so such a clash is a registration conflict.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector([u8; 4]);

impl Selector {
    /// Derive the selector of a canonical signature text.
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest[..4]);
        Selector(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Selector(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self)
    }
}

/// A validated canonical function signature such as `transfer(address,uint256)`.
///
/// # Syntax
///
/// - The name must be a Unicode identifier (XID_Start or `_` followed by
///   XID_Continue characters).
/// - Parameters are comma separated inside parentheses, with no whitespace.
/// - Tuple parameters nest with parentheses: `settle((uint256,address),bool)`.
///
/// ```rust
/// use slotproxy_core::Signature;
///
/// let sig = Signature::parse("transfer(address,uint256)").unwrap();
/// assert_eq!(sig.name(), "transfer");
/// assert_eq!(sig.params(), vec!["address", "uint256"]);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    text: String,
    name_len: usize,
    selector: Selector,
}

impl Signature {
    /// Parse and validate a signature string.
    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        if s.is_empty() {
            return Err(SignatureError::Empty);
        }

        let open = s.find('(').ok_or_else(|| SignatureError::Malformed {
            text: s.to_string(),
            message: "missing '('".to_string(),
        })?;
        if !s.ends_with(')') {
            return Err(SignatureError::Malformed {
                text: s.to_string(),
                message: "must end with ')'".to_string(),
            });
        }

        let name = &s[..open];
        Self::validate_name(name)?;
        Self::validate_params(s, &s[open + 1..s.len() - 1])?;

        Ok(Signature {
            text: s.to_string(),
            name_len: open,
            selector: Selector::of(s),
        })
    }

    fn validate_name(name: &str) -> Result<(), SignatureError> {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return Err(SignatureError::InvalidName {
                name: name.to_string(),
                message: "empty name".to_string(),
            });
        };

        let valid_start = unicode_ident::is_xid_start(first)
            || (first == '_'
                && chars
                    .clone()
                    .next()
                    .is_some_and(unicode_ident::is_xid_continue));
        if !valid_start {
            return Err(SignatureError::InvalidName {
                name: name.to_string(),
                message: "must start with a letter or underscore followed by letter/digit"
                    .to_string(),
            });
        }

        for c in chars {
            if !unicode_ident::is_xid_continue(c) {
                return Err(SignatureError::InvalidName {
                    name: name.to_string(),
                    message: format!("invalid character '{}'", c),
                });
            }
        }
        Ok(())
    }

    fn validate_params(text: &str, params: &str) -> Result<(), SignatureError> {
        let malformed = |message: &str| SignatureError::Malformed {
            text: text.to_string(),
            message: message.to_string(),
        };

        if params.is_empty() {
            return Ok(());
        }

        let mut depth = 0usize;
        // Length of the parameter being scanned; reset by every comma.
        let mut current = 0usize;
        for c in params.chars() {
            match c {
                '(' => {
                    if current != 0 {
                        return Err(malformed("tuple must start a parameter"));
                    }
                    depth += 1;
                    continue;
                }
                ')' => {
                    if current == 0 {
                        return Err(malformed("empty parameter"));
                    }
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| malformed("unbalanced ')'"))?;
                }
                ',' => {
                    if current == 0 {
                        return Err(malformed("empty parameter"));
                    }
                    current = 0;
                    continue;
                }
                c if c.is_ascii_alphanumeric() || c == '[' || c == ']' => {}
                c => return Err(malformed(&format!("invalid character '{}'", c))),
            }
            current += 1;
        }

        if depth != 0 {
            return Err(malformed("unbalanced '('"));
        }
        if current == 0 {
            return Err(malformed("empty parameter"));
        }
        Ok(())
    }

    /// The canonical signature text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.text[..self.name_len]
    }

    /// Top-level parameter types, in order.
    pub fn params(&self) -> Vec<&str> {
        let inner = &self.text[self.name_len + 1..self.text.len() - 1];
        if inner.is_empty() {
            return Vec::new();
        }
        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in inner.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    params.push(&inner[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        params.push(&inner[start..]);
        params
    }

    /// The 4-byte selector used as the resolver key.
    pub fn selector(&self) -> Selector {
        self.selector
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} -> {})", self.text, self.selector)
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

impl TryFrom<String> for Signature {
    type Error = SignatureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Signature::parse(&s)
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.text
    }
}

/// Parse a signature literal, panicking if it is invalid.
///
/// Intended for literals in code and tests.
#[macro_export]
macro_rules! sig {
    ($s:expr) => {
        $crate::Signature::parse($s).expect("invalid signature literal")
    };
}
