use std::fmt;
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// 128-bit document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub Uuid);

impl DocId {
    pub fn new() -> Self {
        DocId(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        DocId(Uuid::from_u128(value))
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        DocId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Hash that stays identical across processes, used for on-disk bucket selection
    pub fn stable_hash(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo.rotate_left(32)
    }
}

impl Default for DocId {
    fn default() -> Self {
        DocId(Uuid::nil())
    }
}

impl From<Uuid> for DocId {
    fn from(id: Uuid) -> Self {
        DocId(id)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record that can be kept in a document store
pub trait IndexItem: Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> DocId;

    /// Name used to derive index file names; generic arguments are dropped
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// `app::model::Wrapper<app::Foo>` becomes `Wrapper`
fn short_type_name(full: &str) -> &str {
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

/// A normalized search term produced by the analysis pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub position: u32,  // Token offset within the field (or query)
}

impl Token {
    pub fn new<S: Into<String>>(value: S, position: u32) -> Self {
        Token {
            value: value.into(),
            position,
        }
    }

    /// Split whitespace-separated, already normalized text into positioned tokens
    pub fn sequence(text: &str) -> Vec<Token> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, word)| Token::new(word, i as u32))
            .collect()
    }
}
