//! Content topics — `/{application}/{version}/{function}/{encoding}`
//!
//! A content topic tells subscribers which application produced a message,
//! which schema version it follows, what it is for and how the payload is
//! encoded. Topics are validated once and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Application name used by every Agora topic
pub const AGORA_APPLICATION: &str = "agora";
/// Current Agora topic schema version
pub const AGORA_VERSION: &str = "1";
/// Payloads are protobuf-encoded
pub const PROTO_ENCODING: &str = "proto";

/// Function tag for bare proof broadcasts
pub const FUNCTION_PROOF: &str = "proof";
/// Function tag for a newly created conversation
pub const FUNCTION_CREATE_CONVERSATION: &str = "create-conversation";
/// Function tag for a newly created comment
pub const FUNCTION_CREATE_COMMENT: &str = "create-comment";

/// Which component of a topic failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicField {
    Application,
    Version,
    Function,
    Encoding,
}

impl fmt::Display for TopicField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopicField::Application => "application",
            TopicField::Version => "version",
            TopicField::Function => "function",
            TopicField::Encoding => "encoding",
        };
        f.write_str(name)
    }
}

/// Content topic construction or parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("content topic {field} is empty")]
    Empty { field: TopicField },

    #[error("content topic {field} contains disallowed character {ch:?}")]
    InvalidCharacter { field: TopicField, ch: char },

    #[error("content topic {field} must not consist of dots only")]
    DotsOnly { field: TopicField },

    #[error("malformed content topic '{0}': expected /application/version/function/encoding")]
    Malformed(String),
}

/// A validated content topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentTopic {
    application: String,
    version: String,
    function: String,
    encoding: String,
}

impl ContentTopic {
    /// Build a topic from its four components
    pub fn new(
        application: impl Into<String>,
        version: impl Into<String>,
        function: impl Into<String>,
        encoding: impl Into<String>,
    ) -> Result<Self, TopicError> {
        let topic = Self {
            application: application.into(),
            version: version.into(),
            function: function.into(),
            encoding: encoding.into(),
        };
        validate_component(TopicField::Application, &topic.application)?;
        validate_component(TopicField::Version, &topic.version)?;
        validate_component(TopicField::Function, &topic.function)?;
        validate_component(TopicField::Encoding, &topic.encoding)?;
        Ok(topic)
    }

    /// `/agora/1/{function}/proto`
    pub fn agora(function: impl Into<String>) -> Result<Self, TopicError> {
        Self::new(AGORA_APPLICATION, AGORA_VERSION, function, PROTO_ENCODING)
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

fn validate_component(field: TopicField, value: &str) -> Result<(), TopicError> {
    if value.is_empty() {
        return Err(TopicError::Empty { field });
    }
    if let Some(ch) = value.chars().find(|c| !is_topic_char(*c)) {
        return Err(TopicError::InvalidCharacter { field, ch });
    }
    // `.` and `..` would read as relative path segments
    if value.chars().all(|c| c == '.') {
        return Err(TopicError::DotsOnly { field });
    }
    Ok(())
}

fn is_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl fmt::Display for ContentTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}",
            self.application, self.version, self.function, self.encoding
        )
    }
}

impl FromStr for ContentTopic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| TopicError::Malformed(s.to_string()))?;
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [application, version, function, encoding] => {
                Self::new(*application, *version, *function, *encoding)
            }
            _ => Err(TopicError::Malformed(s.to_string())),
        }
    }
}

impl TryFrom<String> for ContentTopic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentTopic> for String {
    fn from(topic: ContentTopic) -> Self {
        topic.to_string()
    }
}
