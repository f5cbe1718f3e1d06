use std::fmt;

use serde::Serialize;

use crate::error::CoreError;

/// Origin-assigned identifier of a feed item, without the kind prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ContentId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidContentId("empty id".to_string()));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(CoreError::InvalidContentId(trimmed.to_string()));
        }
        Ok(ContentId(trimmed.to_string()))
    }
}

impl TryFrom<String> for ContentId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentId::try_from(value.as_str())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ContentId;

    #[test]
    fn accepts_base36_ids() {
        let id = ContentId::try_from(" 1abc2z ").unwrap();
        assert_eq!(id.as_str(), "1abc2z");
    }

    #[test]
    fn rejects_empty_and_punctuated_ids() {
        assert!(ContentId::try_from("").is_err());
        assert!(ContentId::try_from("   ").is_err());
        assert!(ContentId::try_from("abc/def").is_err());
    }
}
