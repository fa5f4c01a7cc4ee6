//! Parameter key codec
//!
//! Encodes hierarchical entity addresses (collection → scene → source) into a
//! single string that a control surface can persist per button, and decodes
//! them back. The encoding is a pure function of its inputs so persisted keys
//! stay valid across restarts.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator between levels of a key
pub const DELIMITER: &str = "|#|";

/// Number of levels in an encoded [`EntityRef`]
pub const ENTITY_LEVELS: usize = 4;

/// Codec failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A level would make the encoded key ambiguous
    #[error("level {index} ({level:?}) contains the key delimiter")]
    DelimiterInLevel { index: usize, level: String },

    /// Nothing to encode
    #[error("cannot encode an empty level sequence")]
    Empty,

    /// The key could not be decoded
    #[error("malformed key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },
}

impl KeyError {
    fn malformed(key: &str, reason: impl Into<String>) -> Self {
        KeyError::MalformedKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// True if a level would not survive a round trip.
///
/// Besides the full delimiter, a level may not end with a leading fragment of
/// it (`|`, `|#`) or start with a trailing fragment (`|`, `#|`): joined with
/// its neighbour such a level shifts where the delimiter is found.
fn is_ambiguous(level: &str) -> bool {
    if level.contains(DELIMITER) {
        return true;
    }
    (1..DELIMITER.len()).any(|n| {
        level.ends_with(&DELIMITER[..n]) || level.starts_with(&DELIMITER[DELIMITER.len() - n..])
    })
}

/// Encode an ordered sequence of levels into a key
pub fn encode<S: AsRef<str>>(levels: &[S]) -> Result<String, KeyError> {
    if levels.is_empty() {
        return Err(KeyError::Empty);
    }

    for (index, level) in levels.iter().enumerate() {
        let level = level.as_ref();
        if is_ambiguous(level) {
            return Err(KeyError::DelimiterInLevel {
                index,
                level: level.to_string(),
            });
        }
    }

    Ok(levels
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join(DELIMITER))
}

/// Decode a key into its levels
pub fn decode(key: &str) -> Result<Vec<String>, KeyError> {
    let levels: Vec<String> = key.split(DELIMITER).map(str::to_string).collect();

    if let Some(bad) = levels.iter().find(|l| is_ambiguous(l)) {
        return Err(KeyError::malformed(
            key,
            format!("truncated delimiter in segment {:?}", bad),
        ));
    }

    Ok(levels)
}

/// Decode a key that must contain exactly `expected` levels
pub fn decode_exact(key: &str, expected: usize) -> Result<Vec<String>, KeyError> {
    let levels = decode(key)?;
    if levels.len() != expected {
        return Err(KeyError::malformed(
            key,
            format!("expected {} segments, found {}", expected, levels.len()),
        ));
    }
    Ok(levels)
}

/// Reference to one addressable remote object
///
/// Levels are optional depending on the target: a scene only sets `scene`, an
/// audio input only sets `source_name`, a scene item sets `scene` plus
/// `source_id` and/or `source_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub collection: Option<String>,
    pub scene: Option<String>,
    pub source_id: Option<i64>,
    pub source_name: Option<String>,
}

impl EntityRef {
    pub fn scene(name: impl Into<String>) -> Self {
        Self {
            scene: Some(name.into()),
            ..Default::default()
        }
    }

    /// An input (audio or video source) addressed by name
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            source_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn scene_item(scene: impl Into<String>, id: i64) -> Self {
        Self {
            scene: Some(scene.into()),
            source_id: Some(id),
            ..Default::default()
        }
    }

    /// A scene item addressed by the name of its source (id resolved later)
    pub fn scene_item_named(scene: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            scene: Some(scene.into()),
            source_name: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_source_name(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }

    /// Encode into a persistable key
    pub fn to_key(&self) -> Result<String, KeyError> {
        let id = self.source_id.map(|id| id.to_string()).unwrap_or_default();
        encode(&[
            self.collection.as_deref().unwrap_or(""),
            self.scene.as_deref().unwrap_or(""),
            id.as_str(),
            self.source_name.as_deref().unwrap_or(""),
        ])
    }

    /// Decode a key produced by [`EntityRef::to_key`]
    pub fn from_key(key: &str) -> Result<Self, KeyError> {
        let levels = decode_exact(key, ENTITY_LEVELS)?;
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());

        let source_id = if levels[2].is_empty() {
            None
        } else {
            Some(
                levels[2]
                    .parse::<i64>()
                    .map_err(|_| KeyError::malformed(key, "source id is not an integer"))?,
            )
        };

        Ok(Self {
            collection: non_empty(&levels[0]),
            scene: non_empty(&levels[1]),
            source_id,
            source_name: non_empty(&levels[3]),
        })
    }

    /// Decode a persisted key, falling back to an unselected reference.
    ///
    /// A key that fails to decode is stale caller state, not a fault.
    pub fn from_key_or_default(key: &str) -> Self {
        match Self::from_key(key) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!("Discarding persisted key: {}", e);
                Self::default()
            },
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(c) = &self.collection {
            parts.push(format!("[{}]", c));
        }
        if let Some(s) = &self.scene {
            parts.push(s.clone());
        }
        if let Some(id) = self.source_id {
            parts.push(format!("#{}", id));
        }
        if let Some(n) = &self.source_name {
            parts.push(n.clone());
        }
        write!(f, "{}", parts.join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_decode_scene_item() {
        let entity = EntityRef::scene_item("Main", 7)
            .with_collection("Show")
            .with_source_name("Camera");
        let key = entity.to_key().unwrap();
        assert_eq!(key, "Show|#|Main|#|7|#|Camera");
        assert_eq!(EntityRef::from_key(&key).unwrap(), entity);
    }

    #[test]
    fn test_absent_levels_survive() {
        let entity = EntityRef::input("Mic/Aux");
        let key = entity.to_key().unwrap();
        assert_eq!(EntityRef::from_key(&key).unwrap(), entity);
    }

    #[test]
    fn test_encode_rejects_delimiter() {
        let err = encode(&["Main", "bad|#|name"]).unwrap_err();
        assert_eq!(
            err,
            KeyError::DelimiterInLevel {
                index: 1,
                level: "bad|#|name".to_string()
            }
        );
    }

    #[test]
    fn test_encode_rejects_edge_fragments() {
        assert!(encode(&["a|#", "b"]).is_err());
        assert!(encode(&["a", "#|b"]).is_err());
        assert!(encode(&["a|", "b"]).is_err());
        // Interior pipes and hashes are fine
        assert!(encode(&["a|b", "c#d"]).is_ok());
    }

    #[test]
    fn test_encode_rejects_empty_sequence() {
        let levels: [&str; 0] = [];
        assert_eq!(encode(&levels), Err(KeyError::Empty));
    }

    #[test]
    fn test_decode_wrong_segment_count() {
        let err = EntityRef::from_key("Show|#|Main").unwrap_err();
        assert!(matches!(err, KeyError::MalformedKey { .. }));
    }

    #[test]
    fn test_decode_truncated_delimiter() {
        assert!(matches!(
            decode("Show|#|Main|#"),
            Err(KeyError::MalformedKey { .. })
        ));
        assert!(matches!(
            decode("Show|#Main"),
            Ok(ref levels) if levels.len() == 1
        ));
        assert!(matches!(decode("Show|Main|#|x"), Ok(_)));
        assert!(matches!(decode("Show#|"), Err(KeyError::MalformedKey { .. })));
    }

    #[test]
    fn test_decode_non_numeric_id() {
        assert!(EntityRef::from_key("|#|Main|#|seven|#|").is_err());
    }

    #[test]
    fn test_fallback_to_default() {
        assert_eq!(EntityRef::from_key_or_default("garbage"), EntityRef::default());
    }

    proptest! {
        #[test]
        fn prop_round_trip(levels in prop::collection::vec("[a-zA-Z0-9 _|#-]{0,12}", 1..6)) {
            prop_assume!(levels.iter().all(|l| !is_ambiguous(l)));
            let key = encode(&levels).unwrap();
            prop_assert_eq!(decode(&key).unwrap(), levels);
        }

        #[test]
        fn prop_encode_is_stable(levels in prop::collection::vec("[a-z]{1,8}", 1..5)) {
            prop_assert_eq!(encode(&levels).unwrap(), encode(&levels).unwrap());
        }
    }
}
