//! Bucket objects as they travel between backends.
//!
//! A [`StoredObject`] pairs a streamed body with its [`ObjectMetadata`]. The
//! archive backend stores the body as `_DATA/<key>` and the metadata as a
//! serialized side-channel entry `_META/<key>.ser`; the ZIP codec itself
//! treats both as ordinary entries.

use crate::error::{OxiBakError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};

/// Entry name prefix for object bodies.
pub const DATA_DIR: &str = "_DATA";

/// Entry name prefix for serialized object metadata.
pub const META_DIR: &str = "_META";

/// Suffix of metadata side-channel entries.
pub const META_SUFFIX: &str = ".ser";

/// Archive entry name holding the body of `key`.
pub fn data_entry_name(key: &str) -> String {
    format!("{}/{}", DATA_DIR, key)
}

/// Archive entry name holding the metadata of `key`.
pub fn meta_entry_name(key: &str) -> String {
    format!("{}/{}{}", META_DIR, key, META_SUFFIX)
}

/// Object key stored under a `_DATA/` entry name, if `name` is one.
pub fn key_from_data_entry(name: &str) -> Option<&str> {
    name.strip_prefix(DATA_DIR)?.strip_prefix('/')
}

/// Owner of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Canonical owner id.
    pub id: String,
    /// Human readable owner name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Who an access grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Grantee {
    /// A canonical user id.
    CanonicalUser {
        /// Canonical user id.
        id: String,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// A user identified by e-mail address.
    Email {
        /// E-mail address.
        address: String,
    },
    /// A predefined group.
    Group {
        /// Group URI.
        uri: String,
    },
}

/// One access grant of an object's ACL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Grant target.
    pub grantee: Grantee,
    /// Permission name (e.g. `READ`, `FULL_CONTROL`).
    pub permission: String,
}

/// Everything about an object except its body.
///
/// The codec never interprets these fields; they round-trip through the
/// `_META/<key>.ser` side-channel entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object key.
    pub key: String,
    /// `Content-Type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Encoding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Content-Language`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// `Content-Disposition`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// `Cache-Control`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// `Expires`, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// Website redirect location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_redirect_location: Option<String>,
    /// User metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Object owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    /// Access grants.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl ObjectMetadata {
    /// Metadata carrying only a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Encode for the side-channel entry.
    pub fn to_side_channel(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a side-channel entry.
    pub fn from_side_channel(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode a side-channel entry from a stream.
    pub fn read_side_channel<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// An object with a streamed body.
pub struct StoredObject<'a> {
    /// Non-body fields.
    pub metadata: ObjectMetadata,
    /// The body; read to the end exactly once.
    pub body: Box<dyn Read + 'a>,
}

impl<'a> StoredObject<'a> {
    /// Create an object from metadata and a body stream.
    pub fn new(metadata: ObjectMetadata, body: impl Read + 'a) -> Self {
        Self {
            metadata,
            body: Box::new(body),
        }
    }

    /// Create an object whose body is held in memory.
    pub fn from_bytes(metadata: ObjectMetadata, body: Vec<u8>) -> StoredObject<'static> {
        StoredObject {
            metadata,
            body: Box::new(io::Cursor::new(body)),
        }
    }

    /// Object key.
    pub fn key(&self) -> &str {
        &self.metadata.key
    }

    /// Read the remaining body into memory.
    pub fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.body
            .read_to_end(&mut body)
            .map_err(OxiBakError::from_io)?;
        Ok(body)
    }
}

impl fmt::Debug for StoredObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ObjectMetadata {
        let mut meta = ObjectMetadata::new("tmp/test/Object1.txt");
        meta.content_type = Some("text/plain".to_string());
        meta.cache_control = Some("max-age=60".to_string());
        meta.metadata
            .insert("key1".to_string(), "key1Value".to_string());
        meta.metadata
            .insert("key2".to_string(), "key2Value".to_string());
        meta.owner = Some(Owner {
            id: "owner-id".to_string(),
            display_name: Some("backup".to_string()),
        });
        meta.grants = vec![
            Grant {
                grantee: Grantee::CanonicalUser {
                    id: "owner-id".to_string(),
                    display_name: None,
                },
                permission: "FULL_CONTROL".to_string(),
            },
            Grant {
                grantee: Grantee::Group {
                    uri: "http://acs.amazonaws.com/groups/global/AllUsers".to_string(),
                },
                permission: "READ".to_string(),
            },
        ];
        meta
    }

    #[test]
    fn test_entry_names() {
        assert_eq!(data_entry_name("a/b.txt"), "_DATA/a/b.txt");
        assert_eq!(meta_entry_name("a/b.txt"), "_META/a/b.txt.ser");
        assert_eq!(key_from_data_entry("_DATA/a/b.txt"), Some("a/b.txt"));
        assert_eq!(key_from_data_entry("_META/a/b.txt.ser"), None);
        assert_eq!(key_from_data_entry("_DATAX/a"), None);
    }

    #[test]
    fn test_side_channel_round_trip() {
        let meta = sample_metadata();
        let encoded = meta.to_side_channel().unwrap();
        let decoded = ObjectMetadata::from_side_channel(&encoded).unwrap();
        assert_eq!(decoded, meta);

        let streamed = ObjectMetadata::read_side_channel(encoded.as_slice()).unwrap();
        assert_eq!(streamed, meta);
    }

    #[test]
    fn test_side_channel_minimal_record() {
        let decoded = ObjectMetadata::from_side_channel(br#"{"key":"k"}"#).unwrap();
        assert_eq!(decoded, ObjectMetadata::new("k"));
    }

    #[test]
    fn test_side_channel_malformed() {
        let err = ObjectMetadata::from_side_channel(b"not json").unwrap_err();
        assert!(matches!(err, OxiBakError::Metadata(_)));
    }

    #[test]
    fn test_stored_object_body() {
        let mut obj = StoredObject::from_bytes(ObjectMetadata::new("k"), b"body".to_vec());
        assert_eq!(obj.key(), "k");
        assert_eq!(obj.read_body().unwrap(), b"body");
        assert!(obj.read_body().unwrap().is_empty());
    }
}
