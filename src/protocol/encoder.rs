//! # Command Encoder
//!
//! Turns an ordered list of heterogeneous [`Fragment`]s into one
//! [`CommandBuffer`] ready for the transport.
//!
//! ## Poisoned Buffers
//!
//! Encoding is strictly sequential and append-only. If any fragment has no
//! byte encoding, every byte accumulated so far is discarded and the result is
//! an error (or an empty buffer from [`encode_lossy`]). A half-written control
//! sequence can leave the printer's parser waiting for parameter bytes that
//! never arrive, so a partial buffer is never returned.
//!
//! ## Example
//!
//! ```
//! use cajero::fragments;
//! use cajero::protocol::encoder::{encode, Fragment};
//!
//! let buf = encode(&fragments![0x1B, 0x40, "hello\r\n"]).unwrap();
//! assert_eq!(buf.as_bytes(), b"\x1b\x40hello\r\n");
//!
//! let poisoned = encode(&[Fragment::Byte(0x1B), Fragment::Unsupported("bool".into())]);
//! assert!(poisoned.is_err());
//! ```

use serde_json::Value;

use crate::error::EncodeError;

/// One piece of a printer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A single control or parameter byte
    Byte(u8),
    /// Text, sent as UTF-8 without a terminator
    Text(String),
    /// Bytes copied verbatim
    Raw(Vec<u8>),
    /// A value with no byte encoding; the name describes what it was
    Unsupported(String),
}

impl Fragment {
    /// Number of bytes this fragment contributes, or `None` if unsupported.
    pub fn encoded_len(&self) -> Option<usize> {
        match self {
            Fragment::Byte(_) => Some(1),
            Fragment::Text(s) => Some(s.len()),
            Fragment::Raw(bytes) => Some(bytes.len()),
            Fragment::Unsupported(_) => None,
        }
    }

    /// Convert one entry of a JSON fragment script.
    ///
    /// | JSON | Fragment |
    /// |------|----------|
    /// | integer 0..=255 | `Byte` |
    /// | string | `Text` |
    /// | array of integers 0..=255 | `Raw` |
    /// | anything else | `Unsupported` |
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_u64().and_then(|v| u8::try_from(v).ok()) {
                Some(b) => Fragment::Byte(b),
                None => Fragment::Unsupported(format!("number {}", n)),
            },
            Value::String(s) => Fragment::Text(s.clone()),
            Value::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect();
                match bytes {
                    Some(bytes) => Fragment::Raw(bytes),
                    None => Fragment::Unsupported("array with non-byte items".to_string()),
                }
            }
            Value::Bool(_) => Fragment::Unsupported("bool".to_string()),
            Value::Null => Fragment::Unsupported("null".to_string()),
            Value::Object(_) => Fragment::Unsupported("object".to_string()),
        }
    }
}

impl From<u8> for Fragment {
    fn from(b: u8) -> Self {
        Fragment::Byte(b)
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment::Text(s.to_string())
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment::Text(s)
    }
}

impl From<Vec<u8>> for Fragment {
    fn from(bytes: Vec<u8>) -> Self {
        Fragment::Raw(bytes)
    }
}

impl From<&[u8]> for Fragment {
    fn from(bytes: &[u8]) -> Self {
        Fragment::Raw(bytes.to_vec())
    }
}

/// Build a `Vec<Fragment>` from mixed literals.
///
/// Integer literals become [`Fragment::Byte`], string expressions become
/// [`Fragment::Text`] and byte vectors become [`Fragment::Raw`].
#[macro_export]
macro_rules! fragments {
    ($($item:expr),* $(,)?) => {
        vec![$($crate::protocol::encoder::Fragment::from($item)),*]
    };
}

/// A fully assembled command, consumed once by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuffer(Vec<u8>);

impl CommandBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CommandBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode fragments in order into a single buffer.
///
/// ## Errors
///
/// Returns [`EncodeError::UnsupportedFragment`] for the first fragment that has
/// no byte encoding. Bytes from earlier fragments are dropped with it.
pub fn encode(fragments: &[Fragment]) -> Result<CommandBuffer, EncodeError> {
    let capacity = fragments.iter().filter_map(Fragment::encoded_len).sum();
    let mut buffer = Vec::with_capacity(capacity);

    for (index, fragment) in fragments.iter().enumerate() {
        match fragment {
            Fragment::Byte(b) => buffer.push(*b),
            Fragment::Text(s) => buffer.extend_from_slice(s.as_bytes()),
            Fragment::Raw(bytes) => buffer.extend_from_slice(bytes),
            Fragment::Unsupported(type_name) => {
                return Err(EncodeError::UnsupportedFragment {
                    index,
                    type_name: type_name.clone(),
                });
            }
        }
    }

    Ok(CommandBuffer(buffer))
}

/// Encode, collapsing any failure into an empty buffer.
///
/// Callers must treat an empty result as a hard encoding failure.
pub fn encode_lossy(fragments: &[Fragment]) -> CommandBuffer {
    encode(fragments).unwrap_or_else(|e| {
        tracing::warn!("discarding command buffer: {}", e);
        CommandBuffer::default()
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_preserves_order() {
        let buf = encode(&fragments![0x1B, 0x40, "ab", vec![0x00, 0xFF], 0x0A]).unwrap();
        assert_eq!(buf.as_bytes(), &[0x1B, 0x40, b'a', b'b', 0x00, 0xFF, 0x0A]);
    }

    #[test]
    fn test_encode_length_is_sum_of_fragments() {
        let frags = fragments!["Current connection to\r\n", 0x1B, 0x4A, 16, vec![1, 2, 3], "ñ"];
        let expected: usize = frags.iter().map(|f| f.encoded_len().unwrap()).sum();
        assert_eq!(encode(&frags).unwrap().len(), expected);
        // "ñ" is two bytes in UTF-8
        assert_eq!(expected, 23 + 3 + 3 + 2);
    }

    #[test]
    fn test_encode_empty_list() {
        let buf = encode(&[] as &[Fragment]).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_text_has_no_terminator() {
        let buf = encode(&fragments!["ms"]).unwrap();
        assert_eq!(buf.into_vec(), b"ms".to_vec());
    }

    #[test]
    fn test_unsupported_poisons_whole_buffer() {
        let positions = [0usize, 2, 4];
        for pos in positions {
            let mut frags = fragments![0x1B, 0x40, "abc", vec![9, 9]];
            frags.insert(pos, Fragment::Unsupported("bool".to_string()));

            let err = encode(&frags).unwrap_err();
            assert_eq!(
                err,
                EncodeError::UnsupportedFragment {
                    index: pos,
                    type_name: "bool".to_string()
                }
            );
            assert!(encode_lossy(&frags).is_empty());
        }
    }

    #[test]
    fn test_first_unsupported_is_reported() {
        let frags = vec![
            Fragment::Byte(1),
            Fragment::Unsupported("first".into()),
            Fragment::Unsupported("second".into()),
        ];
        match encode(&frags) {
            Err(EncodeError::UnsupportedFragment { index, type_name }) => {
                assert_eq!(index, 1);
                assert_eq!(type_name, "first");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_json_script() {
        let script = json!([27, 64, "hi", [29, 7, 1], 256, true, null, {"a": 1}, 1.5, [1, -1]]);
        let frags: Vec<Fragment> = script.as_array().unwrap().iter().map(Fragment::from_json).collect();

        assert_eq!(frags[0], Fragment::Byte(27));
        assert_eq!(frags[2], Fragment::Text("hi".into()));
        assert_eq!(frags[3], Fragment::Raw(vec![29, 7, 1]));
        assert!(frags[4..].iter().all(|f| matches!(f, Fragment::Unsupported(_))));
    }

    #[test]
    fn test_json_script_with_bad_entry_encodes_to_nothing() {
        let script = json!([27, 64, "ok", false]);
        let frags: Vec<Fragment> = script.as_array().unwrap().iter().map(Fragment::from_json).collect();
        assert!(encode_lossy(&frags).is_empty());
    }
}
