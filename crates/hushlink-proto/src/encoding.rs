//! Base64 serde helpers for fixed and variable length byte fields.

/// Fixed-size arrays as standard base64 strings.
pub mod base64_array {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use zeroize::Zeroize;

    /// Serialize `[u8; N]` as base64.
    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize base64 into `[u8; N]`, rejecting any other length.
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let mut decoded = STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)?;

        let result = <[u8; N]>::try_from(decoded.as_slice()).map_err(|_| {
            D::Error::custom(format!("expected {N} bytes, got {}", decoded.len()))
        });
        decoded.zeroize();

        result
    }
}

/// Byte vectors as standard base64 strings.
pub mod base64_vec {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    /// Serialize bytes as base64.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize base64 into bytes.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
