//! Value codecs for the disk tier.
//!
//! Memory entries keep the value as-is; only spilled entries go through a codec.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::QueueError;

/// Encodes queue values into log records and back.
pub trait QueueCodec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, QueueError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, QueueError>;
}

/// Byte payloads stored verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl QueueCodec<Vec<u8>> for RawCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, QueueError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, QueueError> {
        Ok(bytes.to_vec())
    }
}

impl QueueCodec<Bytes> for RawCodec {
    fn encode(&self, value: &Bytes) -> Result<Vec<u8>, QueueError> {
        Ok(value.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Bytes, QueueError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

/// UTF-8 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl QueueCodec<String> for Utf8Codec {
    fn encode(&self, value: &String) -> Result<Vec<u8>, QueueError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, QueueError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| QueueError::Codec(e.to_string()))
    }
}

/// Any serde type, encoded with bincode
pub struct BincodeCodec<T>(PhantomData<fn() -> T>);

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BincodeCodec")
    }
}

impl<T> QueueCodec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, QueueError> {
        bincode::serialize(value).map_err(|e| QueueError::Codec(format!("bincode encode: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, QueueError> {
        bincode::deserialize(bytes).map_err(|e| QueueError::Codec(format!("bincode decode: {e}")))
    }
}
