//! Payload splitting for the sink path.

use bytes::Bytes;

/// Number of chunks needed for `len` bytes. An empty payload still takes one.
pub fn chunk_count(len: usize, max_chunk_size: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(max_chunk_size.max(1))
    }
}

/// Split `payload` into slices of at most `max_chunk_size` bytes.
///
/// Slices share the payload's buffer.
pub fn split_payload(payload: &Bytes, max_chunk_size: usize) -> impl Iterator<Item = Bytes> + '_ {
    let max = max_chunk_size.max(1);
    let len = payload.len();
    (0..chunk_count(len, max)).map(move |i| {
        let start = i * max;
        let end = (start + max).min(len);
        payload.slice(start..end)
    })
}
