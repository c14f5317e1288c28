//! HPACK header block coding
//!
//! Thin wrapper around the `hpack` crate holding the per-connection
//! encoder and decoder state. HPACK is stateful: both directions must
//! live as long as the connection, and decode failures poison the
//! shared dynamic table, which is why they escalate to COMPRESSION_ERROR
//! at the connection level.

use crate::error::{Error, Result};
use bytes::Bytes;
use hpack::{Decoder, Encoder};

/// Per-connection HPACK encoder and decoder state.
pub struct HeaderCodec {
    encoder: Encoder<'static>,
    decoder: Decoder<'static>,
}

impl HeaderCodec {
    pub fn new() -> Self {
        HeaderCodec {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    /// Encode a header list into a header block fragment.
    pub fn encode_block(&mut self, headers: &[(String, String)]) -> Result<Bytes> {
        let tuples: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_bytes(), value.as_bytes()))
            .collect();

        let mut block = Vec::new();
        self.encoder
            .encode_into(tuples, &mut block)
            .map_err(|e| Error::Internal(format!("HPACK encode error: {}", e)))?;

        Ok(Bytes::from(block))
    }

    /// Decode a header block fragment into a header list.
    pub fn decode_block(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        let decoded = self
            .decoder
            .decode(block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

        let mut headers = Vec::with_capacity(decoded.len());
        for (name, value) in decoded {
            let name = String::from_utf8(name)
                .map_err(|_| Error::Compression("header name is not UTF-8".to_string()))?;
            let value = String::from_utf8(value)
                .map_err(|_| Error::Compression("header value is not UTF-8".to_string()))?;
            headers.push((name, value));
        }

        Ok(headers)
    }
}

impl Default for HeaderCodec {
    fn default() -> Self {
        HeaderCodec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_decode_request_headers() {
        let mut codec = HeaderCodec::new();
        let request = headers(&[
            (":method", "GET"),
            (":path", "/"),
            (":scheme", "https"),
            (":authority", "localhost"),
        ]);

        let block = codec.encode_block(&request).unwrap();
        assert!(!block.is_empty());

        let decoded = codec.decode_block(&block).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_dynamic_table_carries_across_blocks() {
        let mut codec = HeaderCodec::new();
        let request = headers(&[(":method", "GET"), ("x-custom", "abcdefghij")]);

        let first = codec.encode_block(&request).unwrap();
        let second = codec.encode_block(&request).unwrap();
        // Second block references the dynamic table entry instead of
        // repeating the literal.
        assert!(second.len() < first.len());

        assert_eq!(codec.decode_block(&first).unwrap(), request);
        assert_eq!(codec.decode_block(&second).unwrap(), request);
    }

    #[test]
    fn test_garbage_block_is_compression_error() {
        let mut codec = HeaderCodec::new();
        let result = codec.decode_block(&[0x3f, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Compression(_))));
    }
}
