//! HTTP/2 frame encoding and decoding
//!
//! Bit-exact encoding and decoding of the 9-octet frame header and the
//! ten payload layouts from RFC 7540 Section 6. Decoding validates the
//! structural rules (fixed lengths, padding bounds, SETTINGS alignment);
//! unknown frame types decode to `None` and are discarded, never refused.

use crate::error::{Error, ErrorCode, Result};
use crate::frames::*;
use crate::settings::{Settings, SettingsParameter};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum frame payload size expressible in the 24-bit length field
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Frame codec for encoding/decoding HTTP/2 frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header into a 9-octet buffer
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        // Type (8 bits)
        header[3] = frame_type.as_u8();

        // Flags (8 bits)
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Decode a frame header from 9 octets. The raw type code is kept
    /// even when unknown so the caller can skip the payload.
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        let type_code = bytes[3];
        let flags = FrameFlags::from_u8(bytes[4]);

        // Stream ID (31 bits, reserved bit masked away)
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        FrameHeader {
            length,
            type_code,
            flags,
            stream_id,
        }
    }

    /// Encode a complete frame (header plus payload) to wire bytes.
    pub fn encode(frame: &Frame) -> Bytes {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f),
            Frame::Headers(f) => Self::encode_headers_frame(f),
            Frame::Priority(f) => Self::encode_priority_frame(f),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f),
            Frame::Settings(f) => Self::encode_settings_frame(f),
            Frame::PushPromise(f) => Self::encode_push_promise_frame(f),
            Frame::Ping(f) => Self::encode_ping_frame(f),
            Frame::Goaway(f) => Self::encode_goaway_frame(f),
            Frame::WindowUpdate(f) => Self::encode_window_update_frame(f),
            Frame::Continuation(f) => Self::encode_continuation_frame(f),
        }
    }

    /// Decode a frame from its header and payload bytes.
    ///
    /// Returns `Ok(None)` for an unknown type code: such frames must be
    /// ignored and discarded (RFC 7540 Section 4.1). Structural
    /// violations return the matching error.
    pub fn decode(header: &FrameHeader, payload: Bytes) -> Result<Option<Frame>> {
        if payload.len() != header.length {
            return Err(Error::FrameSize(format!(
                "declared length {} but {} payload octets available",
                header.length,
                payload.len()
            )));
        }

        let frame_type = match FrameType::from_u8(header.type_code) {
            Some(t) => t,
            None => return Ok(None),
        };

        let frame = match frame_type {
            FrameType::Data => Frame::Data(Self::decode_data(header, payload)?),
            FrameType::Headers => Frame::Headers(Self::decode_headers(header, payload)?),
            FrameType::Priority => Frame::Priority(Self::decode_priority(header, payload)?),
            FrameType::RstStream => Frame::RstStream(Self::decode_rst_stream(header, payload)?),
            FrameType::Settings => Frame::Settings(Self::decode_settings(header, payload)?),
            FrameType::PushPromise => {
                Frame::PushPromise(Self::decode_push_promise(header, payload)?)
            }
            FrameType::Ping => Frame::Ping(Self::decode_ping(header, payload)?),
            FrameType::Goaway => Frame::Goaway(Self::decode_goaway(payload)?),
            FrameType::WindowUpdate => {
                Frame::WindowUpdate(Self::decode_window_update(header, payload)?)
            }
            FrameType::Continuation => {
                Frame::Continuation(Self::decode_continuation(header, payload))
            }
        };

        Ok(Some(frame))
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.data.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        buf.put_slice(&frame.data);

        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    fn decode_data(header: &FrameHeader, payload: Bytes) -> Result<DataFrame> {
        let (padding, data) = Self::strip_padding(header, payload)?;
        Ok(DataFrame {
            stream_id: header.stream_id,
            data,
            end_stream: header.flags.is_end_stream(),
            padding,
        })
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 5; // E + dependency (4) + weight (1)
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = Self::encode_header(FrameType::Headers, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        if let Some(priority) = &frame.priority {
            Self::put_priority_spec(&mut buf, priority);
        }

        buf.put_slice(&frame.header_block);

        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    fn decode_headers(header: &FrameHeader, payload: Bytes) -> Result<HeadersFrame> {
        let (padding, mut rest) = Self::strip_padding(header, payload)?;

        let priority = if header.flags.is_priority() {
            if rest.len() < 5 {
                return Err(Error::FrameSize(
                    "HEADERS with PRIORITY flag needs 5 priority octets".to_string(),
                ));
            }
            let spec = Self::read_priority_spec(&rest);
            rest = rest.slice(5..);
            Some(spec)
        } else {
            None
        };

        Ok(HeadersFrame {
            stream_id: header.stream_id,
            header_block: rest,
            end_stream: header.flags.is_end_stream(),
            end_headers: header.flags.is_end_headers(),
            priority,
            padding,
        })
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame) -> Bytes {
        let mut buf = BytesMut::new();

        // Fixed 5-octet payload
        let header =
            Self::encode_header(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 5);
        buf.put_slice(&header);
        Self::put_priority_spec(&mut buf, &frame.priority);

        buf.freeze()
    }

    fn decode_priority(header: &FrameHeader, payload: Bytes) -> Result<PriorityFrame> {
        if payload.len() != 5 {
            return Err(Error::FrameSize(format!(
                "PRIORITY payload must be 5 octets, got {}",
                payload.len()
            )));
        }
        Ok(PriorityFrame {
            stream_id: header.stream_id,
            priority: Self::read_priority_spec(&payload),
        })
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header);
        buf.put_u32(frame.error_code.as_u32());

        buf.freeze()
    }

    fn decode_rst_stream(header: &FrameHeader, payload: Bytes) -> Result<RstStreamFrame> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "RST_STREAM payload must be 4 octets, got {}",
                payload.len()
            )));
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(RstStreamFrame {
            stream_id: header.stream_id,
            // Unknown error codes carry no special behavior
            error_code: ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError),
        })
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        // Each defined slot is one 6-octet (id, value) pair; an ACK
        // carries none.
        let mut settings_data = BytesMut::new();
        if !frame.ack {
            let settings = &frame.settings;

            if let Some(val) = settings.header_table_size {
                settings_data.put_u16(SettingsParameter::HeaderTableSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.enable_push {
                settings_data.put_u16(SettingsParameter::EnablePush.as_u16());
                settings_data.put_u32(if val { 1 } else { 0 });
            }
            if let Some(val) = settings.max_concurrent_streams {
                settings_data.put_u16(SettingsParameter::MaxConcurrentStreams.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.initial_window_size {
                settings_data.put_u16(SettingsParameter::InitialWindowSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.max_frame_size {
                settings_data.put_u16(SettingsParameter::MaxFrameSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.max_header_list_size {
                settings_data.put_u16(SettingsParameter::MaxHeaderListSize.as_u16());
                settings_data.put_u32(val);
            }
        }

        // SETTINGS always travels on stream 0
        let header = Self::encode_header(FrameType::Settings, flags, 0, settings_data.len());
        buf.put_slice(&header);
        buf.put_slice(&settings_data);

        buf.freeze()
    }

    fn decode_settings(header: &FrameHeader, payload: Bytes) -> Result<SettingsFrame> {
        if header.flags.is_ack() {
            if !payload.is_empty() {
                return Err(Error::FrameSize(
                    "SETTINGS ACK must have an empty payload".to_string(),
                ));
            }
            return Ok(SettingsFrame::ack());
        }

        if payload.len() % 6 != 0 {
            return Err(Error::FrameSize(format!(
                "SETTINGS payload length {} is not a multiple of 6",
                payload.len()
            )));
        }

        let mut settings = Settings::undefined();
        let mut pos = 0;
        while pos + 6 <= payload.len() {
            let id = u16::from_be_bytes([payload[pos], payload[pos + 1]]);
            let value = u32::from_be_bytes([
                payload[pos + 2],
                payload[pos + 3],
                payload[pos + 4],
                payload[pos + 5],
            ]);

            match SettingsParameter::from_u16(id) {
                Some(SettingsParameter::HeaderTableSize) => {
                    settings.header_table_size = Some(value)
                }
                Some(SettingsParameter::EnablePush) => {
                    if value > 1 {
                        return Err(Error::Protocol(format!(
                            "ENABLE_PUSH must be 0 or 1, got {}",
                            value
                        )));
                    }
                    settings.enable_push = Some(value != 0);
                }
                Some(SettingsParameter::MaxConcurrentStreams) => {
                    settings.max_concurrent_streams = Some(value)
                }
                Some(SettingsParameter::InitialWindowSize) => {
                    if value > 0x7FFF_FFFF {
                        return Err(Error::FlowControl(format!(
                            "INITIAL_WINDOW_SIZE {} exceeds 2^31-1",
                            value
                        )));
                    }
                    settings.initial_window_size = Some(value);
                }
                Some(SettingsParameter::MaxFrameSize) => {
                    if !(16384..=16777215).contains(&value) {
                        return Err(Error::Protocol(format!(
                            "MAX_FRAME_SIZE {} outside valid range",
                            value
                        )));
                    }
                    settings.max_frame_size = Some(value);
                }
                Some(SettingsParameter::MaxHeaderListSize) => {
                    settings.max_header_list_size = Some(value)
                }
                // Unknown settings identifiers are ignored (RFC 7540 Section 6.5.2)
                None => {}
            }

            pos += 6;
        }

        Ok(SettingsFrame::new(settings))
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise_frame(frame: &PushPromiseFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = 4 + frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header =
            Self::encode_header(FrameType::PushPromise, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        buf.put_u32(frame.promised_stream_id & 0x7FFF_FFFF);
        buf.put_slice(&frame.header_block);

        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    fn decode_push_promise(header: &FrameHeader, payload: Bytes) -> Result<PushPromiseFrame> {
        let (padding, rest) = Self::strip_padding(header, payload)?;

        if rest.len() < 4 {
            return Err(Error::FrameSize(
                "PUSH_PROMISE payload too short for promised stream id".to_string(),
            ));
        }
        let promised_stream_id =
            u32::from_be_bytes([rest[0] & 0x7F, rest[1], rest[2], rest[3]]);

        Ok(PushPromiseFrame {
            stream_id: header.stream_id,
            promised_stream_id,
            header_block: rest.slice(4..),
            end_headers: header.flags.is_end_headers(),
            padding,
        })
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        // PING travels on stream 0 with an 8-octet payload
        let header = Self::encode_header(FrameType::Ping, flags, 0, 8);
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    fn decode_ping(header: &FrameHeader, payload: Bytes) -> Result<PingFrame> {
        if payload.len() != 8 {
            return Err(Error::FrameSize(format!(
                "PING payload must be 8 octets, got {}",
                payload.len()
            )));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&payload);
        Ok(PingFrame {
            ack: header.flags.is_ack(),
            data,
        })
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut buf = BytesMut::new();

        // Last stream id (4) + error code (4) + debug data
        let payload_len = 8 + frame.debug_data.len();

        let header = Self::encode_header(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        buf.put_slice(&header);

        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);

        buf.freeze()
    }

    fn decode_goaway(payload: Bytes) -> Result<GoawayFrame> {
        if payload.len() < 8 {
            return Err(Error::FrameSize(format!(
                "GOAWAY payload must be at least 8 octets, got {}",
                payload.len()
            )));
        }
        let last_stream_id =
            u32::from_be_bytes([payload[0] & 0x7F, payload[1], payload[2], payload[3]]);
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

        Ok(GoawayFrame {
            last_stream_id,
            error_code: ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError),
            debug_data: payload.slice(8..),
        })
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::WindowUpdate,
            FrameFlags::empty(),
            frame.stream_id,
            4,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.size_increment & 0x7FFF_FFFF);

        buf.freeze()
    }

    fn decode_window_update(header: &FrameHeader, payload: Bytes) -> Result<WindowUpdateFrame> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "WINDOW_UPDATE payload must be 4 octets, got {}",
                payload.len()
            )));
        }
        let size_increment =
            u32::from_be_bytes([payload[0] & 0x7F, payload[1], payload[2], payload[3]]);
        Ok(WindowUpdateFrame {
            stream_id: header.stream_id,
            size_increment,
        })
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.end_headers {
            FrameFlags::from_u8(FrameFlags::END_HEADERS)
        } else {
            FrameFlags::empty()
        };

        let header = Self::encode_header(
            FrameType::Continuation,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.header_block);

        buf.freeze()
    }

    fn decode_continuation(header: &FrameHeader, payload: Bytes) -> ContinuationFrame {
        ContinuationFrame {
            stream_id: header.stream_id,
            header_block: payload,
            end_headers: header.flags.is_end_headers(),
        }
    }

    /// Write a frame's wire bytes to a writer
    pub fn write_frame<W: Write>(writer: &mut W, frame_data: &[u8]) -> io::Result<()> {
        writer.write_all(frame_data)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one raw frame (header plus payload) from a reader
    pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<(FrameHeader, Bytes)> {
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let header = Self::decode_header(&header_bytes);

        if header.length > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame payload too large: {}", header.length),
            ));
        }

        let mut payload = vec![0u8; header.length];
        if header.length > 0 {
            reader.read_exact(&mut payload)?;
        }

        Ok((header, Bytes::from(payload)))
    }

    fn put_priority_spec(buf: &mut BytesMut, priority: &PrioritySpec) {
        let mut dep = priority.stream_dependency & 0x7FFF_FFFF;
        if priority.exclusive {
            dep |= 0x8000_0000; // E bit
        }
        buf.put_u32(dep);
        buf.put_u8(priority.weight);
    }

    fn read_priority_spec(bytes: &[u8]) -> PrioritySpec {
        let exclusive = bytes[0] & 0x80 != 0;
        let stream_dependency =
            u32::from_be_bytes([bytes[0] & 0x7F, bytes[1], bytes[2], bytes[3]]);
        PrioritySpec {
            stream_dependency,
            exclusive,
            weight: bytes[4],
        }
    }

    /// Strip the pad length field and trailing padding when PADDED is
    /// set. Padding that swallows the whole payload is a protocol error
    /// (RFC 7540 Section 6.1).
    fn strip_padding(header: &FrameHeader, payload: Bytes) -> Result<(Option<u8>, Bytes)> {
        if !header.flags.is_padded() {
            return Ok((None, payload));
        }

        if payload.is_empty() {
            return Err(Error::FrameSize(
                "PADDED frame without a pad length octet".to_string(),
            ));
        }
        let pad_len = payload[0];
        if 1 + pad_len as usize > payload.len() {
            return Err(Error::Protocol(format!(
                "pad length {} exceeds remaining payload {}",
                pad_len,
                payload.len() - 1
            )));
        }

        let data_end = payload.len() - pad_len as usize;
        Ok((Some(pad_len), payload.slice(1..data_end)))
    }
}
