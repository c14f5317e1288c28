//! h2wire - HTTP/2 framing and connection management
//!
//! A synchronous implementation of the HTTP/2 binary framing layer
//! (RFC 7540): the wire codec for all ten frame types, the stream
//! state machine and legality gate, priority dependencies, settings
//! exchange, and connection lifecycle for both client and server
//! roles. HPACK coding is delegated to the `hpack` crate; flow
//! control windows beyond frame validation are left to the caller.
//!
//! # Architecture
//!
//! - [`codec`] turns frames into wire octets and back
//! - [`frames`] models each frame type as a variant of [`Frame`]
//! - [`stream`] tracks per-stream lifecycle in a connection-wide table
//! - [`priority`] maintains the dependency tree carried on streams
//! - [`connection`] owns a transport and enforces the protocol rules
//! - [`recv_loop`] drives a connection from a blocking read loop
//!
//! # Example
//!
//! ```no_run
//! use h2wire::{Connection, Frame, HeadersFrame, Settings, session};
//! use std::net::TcpStream;
//!
//! # fn example() -> h2wire::Result<()> {
//! let stream = TcpStream::connect("localhost:8080")?;
//! let mut conn = Connection::client(
//!     session::from_tcp_stream(stream),
//!     Settings::default_settings(),
//! );
//! conn.client_handshake()?;
//!
//! let id = conn.open_stream()?;
//! let block = conn.encode_header_block(&[
//!     (":method".to_string(), "GET".to_string()),
//!     (":path".to_string(), "/".to_string()),
//!     (":scheme".to_string(), "http".to_string()),
//!     (":authority".to_string(), "localhost".to_string()),
//! ])?;
//! conn.send_frame(&Frame::Headers(HeadersFrame::new(id, block, true, true)))?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod frames;
pub mod hpack_codec;
pub mod priority;
pub mod recv_loop;
pub mod session;
pub mod settings;
pub mod stream;

pub use codec::{FrameCodec, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use connection::{Connection, FrameHandler};
pub use error::{Error, ErrorCode, Result};
pub use frames::{
    ContinuationFrame, DataFrame, Frame, FrameFlags, FrameHeader, FrameType, GoawayFrame,
    HeadersFrame, PingFrame, PriorityFrame, PrioritySpec, PushPromiseFrame, RstStreamFrame,
    SettingsFrame, WindowUpdateFrame,
};
pub use hpack_codec::HeaderCodec;
pub use session::{from_tcp_stream, FdSessionOps, PollEvents, Session, SessionOps};
pub use settings::{Settings, SettingsBuilder, SettingsParameter};
pub use stream::{Stream, StreamId, StreamState, StreamTable};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
