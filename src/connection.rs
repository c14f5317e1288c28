//! HTTP/2 connection management
//!
//! A `Connection` owns one transport session, the stream table, both
//! settings tables and the HPACK state, and enforces the framing rules
//! on every frame that crosses it. Outbound frames pass the legality
//! gate before touching the wire; a gated frame is dropped, not an
//! error. Inbound structural violations escalate to a connection error:
//! GOAWAY with the mapped code, then the transport is closed. Stream
//! scoped violations reset just the offending stream with RST_STREAM.

use crate::codec::{FrameCodec, FRAME_HEADER_SIZE};
use crate::error::{Error, ErrorCode, Result};
use crate::frames::{
    ContinuationFrame, DataFrame, Frame, FrameHeader, FrameType, GoawayFrame, HeadersFrame,
    PingFrame, PriorityFrame, PushPromiseFrame, RstStreamFrame, SettingsFrame, WindowUpdateFrame,
};
use crate::hpack_codec::HeaderCodec;
use crate::priority;
use crate::session::{Session, SessionOps};
use crate::settings::Settings;
use crate::stream::{is_allowed, StreamId, StreamState, StreamTable};
use crate::CONNECTION_PREFACE;
use bytes::Bytes;

/// Per-frame-type callbacks invoked after a received frame has passed
/// validation and its state effects have been applied. All methods
/// default to no-ops so a handler implements only what it consumes.
pub trait FrameHandler {
    fn on_data(&mut self, _frame: &DataFrame) {}
    fn on_headers(&mut self, _frame: &HeadersFrame) {}
    fn on_priority(&mut self, _frame: &PriorityFrame) {}
    fn on_rst_stream(&mut self, _frame: &RstStreamFrame) {}
    fn on_settings(&mut self, _frame: &SettingsFrame) {}
    fn on_push_promise(&mut self, _frame: &PushPromiseFrame) {}
    fn on_ping(&mut self, _frame: &PingFrame) {}
    fn on_goaway(&mut self, _frame: &GoawayFrame) {}
    fn on_window_update(&mut self, _frame: &WindowUpdateFrame) {}
    fn on_continuation(&mut self, _frame: &ContinuationFrame) {}
}

/// A handler that consumes nothing.
impl FrameHandler for () {}

/// One HTTP/2 connection endpoint, client or server role.
pub struct Connection<S: SessionOps> {
    session: Session<S>,
    streams: StreamTable,
    /// Settings we announced to the peer
    local_settings: Settings,
    /// Settings the peer announced, merged over the protocol defaults
    remote_settings: Settings,
    headers: HeaderCodec,
    is_client: bool,
    /// SETTINGS sent and not yet acknowledged
    awaiting_settings_ack: bool,
    goaway_sent: Option<ErrorCode>,
    /// (last_stream_id, error_code) from a received GOAWAY
    goaway_received: Option<(StreamId, ErrorCode)>,
    /// Highest peer-initiated stream id seen, reported in GOAWAY
    last_remote_stream_id: StreamId,
}

impl<S: SessionOps> Connection<S> {
    /// Create a client-role connection. No octets are exchanged until
    /// `client_handshake`.
    pub fn client(session: Session<S>, local_settings: Settings) -> Self {
        Connection::new(session, local_settings, true)
    }

    /// Create a server-role connection. No octets are exchanged until
    /// `server_handshake`.
    pub fn server(session: Session<S>, local_settings: Settings) -> Self {
        Connection::new(session, local_settings, false)
    }

    fn new(session: Session<S>, local_settings: Settings, is_client: bool) -> Self {
        Connection {
            session,
            streams: StreamTable::new(is_client),
            local_settings,
            remote_settings: Settings::default_settings(),
            headers: HeaderCodec::new(),
            is_client,
            awaiting_settings_ack: false,
            goaway_sent: None,
            goaway_received: None,
            last_remote_stream_id: 0,
        }
    }

    /// Client side of connection establishment: the 24-octet preface
    /// followed by our SETTINGS frame.
    pub fn client_handshake(&mut self) -> Result<()> {
        self.session.write_all(CONNECTION_PREFACE)?;
        self.send_frame(&Frame::Settings(SettingsFrame::new(
            self.local_settings.clone(),
        )))?;
        log::debug!("client preface and SETTINGS sent");
        Ok(())
    }

    /// Server side of connection establishment: read and verify the
    /// client preface, then send our SETTINGS frame.
    ///
    /// A peer that closes before sending a full preface yields
    /// `MissingPreface`; a peer that sends other octets (an HTTP/1.x
    /// request line, typically) yields `Http11Required`.
    pub fn server_handshake(&mut self) -> Result<()> {
        let mut preface = [0u8; 24];
        if !self.session.read_exact(&mut preface)? {
            return Err(Error::MissingPreface);
        }
        if preface != *CONNECTION_PREFACE {
            log::warn!("connection preface mismatch, peer is not speaking h2c");
            return Err(Error::Http11Required);
        }

        self.send_frame(&Frame::Settings(SettingsFrame::new(
            self.local_settings.clone(),
        )))?;
        log::debug!("client preface verified, SETTINGS sent");
        Ok(())
    }

    /// Allocate a new locally-initiated stream.
    pub fn open_stream(&mut self) -> Result<StreamId> {
        if self.goaway_received.is_some() {
            return Err(Error::ConnectionClosed);
        }
        self.streams.create_stream()
    }

    /// Send a frame if the legality gate permits it in the current
    /// stream state.
    ///
    /// Returns `Ok(true)` when the frame went out, `Ok(false)` when the
    /// gate rejected it. A gate rejection is silent: nothing is written
    /// and no state changes.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<bool> {
        let stream_id = frame.stream_id();
        let state = self
            .streams
            .get(stream_id)
            .map(|s| s.state())
            .unwrap_or(StreamState::Idle);

        if !is_allowed(
            state,
            stream_id,
            frame.frame_type(),
            self.remote_settings.get_enable_push(),
        ) {
            log::debug!("gate dropped outbound {} in {:?}", frame, state);
            return Ok(false);
        }

        let encoded = FrameCodec::encode(frame);
        self.session.write_all(&encoded)?;
        log::trace!("sent {}", frame);

        self.apply_send_effects(frame);
        Ok(true)
    }

    fn apply_send_effects(&mut self, frame: &Frame) {
        match frame {
            Frame::Headers(f) => {
                if let Some(stream) = self.streams.get_mut(f.stream_id) {
                    stream.send_headers(f.end_stream);
                }
            }
            Frame::Data(f) => {
                if f.end_stream {
                    if let Some(stream) = self.streams.get_mut(f.stream_id) {
                        stream.send_end_stream();
                    }
                }
            }
            Frame::RstStream(f) => {
                if let Some(stream) = self.streams.get_mut(f.stream_id) {
                    stream.close();
                }
            }
            Frame::PushPromise(f) => {
                self.streams.insert_remote(f.promised_stream_id).reserve(true);
            }
            Frame::Settings(f) => {
                if !f.ack {
                    self.awaiting_settings_ack = true;
                }
            }
            Frame::Goaway(f) => {
                self.goaway_sent = Some(f.error_code);
            }
            _ => {}
        }
    }

    /// Read the next frame header and payload off the wire.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. A frame longer
    /// than our announced SETTINGS_MAX_FRAME_SIZE is a connection error.
    pub fn recv_frame(&mut self) -> Result<Option<(FrameHeader, Bytes)>> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        if !self.session.read_exact(&mut header_buf)? {
            return Ok(None);
        }
        let header = FrameCodec::decode_header(&header_buf);

        if header.length > self.local_settings.get_max_frame_size() as usize {
            return Err(self.fail(Error::FrameSize(format!(
                "frame of {} octets exceeds our SETTINGS_MAX_FRAME_SIZE",
                header.length
            ))));
        }

        let mut payload = vec![0u8; header.length];
        if !payload.is_empty() && !self.session.read_exact(&mut payload)? {
            return Err(Error::ConnectionClosed);
        }

        Ok(Some((header, Bytes::from(payload))))
    }

    /// Decode a received frame, validate it, apply its state effects and
    /// invoke the handler.
    ///
    /// Unknown frame types are discarded and yield `Ok(None)`. Frames
    /// dropped by a stream-scoped reset also yield `Ok(None)`. A
    /// connection error has already sent GOAWAY and closed the transport
    /// by the time it propagates out of here.
    pub fn handle_frame<H: FrameHandler>(
        &mut self,
        header: &FrameHeader,
        payload: Bytes,
        handler: &mut H,
    ) -> Result<Option<Frame>> {
        let frame = match FrameCodec::decode(header, payload) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::debug!(
                    "discarding frame with unknown type 0x{:x} on stream {}",
                    header.type_code,
                    header.stream_id
                );
                return Ok(None);
            }
            Err(err) => return Err(self.fail(err)),
        };
        log::trace!("received {}", frame);

        // SETTINGS, PING and GOAWAY are connection scoped. The decoded
        // frame normalizes their stream id to 0, so the header is the
        // only place a forged id is still visible.
        if header.stream_id != 0
            && matches!(
                frame.frame_type(),
                FrameType::Settings | FrameType::Ping | FrameType::Goaway
            )
        {
            return Err(self.fail(Error::Protocol(format!(
                "{} on stream {}",
                frame.frame_type(),
                header.stream_id
            ))));
        }

        match frame {
            Frame::Data(f) => {
                if !self.handle_data(&f)? {
                    return Ok(None);
                }
                handler.on_data(&f);
                Ok(Some(Frame::Data(f)))
            }
            Frame::Headers(f) => {
                if !self.handle_headers(&f)? {
                    return Ok(None);
                }
                handler.on_headers(&f);
                Ok(Some(Frame::Headers(f)))
            }
            Frame::Priority(f) => {
                self.handle_priority(&f)?;
                handler.on_priority(&f);
                Ok(Some(Frame::Priority(f)))
            }
            Frame::RstStream(f) => {
                self.handle_rst_stream(&f)?;
                handler.on_rst_stream(&f);
                Ok(Some(Frame::RstStream(f)))
            }
            Frame::Settings(f) => {
                self.handle_settings(&f)?;
                handler.on_settings(&f);
                Ok(Some(Frame::Settings(f)))
            }
            Frame::PushPromise(f) => {
                self.handle_push_promise(&f)?;
                handler.on_push_promise(&f);
                Ok(Some(Frame::PushPromise(f)))
            }
            Frame::Ping(f) => {
                self.handle_ping(&f)?;
                handler.on_ping(&f);
                Ok(Some(Frame::Ping(f)))
            }
            Frame::Goaway(f) => {
                self.handle_goaway(&f);
                handler.on_goaway(&f);
                Ok(Some(Frame::Goaway(f)))
            }
            Frame::WindowUpdate(f) => {
                if !self.handle_window_update(&f)? {
                    return Ok(None);
                }
                handler.on_window_update(&f);
                Ok(Some(Frame::WindowUpdate(f)))
            }
            Frame::Continuation(f) => {
                self.handle_continuation(&f)?;
                handler.on_continuation(&f);
                Ok(Some(Frame::Continuation(f)))
            }
        }
    }

    /// Returns false when the frame was dropped by a stream reset.
    fn handle_data(&mut self, frame: &DataFrame) -> Result<bool> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("DATA on stream 0".to_string())));
        }

        let state = match self.streams.get(frame.stream_id) {
            Some(stream) => stream.state(),
            None => {
                return Err(self.fail(Error::Protocol(format!(
                    "DATA on unknown stream {}",
                    frame.stream_id
                ))))
            }
        };

        if !is_allowed(state, frame.stream_id, FrameType::Data, true) {
            // Late DATA on a closing stream is a stream error, not a
            // connection error (RFC 7540 Section 5.1).
            self.reset_stream(frame.stream_id, ErrorCode::StreamClosed)?;
            return Ok(false);
        }

        if frame.end_stream {
            if let Some(stream) = self.streams.get_mut(frame.stream_id) {
                stream.receive_end_stream();
            }
        }
        Ok(true)
    }

    /// Returns false when the frame was dropped by a stream reset.
    fn handle_headers(&mut self, frame: &HeadersFrame) -> Result<bool> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("HEADERS on stream 0".to_string())));
        }

        if !self.streams.contains(frame.stream_id)
            && !self.is_peer_initiated(frame.stream_id)
        {
            // An unknown id with our own parity: the peer is answering
            // a stream we never opened.
            return Err(self.fail(Error::InvalidStreamId(frame.stream_id)));
        }

        let state = self.streams.insert_remote(frame.stream_id).state();
        if !is_allowed(state, frame.stream_id, FrameType::Headers, true) {
            // HEADERS on a closing stream stays a stream error
            self.reset_stream(frame.stream_id, ErrorCode::StreamClosed)?;
            return Ok(false);
        }

        if let Some(spec) = frame.priority {
            if let Err(err) = priority::reprioritize(&mut self.streams, frame.stream_id, &spec) {
                return Err(self.fail(err));
            }
        }

        if let Some(stream) = self.streams.get_mut(frame.stream_id) {
            stream.receive_headers(frame.end_stream);
        }
        self.note_remote_stream(frame.stream_id);
        Ok(true)
    }

    fn handle_priority(&mut self, frame: &PriorityFrame) -> Result<()> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("PRIORITY on stream 0".to_string())));
        }

        // PRIORITY is valid in any state, including for ids not yet
        // seen, so materialize the stream before reprioritizing.
        self.streams.insert_remote(frame.stream_id);
        if let Err(err) = priority::reprioritize(&mut self.streams, frame.stream_id, &frame.priority)
        {
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn handle_rst_stream(&mut self, frame: &RstStreamFrame) -> Result<()> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("RST_STREAM on stream 0".to_string())));
        }

        let state = match self.streams.get(frame.stream_id) {
            Some(stream) => stream.state(),
            None => {
                return Err(self.fail(Error::Protocol(format!(
                    "RST_STREAM on unknown stream {}",
                    frame.stream_id
                ))))
            }
        };
        if state == StreamState::Idle {
            return Err(self.fail(Error::Protocol(format!(
                "RST_STREAM on idle stream {}",
                frame.stream_id
            ))));
        }

        log::debug!(
            "stream {} reset by peer: {}",
            frame.stream_id,
            frame.error_code
        );
        if let Some(stream) = self.streams.get_mut(frame.stream_id) {
            stream.close();
        }
        Ok(())
    }

    fn handle_settings(&mut self, frame: &SettingsFrame) -> Result<()> {
        if frame.ack {
            self.awaiting_settings_ack = false;
            log::debug!("SETTINGS acknowledged by peer");
            return Ok(());
        }

        if let Err(err) = frame.settings.validate() {
            return Err(self.fail(err));
        }

        self.remote_settings.merge(&frame.settings);
        self.streams
            .set_max_concurrent_streams(Some(self.remote_settings.get_max_concurrent_streams()));
        log::debug!(
            "peer SETTINGS applied ({} parameters)",
            frame.settings.defined_count()
        );

        self.send_frame(&Frame::Settings(SettingsFrame::ack()))?;
        Ok(())
    }

    fn handle_push_promise(&mut self, frame: &PushPromiseFrame) -> Result<()> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("PUSH_PROMISE on stream 0".to_string())));
        }
        if !self.local_settings.get_enable_push() {
            return Err(self.fail(Error::Protocol(
                "PUSH_PROMISE received with push disabled".to_string(),
            )));
        }

        let state = self
            .streams
            .get(frame.stream_id)
            .map(|s| s.state())
            .unwrap_or(StreamState::Idle);
        if !matches!(state, StreamState::Open | StreamState::HalfClosedRemote) {
            return Err(self.fail(Error::Protocol(format!(
                "PUSH_PROMISE on stream {} in {:?}",
                frame.stream_id, state
            ))));
        }

        if self.streams.contains(frame.promised_stream_id)
            || !self.is_peer_initiated(frame.promised_stream_id)
        {
            return Err(self.fail(Error::InvalidStreamId(frame.promised_stream_id)));
        }

        self.streams
            .insert_remote(frame.promised_stream_id)
            .reserve(false);
        self.note_remote_stream(frame.promised_stream_id);
        Ok(())
    }

    fn handle_ping(&mut self, frame: &PingFrame) -> Result<()> {
        if frame.ack {
            log::debug!("PING acknowledged");
            return Ok(());
        }
        // Echo the opaque payload back unchanged.
        self.send_frame(&Frame::Ping(PingFrame::ack(frame.data)))?;
        Ok(())
    }

    fn handle_goaway(&mut self, frame: &GoawayFrame) {
        log::warn!(
            "GOAWAY received: last stream {}, {}",
            frame.last_stream_id,
            frame.error_code
        );
        self.goaway_received = Some((frame.last_stream_id, frame.error_code));
    }

    /// Returns false when the frame was dropped by a stream reset.
    fn handle_window_update(&mut self, frame: &WindowUpdateFrame) -> Result<bool> {
        if frame.size_increment == 0 {
            if frame.stream_id == 0 {
                return Err(self.fail(Error::Protocol(
                    "WINDOW_UPDATE with zero increment on stream 0".to_string(),
                )));
            }
            // A stream that never left IDLE cannot legally carry
            // RST_STREAM, so there is no stream to reset: escalate.
            let state = self.streams.get(frame.stream_id).map(|s| s.state());
            match state {
                Some(state) if state != StreamState::Idle => {
                    self.reset_stream(frame.stream_id, ErrorCode::ProtocolError)?;
                    return Ok(false);
                }
                _ => {
                    return Err(self.fail(Error::Protocol(format!(
                        "WINDOW_UPDATE with zero increment on unopened stream {}",
                        frame.stream_id
                    ))))
                }
            }
        }
        // Window accounting itself is the transfer layer's concern;
        // this layer validates the frame and passes it through.
        Ok(true)
    }

    fn handle_continuation(&mut self, frame: &ContinuationFrame) -> Result<()> {
        if frame.stream_id == 0 {
            return Err(self.fail(Error::Protocol("CONTINUATION on stream 0".to_string())));
        }
        Ok(())
    }

    /// Reset a single stream: RST_STREAM out, local state closed.
    pub fn reset_stream(&mut self, stream_id: StreamId, code: ErrorCode) -> Result<()> {
        log::debug!("resetting stream {}: {}", stream_id, code);
        self.send_frame(&Frame::RstStream(RstStreamFrame { stream_id, error_code: code }))?;
        if let Some(stream) = self.streams.get_mut(stream_id) {
            stream.close();
        }
        Ok(())
    }

    /// Escalate to a connection error: GOAWAY with the error's wire
    /// code, close the transport, hand the error back for propagation.
    fn fail(&mut self, err: Error) -> Error {
        let code = err.code();
        log::error!("connection error ({}): {}", code, err);

        let goaway = Frame::Goaway(GoawayFrame::new(
            self.last_remote_stream_id,
            code,
            Bytes::new(),
        ));
        // Best effort: the transport may already be unusable.
        if self.send_frame(&goaway).is_err() {
            log::debug!("GOAWAY could not be sent on failing connection");
        }
        let _ = self.session.close();
        err
    }

    /// Graceful shutdown: GOAWAY with NO_ERROR, then close.
    pub fn close(&mut self) -> Result<()> {
        self.send_frame(&Frame::Goaway(GoawayFrame::new(
            self.last_remote_stream_id,
            ErrorCode::NoError,
            Bytes::new(),
        )))?;
        self.session.close()
    }

    /// Whether `id` carries the parity of peer-initiated streams.
    fn is_peer_initiated(&self, id: StreamId) -> bool {
        if self.is_client {
            id % 2 == 0
        } else {
            id % 2 == 1
        }
    }

    fn note_remote_stream(&mut self, id: StreamId) {
        if self.is_peer_initiated(id) && id > self.last_remote_stream_id {
            self.last_remote_stream_id = id;
        }
    }

    /// Encode a header list through this connection's HPACK encoder.
    pub fn encode_header_block(&mut self, headers: &[(String, String)]) -> Result<Bytes> {
        self.headers.encode_block(headers)
    }

    /// Decode a header block through this connection's HPACK decoder.
    /// A decode failure is a connection error (COMPRESSION_ERROR): the
    /// shared dynamic table is out of sync.
    pub fn decode_header_block(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        match self.headers.decode_block(block) {
            Ok(headers) => Ok(headers),
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    pub fn streams(&self) -> &StreamTable {
        &self.streams
    }

    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Whether our last SETTINGS frame is still unacknowledged
    pub fn awaiting_settings_ack(&self) -> bool {
        self.awaiting_settings_ack
    }

    /// (last_stream_id, error_code) from a received GOAWAY, if any
    pub fn goaway_received(&self) -> Option<(StreamId, ErrorCode)> {
        self.goaway_received
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }
}
