//! HTTP/2 stream lifecycle and stream table
//!
//! Stream states from RFC 7540 Section 5.1, the legality gate deciding
//! which frame types may cross the wire in a given state, and the
//! connection-wide stream table. Streams are never removed from the
//! table: closure is a state, not removal, so late frames (priority
//! updates, window accounting) can still resolve a closed stream's
//! identity.

use crate::error::{Error, Result};
use crate::frames::FrameType;
use std::collections::HashMap;

/// Stream ID type
pub type StreamId = u32;

/// The root pseudo-stream: always present, never transitions, default
/// parent of every dependency relationship and the only legal target of
/// connection-scoped frames.
pub const ROOT_STREAM_ID: StreamId = 0;

/// Default weight as stored on the wire (0-255; add one for 1-256)
pub const DEFAULT_WEIGHT: u8 = 15;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is finished
    Closed,
}

impl StreamState {
    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// Decide whether a frame of `frame_type` is legal on a stream in
/// `state` with identity `stream_id`.
///
/// `peer_push_enabled` is the peer's SETTINGS_ENABLE_PUSH value, which
/// gates PUSH_PROMISE on top of the state check.
pub fn is_allowed(
    state: StreamState,
    stream_id: StreamId,
    frame_type: FrameType,
    peer_push_enabled: bool,
) -> bool {
    use StreamState::*;
    match frame_type {
        FrameType::Data => stream_id != 0 && matches!(state, Open | HalfClosedLocal),
        FrameType::Headers => {
            stream_id != 0 && matches!(state, Idle | ReservedLocal | Open | HalfClosedRemote)
        }
        FrameType::Priority | FrameType::Continuation => stream_id != 0,
        FrameType::RstStream => stream_id != 0 && state != Idle,
        FrameType::Settings | FrameType::Ping | FrameType::Goaway => stream_id == 0,
        FrameType::PushPromise => {
            matches!(state, Open | HalfClosedLocal) && peer_push_enabled
        }
        FrameType::WindowUpdate => true,
    }
}

/// A single HTTP/2 stream: identity, lifecycle state, and its position
/// in the priority tree (parent id plus weight).
#[derive(Debug, Clone)]
pub struct Stream {
    /// Stream ID
    id: StreamId,
    /// Lifecycle state
    state: StreamState,
    /// Parent in the priority tree; the root depends on itself
    parent: StreamId,
    /// Priority weight as stored on the wire (0-255)
    weight: u8,
}

impl Stream {
    /// Create a stream parented under `parent` in the given state.
    pub fn new(id: StreamId, parent: StreamId, state: StreamState) -> Self {
        Stream {
            id,
            state,
            parent,
            weight: DEFAULT_WEIGHT,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Get the parent stream id
    pub fn parent(&self) -> StreamId {
        self.parent
    }

    /// Reparent this stream
    pub fn set_parent(&mut self, parent: StreamId) {
        self.parent = parent;
    }

    /// Get the priority weight (wire representation, 0-255)
    pub fn weight(&self) -> u8 {
        self.weight
    }

    /// Set the priority weight
    pub fn set_weight(&mut self, weight: u8) {
        self.weight = weight;
    }

    /// Apply the state effect of sending HEADERS on this stream.
    pub fn send_headers(&mut self, end_stream: bool) {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (StreamState::ReservedLocal, _) => StreamState::HalfClosedRemote,
            (StreamState::Open, true) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedRemote, true) => StreamState::Closed,
            (state, _) => state,
        };
    }

    /// Apply the state effect of receiving HEADERS on this stream.
    pub fn receive_headers(&mut self, end_stream: bool) {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedRemote,
            (StreamState::ReservedRemote, _) => StreamState::HalfClosedLocal,
            (StreamState::Open, true) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedLocal, true) => StreamState::Closed,
            (state, _) => state,
        };
    }

    /// Apply the state effect of sending DATA with END_STREAM.
    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            state => state,
        };
    }

    /// Apply the state effect of receiving DATA with END_STREAM.
    pub fn receive_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            state => state,
        };
    }

    /// Reserve this stream for push (PUSH_PROMISE sent or received).
    pub fn reserve(&mut self, local: bool) {
        if self.state == StreamState::Idle {
            self.state = if local {
                StreamState::ReservedLocal
            } else {
                StreamState::ReservedRemote
            };
        }
    }

    /// Close the stream (RST_STREAM or both directions ended).
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}

/// The connection-wide stream table.
///
/// Holds every stream ever seen on the connection, keyed by id, plus
/// the root pseudo-stream and the local stream-id counter. Local ids
/// step by 2 so client-initiated (odd) and server-initiated (even) ids
/// never collide.
#[derive(Debug)]
pub struct StreamTable {
    streams: HashMap<StreamId, Stream>,
    /// Next locally-initiated stream id (client: odd, server: even)
    next_local_id: StreamId,
    /// Cap on concurrently open streams (from peer SETTINGS)
    max_concurrent_streams: Option<u32>,
}

impl StreamTable {
    /// Create a stream table for one side of a connection.
    pub fn new(is_client: bool) -> Self {
        let mut streams = HashMap::new();
        streams.insert(
            ROOT_STREAM_ID,
            Stream::new(ROOT_STREAM_ID, ROOT_STREAM_ID, StreamState::Idle),
        );
        StreamTable {
            streams,
            next_local_id: if is_client { 1 } else { 2 },
            max_concurrent_streams: None,
        }
    }

    /// Set maximum concurrent streams (peer SETTINGS)
    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    /// Next local stream id without allocating it
    pub fn peek_next_local_id(&self) -> StreamId {
        self.next_local_id
    }

    /// Allocate the next local stream id, parent it under the root,
    /// insert it into the table in the OPEN state, and return its id.
    pub fn create_stream(&mut self) -> Result<StreamId> {
        if let Some(max) = self.max_concurrent_streams {
            if self.open_stream_count() >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }

        let id = self.next_local_id;
        self.next_local_id += 2;

        self.streams
            .insert(id, Stream::new(id, ROOT_STREAM_ID, StreamState::Open));
        Ok(id)
    }

    /// Insert a peer-initiated stream in the IDLE state. Used when a
    /// HEADERS or PUSH_PROMISE frame introduces a new id.
    pub fn insert_remote(&mut self, id: StreamId) -> &mut Stream {
        self.streams
            .entry(id)
            .or_insert_with(|| Stream::new(id, ROOT_STREAM_ID, StreamState::Idle))
    }

    /// Get a stream by ID
    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Get a mutable stream by ID
    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Whether the table knows this id
    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Number of streams that are not closed (root excluded)
    pub fn open_stream_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.id() != ROOT_STREAM_ID && !s.state().is_closed())
            .count()
    }

    /// All stream IDs in the table, root included
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_transitions() {
        let mut stream = Stream::new(1, ROOT_STREAM_ID, StreamState::Idle);
        assert_eq!(stream.state(), StreamState::Idle);

        stream.send_headers(false);
        assert_eq!(stream.state(), StreamState::Open);

        stream.send_end_stream();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_receive_transitions() {
        let mut stream = Stream::new(1, ROOT_STREAM_ID, StreamState::Idle);

        stream.receive_headers(false);
        assert_eq!(stream.state(), StreamState::Open);

        stream.receive_end_stream();
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);

        stream.send_end_stream();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_reserved_transitions() {
        let mut stream = Stream::new(2, ROOT_STREAM_ID, StreamState::Idle);
        stream.reserve(true);
        assert_eq!(stream.state(), StreamState::ReservedLocal);
        stream.send_headers(false);
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);

        let mut stream = Stream::new(4, ROOT_STREAM_ID, StreamState::Idle);
        stream.reserve(false);
        assert_eq!(stream.state(), StreamState::ReservedRemote);
        stream.receive_headers(false);
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_gate_matches_table() {
        use FrameType::*;
        use StreamState::*;

        let states = [
            Idle,
            ReservedLocal,
            ReservedRemote,
            Open,
            HalfClosedLocal,
            HalfClosedRemote,
            Closed,
        ];

        for state in states {
            // DATA: stream != 0 and OPEN or HALF_CLOSED_LOCAL
            assert_eq!(
                is_allowed(state, 1, Data, true),
                matches!(state, Open | HalfClosedLocal)
            );
            assert!(!is_allowed(state, 0, Data, true));

            // HEADERS: stream != 0 and IDLE/RESERVED_LOCAL/OPEN/HALF_CLOSED_REMOTE
            assert_eq!(
                is_allowed(state, 1, Headers, true),
                matches!(state, Idle | ReservedLocal | Open | HalfClosedRemote)
            );
            assert!(!is_allowed(state, 0, Headers, true));

            // PRIORITY and CONTINUATION: any state, stream != 0
            assert!(is_allowed(state, 1, Priority, true));
            assert!(!is_allowed(state, 0, Priority, true));
            assert!(is_allowed(state, 1, Continuation, true));
            assert!(!is_allowed(state, 0, Continuation, true));

            // RST_STREAM: stream != 0, any state but IDLE
            assert_eq!(is_allowed(state, 1, RstStream, true), state != Idle);
            assert!(!is_allowed(state, 0, RstStream, true));

            // SETTINGS/PING/GOAWAY: stream 0 only
            assert!(is_allowed(state, 0, Settings, true));
            assert!(!is_allowed(state, 1, Settings, true));
            assert!(is_allowed(state, 0, Ping, true));
            assert!(!is_allowed(state, 1, Ping, true));
            assert!(is_allowed(state, 0, Goaway, true));
            assert!(!is_allowed(state, 1, Goaway, true));

            // PUSH_PROMISE: OPEN or HALF_CLOSED_LOCAL, gated by peer push setting
            assert_eq!(
                is_allowed(state, 1, PushPromise, true),
                matches!(state, Open | HalfClosedLocal)
            );
            assert!(!is_allowed(state, 1, PushPromise, false));

            // WINDOW_UPDATE: always
            assert!(is_allowed(state, 0, WindowUpdate, true));
            assert!(is_allowed(state, 1, WindowUpdate, true));
        }
    }

    #[test]
    fn test_table_client_parity() {
        let mut table = StreamTable::new(true);
        assert_eq!(table.peek_next_local_id(), 1);

        assert_eq!(table.create_stream().unwrap(), 1);
        assert_eq!(table.create_stream().unwrap(), 3);
        assert_eq!(table.create_stream().unwrap(), 5);
        assert_eq!(table.open_stream_count(), 3);
    }

    #[test]
    fn test_table_server_parity() {
        let mut table = StreamTable::new(false);
        assert_eq!(table.create_stream().unwrap(), 2);
        assert_eq!(table.create_stream().unwrap(), 4);
    }

    #[test]
    fn test_table_root_always_present() {
        let table = StreamTable::new(true);
        let root = table.get(ROOT_STREAM_ID).unwrap();
        assert_eq!(root.id(), ROOT_STREAM_ID);
        assert_eq!(root.parent(), ROOT_STREAM_ID);
        assert_eq!(table.open_stream_count(), 0);
    }

    #[test]
    fn test_table_max_concurrent() {
        let mut table = StreamTable::new(true);
        table.set_max_concurrent_streams(Some(2));

        table.create_stream().unwrap();
        table.create_stream().unwrap();
        assert!(matches!(table.create_stream(), Err(Error::TooManyStreams)));
    }

    #[test]
    fn test_closed_streams_stay_in_table() {
        let mut table = StreamTable::new(true);
        let id = table.create_stream().unwrap();

        table.get_mut(id).unwrap().close();
        assert_eq!(table.open_stream_count(), 0);
        // Identity still resolves after close
        assert!(table.contains(id));
        assert_eq!(table.get(id).unwrap().state(), StreamState::Closed);
    }

    #[test]
    fn test_insert_remote_idempotent() {
        let mut table = StreamTable::new(false);
        table.insert_remote(1).receive_headers(false);
        assert_eq!(table.get(1).unwrap().state(), StreamState::Open);

        // A second insert must not reset the existing stream
        table.insert_remote(1);
        assert_eq!(table.get(1).unwrap().state(), StreamState::Open);
    }
}
