//! Frame receive loop
//!
//! Blocking read loop over a connection: fixed 9-octet header, then
//! exactly the announced payload length, decode, dispatch. Short reads
//! are reassembled by the session layer. The loop ends on a clean EOF
//! between frames; any connection error propagates out after GOAWAY
//! has been sent.

use crate::connection::{Connection, FrameHandler};
use crate::error::Result;
use crate::frames::Frame;
use crate::session::SessionOps;

/// Receive and dispatch one frame.
///
/// Returns `Ok(None)` on a clean EOF. Frames that were discarded
/// (unknown type, stream reset) come back as `Ok(Some(None))`.
pub fn run_once<S: SessionOps, H: FrameHandler>(
    conn: &mut Connection<S>,
    handler: &mut H,
) -> Result<Option<Option<Frame>>> {
    let (header, payload) = match conn.recv_frame()? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let frame = conn.handle_frame(&header, payload, handler)?;
    Ok(Some(frame))
}

/// Receive and dispatch frames until the peer closes the connection.
pub fn run<S: SessionOps, H: FrameHandler>(
    conn: &mut Connection<S>,
    handler: &mut H,
) -> Result<()> {
    loop {
        if run_once(conn, handler)?.is_none() {
            log::debug!("peer closed the connection");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::frames::{DataFrame, HeadersFrame, PingFrame};
    use crate::session::{from_tcp_stream, FdSessionOps};
    use crate::settings::Settings;
    use bytes::Bytes;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        headers: Vec<u32>,
        data: Vec<Bytes>,
        pings: Vec<[u8; 8]>,
    }

    impl FrameHandler for Recorder {
        fn on_headers(&mut self, frame: &HeadersFrame) {
            self.headers.push(frame.stream_id);
        }

        fn on_data(&mut self, frame: &DataFrame) {
            self.data.push(frame.data.clone());
        }

        fn on_ping(&mut self, frame: &PingFrame) {
            self.pings.push(frame.data);
        }
    }

    fn server_over_pipe(
        wire: Vec<u8>,
    ) -> (Connection<FdSessionOps>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let writer = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&wire).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let conn = Connection::server(from_tcp_stream(stream), Settings::default_settings());
        (conn, writer)
    }

    #[test]
    fn test_loop_dispatches_until_eof() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&FrameCodec::encode(&Frame::Headers(HeadersFrame::new(
            1,
            Bytes::from("blk"),
            false,
            true,
        ))));
        wire.extend_from_slice(&FrameCodec::encode(&Frame::Data(DataFrame::new(
            1,
            Bytes::from("hello"),
            true,
        ))));

        let (mut conn, writer) = server_over_pipe(wire);
        let mut recorder = Recorder::default();
        run(&mut conn, &mut recorder).unwrap();

        assert_eq!(recorder.headers, vec![1]);
        assert_eq!(recorder.data, vec![Bytes::from("hello")]);
        writer.join().unwrap();
    }

    #[test]
    fn test_unknown_frame_type_is_skipped() {
        // A frame with type 0x7f: 9-octet header, 3-octet payload
        let mut wire = vec![0x00, 0x00, 0x03, 0x7f, 0x00, 0x00, 0x00, 0x00, 0x00];
        wire.extend_from_slice(&[0xde, 0xad, 0xbe]);
        wire.extend_from_slice(&FrameCodec::encode(&Frame::Ping(PingFrame::new([1; 8]))));

        let (mut conn, writer) = server_over_pipe(wire);
        let mut recorder = Recorder::default();

        // Unknown frame is consumed and discarded
        assert_eq!(run_once(&mut conn, &mut recorder).unwrap(), Some(None));
        // The following PING still parses, proving resynchronization
        let frame = run_once(&mut conn, &mut recorder).unwrap().flatten();
        assert!(matches!(frame, Some(Frame::Ping(_))));
        assert_eq!(recorder.pings, vec![[1; 8]]);
        writer.join().unwrap();
    }

    #[test]
    fn test_empty_connection_ends_cleanly() {
        let (mut conn, writer) = server_over_pipe(Vec::new());
        run(&mut conn, &mut ()).unwrap();
        writer.join().unwrap();
    }
}
