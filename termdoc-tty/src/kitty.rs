//! Kitty graphics protocol framing, chunked transfer and the acknowledgement handshake.

use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rustix::fd::BorrowedFd;
use rustix::event::{PollFd, PollFlags};
use rustix::io::Errno;
use termdoc_core::ImageId;
use tracing::{debug, trace, warn};

pub const APC_START: &[u8] = b"\x1b_G";
pub const APC_END: &[u8] = b"\x1b\\";

/// Encoded payload bytes per frame.
pub const CHUNK_SIZE: usize = 4096;

const QUERY_IMAGE_ID: ImageId = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Rgb,
    Rgba,
    Png,
}

impl Format {
    pub fn code(self) -> u8 {
        match self {
            Format::Rgb => 24,
            Format::Rgba => 32,
            Format::Png => 100,
        }
    }

    pub fn for_channels(channels: u8) -> Self {
        if channels == 4 {
            Format::Rgba
        } else {
            Format::Rgb
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer of image {id} was cancelled")]
    Cancelled { id: String },
}

/// Ordered `key=value` control data of one graphics command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphicsCommand {
    pairs: Vec<(&'static str, String)>,
}

impl GraphicsCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &'static str, value: impl Display) {
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.pairs.iter().position(|(k, _)| *k == key)?;
        Some(self.pairs.remove(idx).1)
    }

    pub fn encode(&self, payload: Option<&[u8]>) -> BytesMut {
        let payload_len = payload.map_or(0, |p| p.len() + 1);
        let mut frame = BytesMut::with_capacity(APC_START.len() + 64 + payload_len);
        frame.put_slice(APC_START);
        for (idx, (key, value)) in self.pairs.iter().enumerate() {
            if idx > 0 {
                frame.put_u8(b',');
            }
            frame.put_slice(key.as_bytes());
            frame.put_u8(b'=');
            frame.put_slice(value.as_bytes());
        }
        if let Some(payload) = payload {
            frame.put_u8(b';');
            frame.put_slice(payload);
        }
        frame.put_slice(APC_END);
        frame
    }

    /// Upload without displaying. Replies are suppressed.
    pub fn transmit(id: ImageId, format: Format, width: u32, height: u32) -> Self {
        Self::new()
            .set("a", 't')
            .set("t", 'd')
            .set("f", format.code())
            .set("s", width)
            .set("v", height)
            .set("i", id)
            .set("q", 2)
    }

    /// Display a previously uploaded image at the cursor. Asks for a reply.
    pub fn place(id: ImageId, z_index: i32) -> Self {
        Self::new()
            .set("a", 'p')
            .set("i", id)
            .set("z", z_index)
            .set("C", 1)
    }

    pub fn delete_image(id: ImageId) -> Self {
        Self::new()
            .set("a", 'd')
            .set("d", 'I')
            .set("i", id)
            .set("q", 2)
    }

    /// Removes placements only; the terminal keeps the image data.
    pub fn clear_placement(id: ImageId) -> Self {
        Self::new()
            .set("a", 'd')
            .set("d", 'i')
            .set("i", id)
            .set("q", 2)
    }

    pub fn delete_all_at_z(z_index: i32) -> Self {
        Self::new()
            .set("a", 'd')
            .set("d", 'Z')
            .set("z", z_index)
            .set("q", 2)
    }

    pub fn query() -> Self {
        Self::new()
            .set("a", 'q')
            .set("i", QUERY_IMAGE_ID)
            .set("s", 1)
            .set("v", 1)
            .set("t", 'd')
            .set("f", Format::Rgb.code())
    }
}

/// Where handshake replies come from.
pub trait ReplySource {
    /// Waits at most `timeout` for one byte. `Ok(None)` means nothing arrived in time.
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;

    /// Throws away the rest of a reply that will no longer be read.
    fn discard_pending(&mut self) {}
}

/// Scripted replies. An empty queue reads as a closed stream.
impl ReplySource for VecDeque<u8> {
    fn read_byte(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
        self.pop_front()
            .map(Some)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }

    fn discard_pending(&mut self) {
        let mut tail = Vec::new();
        while let Some(byte) = self.pop_front() {
            tail.push(byte);
            if tail.ends_with(APC_END) {
                break;
            }
        }
    }
}

/// Replies read straight from the controlling terminal's stdin, unbuffered.
pub struct TtyReplies {
    fd: BorrowedFd<'static>,
}

impl TtyReplies {
    const DRAIN_WAIT: Duration = Duration::from_millis(20);

    pub fn stdin() -> Self {
        Self {
            fd: rustix::stdio::stdin(),
        }
    }
}

impl ReplySource for TtyReplies {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
        match rustix::event::poll(&mut fds, timeout_ms) {
            Ok(0) | Err(Errno::INTR) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
        let mut byte = [0u8; 1];
        match rustix::io::read(self.fd, &mut byte) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(_) => Ok(Some(byte[0])),
            Err(Errno::INTR) | Err(Errno::AGAIN) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn discard_pending(&mut self) {
        let mut tail = Vec::new();
        while let Ok(Some(byte)) = self.read_byte(Self::DRAIN_WAIT) {
            tail.push(byte);
            if tail.ends_with(APC_END) {
                break;
            }
        }
        if !tail.is_empty() {
            trace!(bytes = tail.len(), "discarded late reply");
        }
    }
}

/// Shared flag that aborts pending handshakes and chunked uploads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Received(Vec<u8>),
    TimedOut,
    Cancelled,
    Closed,
}

/// One in-flight reply. Dropping it before the terminator was seen discards
/// whatever the terminal still sends for it. Keys typed before the reply
/// started are moved to `typed_ahead`.
struct PendingReply<'a, R: ReplySource> {
    source: &'a mut R,
    typed_ahead: &'a mut Vec<u8>,
    received: Vec<u8>,
    finished: bool,
}

impl<'a, R: ReplySource> PendingReply<'a, R> {
    fn new(source: &'a mut R, typed_ahead: &'a mut Vec<u8>) -> Self {
        Self {
            source,
            typed_ahead,
            received: Vec::new(),
            finished: false,
        }
    }

    /// Moves bytes preceding the reply's start marker out of `received`.
    /// Without a marker everything counts as input unless `complete`.
    fn split_typed_ahead(&mut self, complete: bool) {
        let end = match find(&self.received, APC_START) {
            Some(start) => start,
            None if complete => 0,
            None => self.received.len(),
        };
        self.typed_ahead.extend(self.received.drain(..end));
    }

    fn read(mut self, timeout: Duration, cancel: &CancellationToken) -> Reply {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Reply::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return Reply::TimedOut;
            }
            match self.source.read_byte(deadline - now) {
                Ok(Some(byte)) => {
                    self.received.push(byte);
                    if self.received.ends_with(APC_END) {
                        self.finished = true;
                        self.split_typed_ahead(true);
                        return Reply::Received(std::mem::take(&mut self.received));
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(?err, "reply stream closed");
                    return Reply::Closed;
                }
            }
        }
    }
}

impl<R: ReplySource> Drop for PendingReply<'_, R> {
    fn drop(&mut self) {
        if !self.finished {
            self.split_typed_ahead(false);
            self.source.discard_pending();
        }
    }
}

pub struct Transport<W: Write, R: ReplySource> {
    writer: W,
    replies: R,
    timeout: Duration,
    cancel: CancellationToken,
    z_index: i32,
    typed_ahead: Vec<u8>,
}

impl<W: Write, R: ReplySource> Transport<W, R> {
    pub fn new(writer: W, replies: R, timeout: Duration) -> Self {
        Self {
            writer,
            replies,
            timeout,
            cancel: CancellationToken::new(),
            z_index: -1,
            typed_ahead: Vec::new(),
        }
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn z_index(&self) -> i32 {
        self.z_index
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Input bytes that arrived while a reply was awaited.
    pub fn take_typed_ahead(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.typed_ahead)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn transmit(&mut self, command: &GraphicsCommand, payload: Option<&[u8]>) -> Result<()> {
        let frame = command.encode(payload);
        self.writer
            .write_all(&frame)
            .context("failed to write graphics command")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Sends `command` and blocks for the terminal's reply. Only I/O errors on
    /// the write side are raised; anything other than an `OK` reply is `false`.
    pub fn transmit_with_ack(
        &mut self,
        command: &GraphicsCommand,
        payload: Option<&[u8]>,
    ) -> Result<bool> {
        self.transmit(command, payload)?;
        let reply = PendingReply::new(&mut self.replies, &mut self.typed_ahead)
            .read(self.timeout, &self.cancel);
        Ok(match reply {
            Reply::Received(bytes) => {
                let ok = bytes.windows(2).any(|w| w == b"OK");
                if !ok {
                    debug!(
                        reply = %String::from_utf8_lossy(&bytes).escape_debug(),
                        "graphics command refused"
                    );
                }
                ok
            }
            other => {
                debug!(?other, id = ?command.get("i"), "no acknowledgement");
                false
            }
        })
    }

    /// Sends `raw` as a sequence of frames. Non-PNG data is zlib-compressed
    /// first. Returns the number of frames written.
    pub fn transmit_chunked(&mut self, mut command: GraphicsCommand, raw: &[u8]) -> Result<usize> {
        let compressed;
        let data: &[u8] = if command.get("f") == Some("100") {
            raw
        } else {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(raw)?;
            compressed = encoder.finish().context("failed to compress image data")?;
            command.insert("o", 'z');
            &compressed
        };

        let encoded = BASE64.encode(data);
        let id = command.get("i").unwrap_or_default().to_string();
        let compression = command.get("o").map(str::to_string);
        let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();
        let total = chunks.len();

        for (idx, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.abort_transfer(&id, idx);
                return Err(TransferError::Cancelled { id }.into());
            }
            let more = idx + 1 < total;
            let mut frame = if idx == 0 {
                command.clone()
            } else {
                let mut follow = GraphicsCommand::new().set("i", &id);
                if let Some(o) = &compression {
                    follow.insert("o", o);
                }
                follow
            };
            if more {
                frame.insert("m", 1);
            }
            if let Err(err) = self.transmit(&frame, Some(chunk)) {
                self.abort_transfer(&id, idx);
                return Err(err);
            }
        }
        trace!(%id, frames = total, bytes = raw.len(), "image transmitted");
        Ok(total)
    }

    fn abort_transfer(&mut self, id: &str, sent: usize) {
        if sent == 0 {
            return;
        }
        warn!(%id, sent, "aborting partial image transfer");
        let terminator = GraphicsCommand::new().set("i", id).set("q", 2);
        let _ = self.transmit(&terminator, None);
        if let Ok(id) = id.parse::<ImageId>() {
            let _ = self.delete_image(id);
        }
    }

    pub fn delete_image(&mut self, id: ImageId) -> Result<()> {
        self.transmit(&GraphicsCommand::delete_image(id), None)
    }

    pub fn clear_placement(&mut self, id: ImageId) -> Result<()> {
        self.transmit(&GraphicsCommand::clear_placement(id), None)
    }

    pub fn delete_all_at_z(&mut self) -> Result<()> {
        let z = self.z_index;
        self.transmit(&GraphicsCommand::delete_all_at_z(z), None)
    }

    /// Asks the terminal whether it speaks the graphics protocol at all.
    pub fn query_support(&mut self) -> Result<bool> {
        let payload = BASE64.encode([0u8; 3]);
        self.transmit_with_ack(&GraphicsCommand::query(), Some(payload.as_bytes()))
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        self.writer.write_all(b"\x1b[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal paints everything buffered since the start.
    pub fn end_sync_update(&mut self) -> Result<()> {
        self.writer.write_all(b"\x1b[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A decoded frame. Used to inspect what was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub keys: Vec<(String, String)>,
    pub payload: Option<Vec<u8>>,
}

impl Frame {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Splits a byte stream into graphics frames, skipping anything between them.
pub fn parse_frames(stream: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut rest = stream;
    while let Some(start) = find(rest, APC_START) {
        let body_start = start + APC_START.len();
        let Some(len) = find(&rest[body_start..], APC_END) else {
            break;
        };
        let body = &rest[body_start..body_start + len];
        let (control, payload) = match body.iter().position(|&b| b == b';') {
            Some(split) => (&body[..split], Some(body[split + 1..].to_vec())),
            None => (body, None),
        };
        let keys = String::from_utf8_lossy(control)
            .split(',')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        frames.push(Frame { keys, payload });
        rest = &rest[body_start + len + APC_END.len()..];
    }
    frames
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn transport(replies: &[u8]) -> Transport<Vec<u8>, VecDeque<u8>> {
        Transport::new(
            Vec::new(),
            replies.iter().copied().collect(),
            Duration::from_millis(200),
        )
    }

    fn noisy_bytes(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn frame_layout_matches_protocol() {
        let frame = GraphicsCommand::new()
            .set("a", 'p')
            .set("i", 3)
            .encode(Some(b"AAAA"));
        assert_eq!(&frame[..], b"\x1b_Ga=p,i=3;AAAA\x1b\\");
        let bare = GraphicsCommand::delete_all_at_z(-1).encode(None);
        assert_eq!(&bare[..], b"\x1b_Ga=d,d=Z,z=-1,q=2\x1b\\");
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut command = GraphicsCommand::transmit(1, Format::Rgb, 2, 2);
        command.insert("f", Format::Png.code());
        assert_eq!(command.get("f"), Some("100"));
        assert_eq!(command.remove("q").as_deref(), Some("2"));
        assert_eq!(command.get("q"), None);
    }

    #[test]
    fn ok_reply_is_success() {
        let mut t = transport(b"OK\x1b\\");
        assert!(t
            .transmit_with_ack(&GraphicsCommand::place(1, -1), None)
            .unwrap());
    }

    #[test]
    fn error_reply_is_failure_without_raising() {
        let mut t = transport(b"ERR\x1b\\");
        assert!(!t
            .transmit_with_ack(&GraphicsCommand::place(1, -1), None)
            .unwrap());
        let mut t = transport(b"\x1b_Gi=7;ENOENT:Put command refers to non-existent image\x1b\\");
        assert!(!t
            .transmit_with_ack(&GraphicsCommand::place(7, -1), None)
            .unwrap());
    }

    #[test]
    fn keys_typed_before_a_reply_are_kept() {
        let mut t = transport(b"jk\x1b_Gi=1;OK\x1b\\");
        assert!(t
            .transmit_with_ack(&GraphicsCommand::place(1, -1), None)
            .unwrap());
        assert_eq!(t.take_typed_ahead(), b"jk");
        assert!(t.take_typed_ahead().is_empty());

        let mut t = transport(b"q");
        assert!(!t
            .transmit_with_ack(&GraphicsCommand::place(1, -1), None)
            .unwrap());
        assert_eq!(t.take_typed_ahead(), b"q");
    }

    #[test]
    fn silent_terminal_is_failure() {
        let mut t = transport(b"");
        assert!(!t.query_support().unwrap());
        let frames = parse_frames(t.writer());
        assert_eq!(frames[0].get("a"), Some("q"));
        assert_eq!(frames[0].payload.as_deref(), Some(&b"AAAA"[..]));
    }

    #[test]
    fn cancelled_handshake_discards_its_reply() {
        let mut t = transport(b"\x1b_Gi=1;OK\x1b\\\x1b_Gi=2;ENOENT\x1b\\");
        t.cancellation().cancel();
        assert!(!t
            .transmit_with_ack(&GraphicsCommand::place(1, -1), None)
            .unwrap());
        t.cancellation().reset();
        // the first reply was dropped with the cancelled request
        assert!(!t
            .transmit_with_ack(&GraphicsCommand::place(2, -1), None)
            .unwrap());
    }

    #[test]
    fn chunked_transfer_splits_and_flags_frames() {
        let raw = noisy_bytes(20_000);
        let mut t = transport(b"");
        let command = GraphicsCommand::transmit(5, Format::Rgb, 100, 66);
        let sent = t.transmit_chunked(command, &raw).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&raw).unwrap();
        let encoded_len = BASE64.encode(encoder.finish().unwrap()).len();
        let expected = encoded_len.div_ceil(CHUNK_SIZE);
        assert!(expected > 1);

        let frames = parse_frames(t.writer());
        assert_eq!(sent, expected);
        assert_eq!(frames.len(), expected);
        for (idx, frame) in frames.iter().enumerate() {
            assert_eq!(frame.get("o"), Some("z"));
            assert_eq!(frame.get("i"), Some("5"));
            if idx + 1 < frames.len() {
                assert_eq!(frame.get("m"), Some("1"));
                assert_eq!(frame.payload.as_ref().map(Vec::len), Some(CHUNK_SIZE));
            } else {
                assert_eq!(frame.get("m"), None);
            }
            if idx > 0 {
                assert_eq!(frame.keys.len(), if idx + 1 < frames.len() { 3 } else { 2 });
                assert_eq!(frame.get("f"), None);
            }
        }
        assert_eq!(frames[0].get("f"), Some("24"));
        assert_eq!(frames[0].get("s"), Some("100"));
        assert_eq!(frames[0].get("v"), Some("66"));

        let payload: Vec<u8> = frames
            .iter()
            .flat_map(|f| f.payload.clone().unwrap_or_default())
            .collect();
        let compressed = BASE64.decode(payload).unwrap();
        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn png_payload_is_not_recompressed() {
        let mut t = transport(b"");
        let command = GraphicsCommand::transmit(2, Format::Png, 1, 1);
        let sent = t.transmit_chunked(command, b"\x89PNG fake").unwrap();
        assert_eq!(sent, 1);
        let frames = parse_frames(t.writer());
        assert_eq!(frames[0].get("o"), None);
        assert_eq!(frames[0].get("m"), None);
    }

    #[test]
    fn cancelled_transfer_deletes_partial_image() {
        struct CancelAfterFirstFrame {
            token: CancellationToken,
            out: Vec<u8>,
        }

        impl Write for CancelAfterFirstFrame {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.out.extend_from_slice(buf);
                if buf.ends_with(APC_END) {
                    self.token.cancel();
                }
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut t = Transport::new(
            CancelAfterFirstFrame {
                token: CancellationToken::new(),
                out: Vec::new(),
            },
            VecDeque::new(),
            Duration::from_millis(50),
        );
        let token = t.cancellation();
        t.writer_mut().token = token;

        let err = t
            .transmit_chunked(
                GraphicsCommand::transmit(9, Format::Rgba, 300, 300),
                &noisy_bytes(40_000),
            )
            .unwrap_err();
        assert!(err.downcast_ref::<TransferError>().is_some());

        let frames = parse_frames(&t.writer().out);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].get("m"), Some("1"));
        assert_eq!(frames[1].get("m"), None);
        assert_eq!(frames[2].get("a"), Some("d"));
        assert_eq!(frames[2].get("d"), Some("I"));
        assert_eq!(frames[2].get("i"), Some("9"));
    }

    #[test]
    fn parse_frames_skips_text_between_frames() {
        let stream = b"\x1b[2J\x1b_Ga=d,d=I,i=4\x1b\\junk\x1b_Ga=p;AB\x1b\\";
        let frames = parse_frames(stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get("i"), Some("4"));
        assert_eq!(frames[1].payload.as_deref(), Some(&b"AB"[..]));
    }
}
