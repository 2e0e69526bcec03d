//! Framing of the messages that travel between ranks.
//!
//! Every frame starts with a fixed header of five little-endian `i64`
//! words, `[kind, origin0, origin1, extent0, extent1]`, and result
//! frames follow it with the computed values as little-endian `u32`.
//! A span uses `origin0` for its offset and `extent0` for its length.
//! A negative kind is the stop signal.

use channel::Tag;
use errors::{Error, Result};
use tasks::Task;

const KIND_SPAN: i64 = 0;
const KIND_BLOCK: i64 = 1;
const KIND_STOP: i64 = -1;

const HEADER_WORDS: usize = 5;

/// Length of the header in bytes.
pub const HEADER_LEN: usize = HEADER_WORDS * 8;

/// Length in bytes of a frame carrying `cells` values.
pub fn max_frame_len(cells: usize) -> usize {
    HEADER_LEN + cells * 4
}

/// Like `max_frame_len`, or `None` if the length overflows.
pub fn checked_frame_len(cells: usize) -> Option<usize> {
    cells.checked_mul(4)?.checked_add(HEADER_LEN)
}

/// A decoded message.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A task to compute.
    Work(Task),
    /// A computed task: one value per cell, in the task's row-major order.
    Result {
        /// The task the values belong to.
        task: Task,
        /// Iteration counts.
        values: Vec<u32>,
    },
    /// No more work.
    Stop,
}

impl Frame {
    /// The tag the frame is sent with.
    pub fn tag(&self) -> Tag {
        match *self {
            Frame::Work(_) => Tag::Work,
            Frame::Result { .. } => Tag::Result,
            Frame::Stop => Tag::Stop,
        }
    }

    /// Serialize the frame, header first.
    pub fn encode(&self) -> Vec<u8> {
        let (header, values) = match *self {
            Frame::Work(ref task) => (task_header(task), &[][..]),
            Frame::Result {
                ref task,
                ref values,
            } => (task_header(task), values.as_slice()),
            Frame::Stop => ([KIND_STOP, 0, 0, 0, 0], &[][..]),
        };
        let mut bytes = Vec::with_capacity(max_frame_len(values.len()));
        for word in &header {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Parse a frame received with `tag`.  The tag, the header and the
    /// payload length must all agree.
    pub fn decode(tag: Tag, bytes: &[u8]) -> Result<Frame> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::protocol(format!(
                "{} byte frame is shorter than its header",
                bytes.len()
            )));
        }
        let (head, body) = bytes.split_at(HEADER_LEN);
        let mut header = [0i64; HEADER_WORDS];
        for (word, chunk) in header.iter_mut().zip(head.chunks(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = i64::from_le_bytes(raw);
        }

        if header[0] == KIND_STOP || tag == Tag::Stop {
            if header[0] != KIND_STOP || tag != Tag::Stop || !body.is_empty() {
                return Err(Error::protocol(format!(
                    "malformed stop: tag {:?}, header {:?}, {} payload bytes",
                    tag,
                    header,
                    body.len()
                )));
            }
            return Ok(Frame::Stop);
        }

        let task = header_task(&header)?;
        let expected = task
            .checked_len()
            .and_then(|cells| cells.checked_mul(4))
            .ok_or_else(|| Error::protocol(format!("{:?} is too large to frame", task)))?;
        match tag {
            Tag::Work if body.is_empty() => Ok(Frame::Work(task)),
            Tag::Work => Err(Error::protocol(format!(
                "work frame for {:?} carries {} payload bytes",
                task,
                body.len()
            ))),
            Tag::Result => {
                if body.len() != expected {
                    return Err(Error::protocol(format!(
                        "result for {:?} carries {} bytes, expected {}",
                        task,
                        body.len(),
                        expected
                    )));
                }
                let values = body
                    .chunks(4)
                    .map(|chunk| {
                        let mut raw = [0u8; 4];
                        raw.copy_from_slice(chunk);
                        u32::from_le_bytes(raw)
                    })
                    .collect();
                Ok(Frame::Result { task, values })
            }
            Tag::Stop => unreachable!(),
        }
    }
}

fn task_header(task: &Task) -> [i64; HEADER_WORDS] {
    match *task {
        Task::Span { offset, len } => [KIND_SPAN, offset as i64, 0, len as i64, 0],
        Task::Block {
            row,
            col,
            height,
            width,
        } => [
            KIND_BLOCK,
            row as i64,
            col as i64,
            height as i64,
            width as i64,
        ],
    }
}

fn header_task(header: &[i64; HEADER_WORDS]) -> Result<Task> {
    if header[1..].iter().any(|&word| word < 0) {
        return Err(Error::protocol(format!("negative field in header {:?}", header)));
    }
    let field = |i: usize| header[i] as usize;
    match header[0] {
        KIND_SPAN => Ok(Task::Span {
            offset: field(1),
            len: field(3),
        }),
        KIND_BLOCK => Ok(Task::Block {
            row: field(1),
            col: field(2),
            height: field(3),
            width: field(4),
        }),
        kind => Err(Error::protocol(format!("unknown frame kind {}", kind))),
    }
}
