//! Protocol library for trainer-driver
//!
//! Wire formats for the two hardware links, with no I/O of their own:
//!
//! - the wireless stick's binary framing (sync, length, id, payload, XOR
//!   checksum), a byte-at-a-time [`FrameAssembler`] and the routing
//!   decisions made on validated frames;
//! - the ergometer's CR-terminated ASCII command set, model-family
//!   classification and reply parsing.
//!
//! # Example
//!
//! ```
//! use protocol::{encode_frame, classify, FrameAssembler, Route};
//!
//! let bytes = encode_frame(0x4E, &[0x02, 0x11, 0x22]).unwrap();
//!
//! let mut assembler = FrameAssembler::new();
//! let mut routes = Vec::new();
//! assembler.feed(&bytes, |frame| routes.push(classify(&frame)));
//!
//! assert_eq!(routes, vec![Route::Channel]);
//! ```

pub mod codec;
pub mod ergometer;
pub mod error;
pub mod messages;
pub mod route;
pub mod types;

pub use codec::{
    AssemblerStats, FRAME_OVERHEAD, FrameAssembler, MAX_LENGTH, ParserState, SYNC_BYTE, checksum,
    encode_frame,
};
pub use ergometer::{Command, ModelFamily};
pub use error::{ProtocolError, Result};
pub use route::{ChannelMessage, Route, classify};
pub use types::{CHANNEL_COUNT, Channel, Frame};
