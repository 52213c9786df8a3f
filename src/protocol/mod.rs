//! # Printer Command Protocol
//!
//! Low-level command building for ESC/POS-style receipt printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Named control-code builders (init, size, feed, pulse)
//! - [`encoder`]: Fragment list to [`CommandBuffer`](encoder::CommandBuffer)
//!
//! ## Usage Example
//!
//! ```
//! use cajero::protocol::{commands, encoder::{encode, Fragment}};
//!
//! let buf = encode(&[
//!     Fragment::Raw(commands::init()),
//!     Fragment::Text("hello\r\n".into()),
//!     Fragment::Raw(commands::cut_partial()),
//! ])
//! .unwrap();
//! assert_eq!(&buf.as_bytes()[..2], &[0x1B, 0x40]);
//! ```

pub mod commands;
pub mod encoder;

pub use encoder::{CommandBuffer, Fragment, encode, encode_lossy};
