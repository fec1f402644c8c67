//! oscbank OSC - Open Sound Control over UDP
//!
//! A small OSC 1.0 codec plus the two transport halves the bridge needs:
//! a sender bound to one remote endpoint and a server that routes inbound
//! messages through an exact-match dispatch table.

pub mod dispatch;
pub mod packet;
pub mod transport;

pub use dispatch::{Dispatcher, Handler};
pub use packet::{
    decode, encode, encode_message, OscError, OscMessage, OscPacket, OscType, MAX_BUNDLE_DEPTH,
};
pub use transport::{OscSender, OscServer};
