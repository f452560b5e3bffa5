//! Core shared types for trace analysis
//!
//! - `packet`: raw frames and decoded TCP packets
//! - `parser`: layered Ethernet/IPv4/TCP decoding
//! - `flow`: the bidirectional connection record

pub mod flow;
pub mod packet;
pub mod parser;

pub use flow::{Connection, ConnectionKey, ConnectionStatus, ConnectionTiming, Direction};
pub use packet::{Endpoint, Packet, RawFrame, TcpFlags};
pub use parser::{decode_frame, DecodeOutcome, Header};
