//! Layered Ethernet/IPv4/TCP frame decoding
//!
//! Decoding is done in distinct stages, each of which may reject the frame:
//! - Ethernet header (fixed 14 bytes, must carry IPv4)
//! - IPv4 header (20 bytes minimum, plus options per the IHL field)
//! - TCP header (fixed 20 bytes; options are not required to be captured)
//!
//! The first failing stage wins. Nothing is allocated for rejected frames.

use std::net::Ipv4Addr;

use etherparse::{EtherType, Ethernet2Header, IpNumber, Ipv4Header, TcpHeader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::packet::{Packet, RawFrame, TcpFlags};

/// Header that a truncated frame failed to carry in full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Header {
    Ethernet,
    Ip,
    IpOptions,
    Tcp,
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Header::Ethernet => write!(f, "Ethernet header"),
            Header::Ip => write!(f, "IP header"),
            Header::IpOptions => write!(f, "IP header with options"),
            Header::Tcp => write!(f, "TCP header"),
        }
    }
}

/// Why a frame did not decode into a packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeOutcome {
    #[error("truncated and lacks a full {0}")]
    TooShort(Header),

    #[error("non-IP packet")]
    NotIpv4,

    #[error("non-TCP packet")]
    NotTcp,

    #[error("IP header length field {0} is below the 5-word minimum")]
    BadIpHeaderLength(u8),

    #[error("TCP data offset {0} is below the 5-word minimum")]
    BadTcpDataOffset(u8),

    #[error("IP total length {total_len} is smaller than the {header_len} bytes of headers")]
    NegativePayload { total_len: u16, header_len: usize },
}

impl DecodeOutcome {
    /// Frequent, benign rejections that are not worth a warning
    pub fn is_benign(&self) -> bool {
        matches!(self, DecodeOutcome::NotIpv4 | DecodeOutcome::NotTcp)
    }
}

/// Decode a raw Ethernet frame into a TCP packet
pub fn decode_frame(frame: &RawFrame) -> Result<Packet, DecodeOutcome> {
    let data = frame.data.as_slice();

    // Layer 2
    if data.len() < Ethernet2Header::LEN {
        return Err(DecodeOutcome::TooShort(Header::Ethernet));
    }
    let ether_type = u16::from_be_bytes([data[12], data[13]]);
    if ether_type != EtherType::IPV4.0 {
        return Err(DecodeOutcome::NotIpv4);
    }
    let ip = &data[Ethernet2Header::LEN..];

    // Layer 3
    if ip.len() < Ipv4Header::MIN_LEN {
        return Err(DecodeOutcome::TooShort(Header::Ip));
    }
    if ip[0] >> 4 != 4 {
        return Err(DecodeOutcome::NotIpv4);
    }
    let ihl = ip[0] & 0x0f;
    let ip_header_len = ihl as usize * 4;
    if ip_header_len < Ipv4Header::MIN_LEN {
        return Err(DecodeOutcome::BadIpHeaderLength(ihl));
    }
    if ip.len() < ip_header_len {
        return Err(DecodeOutcome::TooShort(Header::IpOptions));
    }
    if ip[9] != IpNumber::TCP.0 {
        return Err(DecodeOutcome::NotTcp);
    }
    let total_len = u16::from_be_bytes([ip[2], ip[3]]);
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);
    let tcp = &ip[ip_header_len..];

    // Layer 4
    if tcp.len() < TcpHeader::MIN_LEN {
        return Err(DecodeOutcome::TooShort(Header::Tcp));
    }
    let data_offset = tcp[12] >> 4;
    let tcp_header_len = data_offset as usize * 4;
    if tcp_header_len < TcpHeader::MIN_LEN {
        return Err(DecodeOutcome::BadTcpDataOffset(data_offset));
    }

    let header_len = ip_header_len + tcp_header_len;
    let datalen = (total_len as usize)
        .checked_sub(header_len)
        .ok_or(DecodeOutcome::NegativePayload { total_len, header_len })?;

    Ok(Packet {
        timestamp: frame.timestamp,
        src_ip,
        dst_ip,
        src_port: u16::from_be_bytes([tcp[0], tcp[1]]),
        dst_port: u16::from_be_bytes([tcp[2], tcp[3]]),
        seq: u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]),
        ack: u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]),
        window: u16::from_be_bytes([tcp[14], tcp[15]]),
        datalen: datalen as u32,
        flags: TcpFlags::from_u8(tcp[13]),
    })
}
