pub mod codec;
pub mod ddos;
pub mod throttle;
pub mod wire;

use anyhow::{bail, Result};
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use codec::{Packet, HEADER_LEN};

/// Reads exactly one frame from `stream` and decodes it.
///
/// Used by clients and tests; the server side decodes from its own
/// accumulator instead.
pub async fn read_framed_packet<P: Packet>(stream: &mut TcpStream, max_frame_size: usize) -> Result<P> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let total = u16::from_le_bytes([header[0], header[1]]) as usize;
    if total < HEADER_LEN || total > max_frame_size {
        bail!("bad frame length {}", total);
    }

    let mut buf = BytesMut::with_capacity(total);
    buf.extend_from_slice(&header);
    buf.resize(total, 0);
    stream.read_exact(&mut buf[HEADER_LEN..]).await?;

    match codec::decode::<P>(&mut buf, max_frame_size)? {
        Some(packet) => Ok(packet),
        None => bail!("incomplete frame"),
    }
}
