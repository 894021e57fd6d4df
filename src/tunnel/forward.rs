//! Per-connection duplex forwarding.
//!
//! Each accepted local connection gets one `direct-tcpip` sub-stream (RFC
//! 4254) to the remote target and a relay loop copying bytes both ways in
//! fixed-size chunks. A zero-length read on either side means the peer
//! closed, and ends the relay; so does any I/O error, and so does session
//! cancellation. Both endpoints are dropped, and therefore closed, on every
//! exit path.

use std::sync::Arc;

use russh::client;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::TunnelError;
use super::session::TunnelHandler;

/// Bytes read per relay step.
pub(crate) const CHUNK_SIZE: usize = 4096;

/// Copy bytes both ways between two endpoints until EOF, an I/O error or
/// cancellation. Returns the byte counts relayed in each direction
/// (`a -> b`, `b -> a`).
///
/// Within one direction bytes arrive in source order; the two directions are
/// independent streams.
pub(crate) async fn relay_streams<A, B>(
    a: A,
    b: B,
    cancel: CancellationToken,
) -> std::io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let mut buf_a = [0u8; CHUNK_SIZE];
    let mut buf_b = [0u8; CHUNK_SIZE];
    let mut a_to_b: u64 = 0;
    let mut b_to_a: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            read = a_read.read(&mut buf_a) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                b_write.write_all(&buf_a[..n]).await?;
                a_to_b += n as u64;
            }

            read = b_read.read(&mut buf_b) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                a_write.write_all(&buf_b[..n]).await?;
                b_to_a += n as u64;
            }
        }
    }

    Ok((a_to_b, b_to_a))
}

/// Forward one accepted local connection through the SSH session.
///
/// Opens a `direct-tcpip` sub-stream to `target_host:target_port` and relays
/// until either side closes or the session is cancelled.
pub(crate) async fn forward_connection(
    handle: Arc<client::Handle<TunnelHandler>>,
    local: TcpStream,
    target_host: String,
    target_port: u16,
    cancel: CancellationToken,
) -> Result<(u64, u64), TunnelError> {
    let (originator_ip, originator_port) = match local.peer_addr() {
        Ok(peer) => (peer.ip().to_string(), peer.port() as u32),
        Err(_) => ("127.0.0.1".to_string(), 0),
    };

    let channel = handle
        .channel_open_direct_tcpip(
            &target_host,
            target_port as u32,
            &originator_ip,
            originator_port,
        )
        .await
        .map_err(|e| TunnelError::Network(format!("failed to open direct-tcpip channel: {e}")))?;

    let relayed = relay_streams(local, channel.into_stream(), cancel)
        .await
        .map_err(|e| TunnelError::Network(format!("forwarding ended with error: {e}")))?;

    debug!(
        sent = relayed.0,
        received = relayed.1,
        "forwarded connection closed"
    );
    Ok(relayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn relays_bytes_in_both_directions_in_order() {
        let (client_a, relay_a) = duplex(64);
        let (client_b, relay_b) = duplex(64);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_streams(relay_a, relay_b, cancel));

        let (mut a_read, mut a_write) = tokio::io::split(client_a);
        let (mut b_read, mut b_write) = tokio::io::split(client_b);

        a_write.write_all(b"hello over the tunnel").await.unwrap();
        let mut buf = [0u8; 21];
        b_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello over the tunnel");

        b_write.write_all(b"and back again").await.unwrap();
        let mut buf = [0u8; 14];
        a_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"and back again");

        // Closing side A propagates EOF and ends the relay.
        drop(a_read);
        drop(a_write);
        let (a_to_b, b_to_a) = relay.await.unwrap().unwrap();
        assert_eq!(a_to_b, 21);
        assert_eq!(b_to_a, 14);
    }

    #[tokio::test]
    async fn relays_payloads_larger_than_one_chunk() {
        let (client_a, relay_a) = duplex(256);
        let (client_b, relay_b) = duplex(256);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_streams(relay_a, relay_b, cancel));

        let payload: Vec<u8> = (0..3 * CHUNK_SIZE + 17).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let (_, mut a_write) = tokio::io::split(client_a);
        let (mut b_read, _b_write) = tokio::io::split(client_b);

        let writer = tokio::spawn(async move {
            a_write.write_all(&payload).await.unwrap();
            a_write.shutdown().await.unwrap();
        });

        let mut received = vec![0u8; expected.len()];
        b_read.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        writer.await.unwrap();
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_ends_an_idle_relay() {
        let (_client_a, relay_a) = duplex(64);
        let (_client_b, relay_b) = duplex(64);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_streams(relay_a, relay_b, cancel.clone()));

        cancel.cancel();
        let (a_to_b, b_to_a) = relay.await.unwrap().unwrap();
        assert_eq!((a_to_b, b_to_a), (0, 0));
    }
}
