//! Bidirectional splice between an SSH channel and a TCP connection
//! (§4.D item 5, §9 "Shared ownership of SSH channels").
//!
//! `tokio::io::copy_bidirectional` already gives us the "close of
//! either side terminates both" property design note 9 asks for: it
//! returns as soon as either half hits EOF or an error, and both
//! streams are dropped together by the caller immediately after.

use russh::{ChannelStream, Msg};
use tokio::net::TcpStream;
use tracing::debug;

use super::error::GatekeeperError;

pub async fn splice(channel_stream: ChannelStream<Msg>, mut tcp: TcpStream) -> Result<(), GatekeeperError> {
    let mut channel_stream = channel_stream;
    let (to_tcp, to_channel) = tokio::io::copy_bidirectional(&mut channel_stream, &mut tcp).await?;
    debug!(bytes_to_tcp = to_tcp, bytes_to_channel = to_channel, "splice ended");
    Ok(())
}
