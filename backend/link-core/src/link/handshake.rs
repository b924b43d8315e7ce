//! Fixed-length token exchange shared by the service and the worker client.

use crate::error::link::LinkError;

use models::TOKEN_LENGTH;

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout as TokioTimeout;

/// Read exactly [`TOKEN_LENGTH`] bytes and return them as text.
///
/// # Errors
///
/// - [`LinkError::Timeout`] if the peer is silent for longer than `limit`
/// - [`LinkError::AuthenticationFailed`] if the peer closes before a full token
///   (how the server signals a rejected handshake)
/// - [`LinkError::MalformedToken`] if the bytes are not ASCII
pub(crate) async fn read_token<R>(reader: &mut R, limit: Duration) -> Result<String, LinkError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; TOKEN_LENGTH];

    match TokioTimeout(limit, reader.read_exact(&mut buf)).await {
        Err(_) => {
            return Err(LinkError::timeout(format!(
                "no token received within {limit:?}"
            )));
        }
        Ok(Err(e))
            if matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset
            ) =>
        {
            return Err(LinkError::authentication_failed(
                "",
                "connection closed during handshake",
            ));
        }
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    if !buf.is_ascii() {
        return Err(LinkError::malformed_token("token is not ASCII"));
    }

    String::from_utf8(buf.to_vec()).map_err(|e| LinkError::malformed_token(e.to_string()))
}

pub(crate) async fn write_token<W>(writer: &mut W, token: &str) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    if token.len() != TOKEN_LENGTH {
        return Err(LinkError::malformed_token(format!(
            "refusing to send {} byte token",
            token.len()
        )));
    }

    writer.write_all(token.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
