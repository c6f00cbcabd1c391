//! Identity announcement.

use cfnet_proto::IdentityLine;
use tracing::error;

use crate::{connection::Connection, error::IdentityError, transport::Socket};

/// Send `IDENTITY[ USERNAME=<name>]\n` over the encrypted session.
///
/// The line is built completely before anything is written. If it would
/// not fit, the call fails and the server sees no bytes at all.
pub fn send_identity<S: Socket>(
    conn: &mut Connection<S>,
    username: Option<&str>,
) -> Result<(), IdentityError> {
    let session = conn.session_mut().ok_or(IdentityError::NotSecured)?;

    let identity = IdentityLine { username: username.map(str::to_owned) };
    let line = identity.encode().map_err(|e| {
        error!(error = %e, "sending IDENTITY truncated");
        IdentityError::Format(e)
    })?;

    session.send(&line).map_err(|e| {
        error!(error = %e, "failed to send IDENTITY");
        IdentityError::Send(e)
    })?;

    Ok(())
}
