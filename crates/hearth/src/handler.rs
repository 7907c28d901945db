//! Per-connection handler: login, admission, and the two message pumps.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive the login frame → authenticate it
//!   2. `Registry::connect` → send `Welcome`
//!   3. Writer task: mailbox → socket, closing the socket when the
//!      mailbox ends
//!   4. Reader loop: socket → inbound queue, until the client goes away
//!   5. `Registry::retire`, exactly once

use std::sync::Arc;

use hearth_protocol::{ClientFrame, Codec, ConnectionId, Identity, ProtocolError, ServerFrame};
use hearth_session::{Authenticator, InboundSender, Proof, Registry};
use hearth_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::HearthError;
use crate::server::ServerState;

/// Retires the connection when the handler exits.
///
/// The normal path calls [`release`](Self::release) and waits for the
/// registry. If the handler unwinds or is cancelled first, `Drop` spawns
/// the retirement instead. Both go through [`Registry::retire`], which
/// never gives up with `Busy`.
struct DisconnectGuard {
    id: Option<ConnectionId>,
    registry: Arc<Registry>,
}

impl DisconnectGuard {
    fn new(id: ConnectionId, registry: Arc<Registry>) -> Self {
        Self {
            id: Some(id),
            registry,
        }
    }

    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.registry.retire(id).await {
                tracing::warn!(connection_id = %id, error = %e, "retire failed");
            }
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = registry.retire(id).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), HearthError>
where
    A: Authenticator,
    C: Codec,
{
    let peer = conn.peer_addr();
    let conn = Arc::new(conn);
    tracing::debug!(%peer, "handling new connection");

    // --- Step 1: Login ---
    let (identity, token) = match perform_login(&conn, &state).await {
        Ok(admitted) => admitted,
        Err(e) => {
            tracing::info!(%peer, error = %e, "login rejected");
            reject(&conn, &state.codec, &e).await;
            return Err(e);
        }
    };

    // --- Step 2: Admission ---
    let handle = match state.registry.connect(identity.as_str()).await {
        Ok(handle) => handle,
        Err(e) => {
            let e = HearthError::from(e);
            tracing::warn!(%peer, %identity, error = %e, "admission failed");
            reject(&conn, &state.codec, &e).await;
            return Err(e);
        }
    };
    let (id, outbound, inbound) = handle.into_parts();
    let guard = DisconnectGuard::new(id, Arc::clone(&state.registry));

    let welcome = ServerFrame::Welcome {
        identity: identity.clone(),
        connection_id: id,
        token,
    };
    let sent = match state.codec.encode(&welcome) {
        Ok(text) => conn.send(&text).await.map_err(HearthError::from),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = sent {
        guard.release().await;
        return Err(e);
    }
    tracing::info!(%peer, %identity, connection_id = %id, "client connected");

    // --- Step 3 and 4: Pumps ---
    let writer = tokio::spawn(write_outbound(Arc::clone(&conn), outbound, id));
    read_inbound(&conn, &inbound, id).await;

    // --- Step 5: Retire ---
    // Closing the mailbox lets the writer drain and close the socket.
    guard.release().await;
    if let Err(e) = writer.await {
        tracing::warn!(connection_id = %id, error = %e, "writer task failed");
    }
    tracing::info!(%peer, %identity, connection_id = %id, "client disconnected");

    Ok(())
}

/// Receives the login frame and turns it into an authenticated identity
/// plus a reconnect token.
async fn perform_login<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<(Identity, String), HearthError>
where
    A: Authenticator,
    C: Codec,
{
    let text = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(text))) => text,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before login".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("login timed out".into()).into());
        }
    };

    let proof = match state.codec.decode::<ClientFrame>(&text)? {
        ClientFrame::Login { identity, password } => Proof::Password { identity, password },
        ClientFrame::Token { token } => Proof::Token(token),
    };

    let identity = state.auth.authenticate(proof).await?;
    let token = state.auth.issue_token(&identity)?;
    Ok((identity, token))
}

/// Sends `Rejected` and closes the socket. Failures are ignored: the
/// client may already be gone.
async fn reject(conn: &WebSocketConnection, codec: &impl Codec, error: &HearthError) {
    let frame = ServerFrame::Rejected {
        reason: error.to_string(),
    };
    if let Ok(text) = codec.encode(&frame) {
        let _ = conn.send(&text).await;
    }
    let _ = conn.close().await;
}

/// Drains the mailbox into the socket, then closes the socket.
///
/// The mailbox ends once the registry retires the connection.
async fn write_outbound(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::Receiver<String>,
    id: ConnectionId,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = conn.send(&message).await {
            tracing::debug!(connection_id = %id, error = %e, "send failed, writer stopping");
            break;
        }
    }
    let _ = conn.close().await;
}

/// Forwards every text frame from the client into the identity's inbound
/// queue until the client goes away.
async fn read_inbound(conn: &WebSocketConnection, inbound: &InboundSender, id: ConnectionId) {
    loop {
        match conn.recv().await {
            Ok(Some(text)) => {
                if let Err(e) = inbound.send(text).await {
                    tracing::debug!(connection_id = %id, error = %e, "inbound queue gone");
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!(connection_id = %id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "recv error");
                break;
            }
        }
    }
}
