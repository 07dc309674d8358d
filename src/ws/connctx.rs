use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Identity, ServerEvent};

pub type ConnId = Uuid;

/// Handle to one live connection: who it is and where its outbound events go.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub conn_id: ConnId,
    pub identity: Identity,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnCtx {
    pub fn new(identity: Identity, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            identity,
            tx,
        }
    }

    /// Queue an event for the connection's writer. Returns false once the
    /// writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
