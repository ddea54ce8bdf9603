//! ComplyClient: bearbeitet genau eine Unicast-Anfrage
//!
//! Die erste Nachricht entscheidet zwischen Join- und Leave-Handshake.
//! Ein Join wird erst nach dem "end" des Clients in den Baum uebernommen,
//! bricht der Client vorher ab, verfaellt nur die vergebene ID.

use std::sync::Arc;

use tracing::{debug, info, warn};

use lkhcast_protocol::{HandshakeToken, JoinReply, LeaveRequest};
use lkhcast_transport::{HandshakeRole, UnicastChannel};

use crate::controller::GroupController;
use crate::error::{ServerError, ServerResult};

pub struct ComplyClient<U> {
    unicast: U,
    controller: Arc<GroupController>,
    peer: String,
}

impl<U: UnicastChannel> ComplyClient<U> {
    pub fn new(unicast: U, controller: Arc<GroupController>, peer: impl Into<String>) -> Self {
        Self {
            unicast,
            controller,
            peer: peer.into(),
        }
    }

    pub async fn bearbeiten(mut self) -> ServerResult<()> {
        let anfrage = self.unicast.read().await?;
        let ergebnis = match HandshakeToken::from_bytes(&anfrage) {
            Some(HandshakeToken::Joining) => self.join().await,
            Some(HandshakeToken::Leaving) => self.leave().await,
            _ => Err(ServerError::UnerwarteteAnfrage(anfrage.len())),
        };
        if let Err(e) = self.unicast.close().await {
            debug!(peer = %self.peer, fehler = %e, "Unicast nicht sauber geschlossen");
        }
        ergebnis
    }

    async fn join(&mut self) -> ServerResult<()> {
        let session = self
            .unicast
            .gen_dh_session_key(HandshakeRole::Server, self.controller.suite())
            .await?;
        let (member, kek) = self.controller.register_join().await?;

        let reply = JoinReply {
            version: self.controller.version(),
            member,
            kek: kek.to_bytes(&session)?,
        };
        self.unicast.write(&reply.encode()).await?;

        let ende = self.unicast.read().await?;
        if let Err(e) = HandshakeToken::End.erwarten(&ende) {
            warn!(peer = %self.peer, member_id = %member, "Join ohne Abschluss verworfen");
            return Err(ServerError::Handshake(e.to_string()));
        }

        self.controller.member_joining(member, kek).await?;
        info!(peer = %self.peer, member_id = %member, "Mitglied beigetreten");
        Ok(())
    }

    async fn leave(&mut self) -> ServerResult<()> {
        self.unicast
            .write(HandshakeToken::IdAnfrage.as_bytes())
            .await?;
        let anfrage = LeaveRequest::decode(&self.unicast.read().await?)?;

        let bekannt = self.controller.member_leaving(anfrage.member).await?;
        let antwort = if bekannt {
            info!(peer = %self.peer, member_id = %anfrage.member, "Mitglied ausgetreten");
            HandshakeToken::Left
        } else {
            warn!(peer = %self.peer, member_id = %anfrage.member, "Leave fuer unbekanntes Mitglied");
            HandshakeToken::Unknown
        };
        self.unicast.write(antwort.as_bytes()).await?;
        Ok(())
    }
}
