//! Command interpreter: one inbound line → one action.
//!
//! Stateless between calls; everything it needs lives on the [`Session`].
//! Protocol errors never escape: they become a rejection line sent back to
//! the sender and nothing is mutated.

use relay_protocol::{Command, Rejection, Reply};
use tracing::{debug, info};

use super::Session;
use crate::registry::RegistryError;

/// Parses and executes one line on behalf of `session`.
pub async fn execute(session: &mut Session, line: &str) {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            debug!(session_id = %session.id(), error = %e, "Malformed command");
            session.send(Reply::from(Rejection::from(e)));
            return;
        }
    };

    debug!(session_id = %session.id(), command = command.kind(), "Executing command");

    match command {
        Command::Who => list_online(session).await,
        Command::Rename { new_name } => rename(session, new_name).await,
        Command::Direct { target, content } => direct(session, &target, &content).await,
        Command::Broadcast(text) => session.broadcast(&text),
    }
}

async fn list_online(session: &Session) {
    let requester = session.peer();
    session
        .context()
        .registry
        .for_each(|name, peer| {
            requester.deliver(Reply::online_entry(peer.addr(), name).to_string());
        })
        .await;
}

async fn rename(session: &mut Session, new_name: String) {
    let result = session
        .context()
        .registry
        .rename(session.name(), &new_name, session.peer())
        .await;

    match result {
        Ok(()) => {
            info!(
                session_id = %session.id(),
                old_name = %session.name(),
                new_name = %new_name,
                "Session renamed"
            );
            session.set_name(new_name.clone());
            session.send(Reply::Renamed { name: new_name });
        }
        Err(RegistryError::NameTaken { name }) => {
            debug!(session_id = %session.id(), name = %name, "Rename rejected, name taken");
            session.send(Reply::from(Rejection::NameTaken { name }));
        }
    }
}

async fn direct(session: &Session, target: &str, content: &str) {
    let Some(recipient) = session.context().registry.get(target).await else {
        session.send(Reply::from(Rejection::UserNotFound {
            name: target.to_string(),
        }));
        return;
    };

    if content.is_empty() {
        session.send(Reply::from(Rejection::EmptyMessage));
        return;
    }

    recipient.deliver(Reply::direct(session.name(), content).to_string());
}
