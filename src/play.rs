//! The per-row "play" action of the server table.
//!
//! A row's raw data is validated with [`parse_server`], the user is asked to
//! confirm, and the server is handed to whatever actually starts the game.
//! A rejected row only fails its own action.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::server::{parse_server, Server};

/// Asks the user whether to join a server.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, server: &Server) -> bool;
}

/// Starts the game connected to a server.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, server: &Server) -> Result<()>;
}

/// Result of a play action that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Launched(Server),
    Cancelled,
}

/// Run the play action for one table row.
pub async fn play_row(
    raw: &serde_json::Value,
    confirm: &dyn Confirm,
    launcher: &dyn Launcher,
) -> Result<PlayOutcome> {
    let server = parse_server(raw).map_err(|err| {
        warn!(error = %err, "rejected server row");
        err
    })?;

    if !confirm.confirm(&server).await {
        info!(steamid = %server.steamid, "play cancelled");
        return Ok(PlayOutcome::Cancelled);
    }

    launcher.launch(&server).await?;
    info!(
        steamid = %server.steamid,
        target = %server.connect_address(),
        "launched game"
    );
    Ok(PlayOutcome::Launched(server))
}
