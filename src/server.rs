//! Server records and the duplicate-free server list.
//!
//! A [`Server`] is identified by its [`SteamId`]; a [`ServerList`] keeps
//! records in display order and never holds the same steamid twice. Untyped
//! rows coming from the UI go through [`parse_server`] before any action
//! reads them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::StateError;

/// Opaque, stable identifier of a game server.
///
/// Stored as a string. Numeric ids are accepted on input and normalised to
/// their decimal form, so `76561198000000000` and `"76561198000000000"`
/// name the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SteamId(String);

impl SteamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<'de> Deserialize<'de> for SteamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => SteamId(text),
            Raw::Number(number) => SteamId(number.to_string()),
        })
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SteamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SteamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for SteamId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A known game server as shown in the server browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub steamid: SteamId,
    pub address: String,
    pub port: u16,
    pub name: String,
    pub map: String,
    pub players: u32,
    pub ping: u32,
    /// Client-side favorite marker, never reported by the server itself.
    #[serde(default)]
    pub favorite: bool,
}

impl Server {
    /// `address:port`, the form launchers expect for a connect target.
    pub fn connect_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Check the fields the play action relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steamid.is_empty() {
            return Err(ValidationError::EmptySteamId);
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        if self.address.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidAddress(self.address.clone()));
        }
        if self.port == 0 {
            return Err(ValidationError::ZeroPort);
        }
        Ok(())
    }
}

/// Reasons a UI row is rejected before an action uses it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed server record: {0}")]
    Malformed(String),

    #[error("steamid is empty")]
    EmptySteamId,

    #[error("address is empty")]
    EmptyAddress,

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("port must be non-zero")]
    ZeroPort,
}

/// Parse an untyped row into a validated [`Server`].
///
/// Every UI entry point that acts on a row goes through this function.
pub fn parse_server(raw: &serde_json::Value) -> Result<Server, ValidationError> {
    let server =
        Server::deserialize(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    server.validate()?;
    Ok(server)
}

/// Ordered list of servers, unique by steamid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Server>", into = "Vec<Server>")]
pub struct ServerList {
    servers: Vec<Server>,
}

impl ServerList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Server> {
        self.servers.iter()
    }

    pub fn as_slice(&self) -> &[Server] {
        &self.servers
    }

    /// Index of the server with this steamid.
    pub fn position(&self, steamid: &SteamId) -> Option<usize> {
        self.servers.iter().position(|s| &s.steamid == steamid)
    }

    pub fn get(&self, steamid: &SteamId) -> Option<&Server> {
        self.servers.iter().find(|s| &s.steamid == steamid)
    }

    pub(crate) fn get_mut(&mut self, steamid: &SteamId) -> Option<&mut Server> {
        self.servers.iter_mut().find(|s| &s.steamid == steamid)
    }

    /// Replace the record with the same steamid in place.
    ///
    /// Returns `false` and leaves the list untouched when no record matches.
    pub fn replace(&mut self, server: Server) -> bool {
        match self.position(&server.steamid) {
            Some(index) => {
                self.servers[index] = server;
                true
            }
            None => false,
        }
    }

    /// Replace the record with the same steamid in place, or append it.
    ///
    /// Returns `true` when the server was appended.
    pub fn upsert(&mut self, server: Server) -> bool {
        match self.position(&server.steamid) {
            Some(index) => {
                self.servers[index] = server;
                false
            }
            None => {
                self.servers.push(server);
                true
            }
        }
    }

    /// Append a server whose steamid is not yet in the list.
    pub fn push(&mut self, server: Server) -> Result<(), StateError> {
        if self.position(&server.steamid).is_some() {
            return Err(StateError::DuplicateSteamId(server.steamid));
        }
        self.servers.push(server);
        Ok(())
    }

    /// Remove and return the server with this steamid.
    pub fn remove(&mut self, steamid: &SteamId) -> Option<Server> {
        let index = self.position(steamid)?;
        Some(self.servers.remove(index))
    }

    /// Servers the user marked as favorite, in list order.
    pub fn favorites(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| s.favorite)
    }
}

impl TryFrom<Vec<Server>> for ServerList {
    type Error = StateError;

    fn try_from(servers: Vec<Server>) -> Result<Self, Self::Error> {
        let mut list = ServerList::new();
        for server in servers {
            list.push(server)?;
        }
        Ok(list)
    }
}

impl From<ServerList> for Vec<Server> {
    fn from(list: ServerList) -> Self {
        list.servers
    }
}

impl<'a> IntoIterator for &'a ServerList {
    type Item = &'a Server;
    type IntoIter = std::slice::Iter<'a, Server>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.iter()
    }
}

#[cfg(test)]
pub(crate) fn test_server(steamid: &str, name: &str) -> Server {
    Server {
        steamid: SteamId::from(steamid),
        address: "192.168.1.20".to_string(),
        port: 2302,
        name: name.to_string(),
        map: "chernarusplus".to_string(),
        players: 12,
        ping: 38,
        favorite: false,
    }
}
