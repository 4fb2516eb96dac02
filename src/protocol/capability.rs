//! Capability (protocol extension) bookkeeping and the negotiation
//! state machine.
//!
//! A client that sets the extension magic byte in its identification sends
//! one `ExtInfo` announcing how many extensions it supports, followed by
//! exactly that many `ExtEntry` packets. The set of extensions both sides
//! support is then frozen for the rest of the connection.

use std::fmt;

pub const EXT_ENTITY_POSITIONS: &str = "ExtEntityPositions";
pub const EXTENDED_BLOCKS: &str = "ExtendedBlocks";
pub const FULL_CP437: &str = "FullCP437";
pub const FAST_MAP: &str = "FastMap";
pub const TWO_WAY_PING: &str = "TwoWayPing";
pub const PLAYER_CLICK: &str = "PlayerClick";
pub const CUSTOM_BLOCKS: &str = "CustomBlocks";

/// A negotiated extension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Capability {
    pub name: String,
    pub version: i32,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Set of extensions in effect on one connection. Unique by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns whether `name` was negotiated at exactly `version`.
    pub fn supports_version(&self, name: &str, version: i32) -> bool {
        self.get(name).is_some_and(|cap| cap.version == version)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|cap| cap.name == name)
    }

    /// Adds an extension. Returns `false` if one with the same name
    /// was already present; the first entry is kept.
    pub fn add(&mut self, name: impl Into<String>, version: i32) -> bool {
        let name = name.into();
        if self.supports(&name) {
            return false;
        }
        self.entries.push(Capability { name, version });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = Self::new();
        for cap in iter {
            set.add(cap.name, cap.version);
        }
        set
    }
}

/// A failure of the extension handshake. Always fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Client has {declared} extensions, server requires at least {required}")]
    TooFewExtensions { required: usize, declared: usize },
    #[error("Received an extension entry before the extension list was announced")]
    EntryBeforeAnnounce,
    #[error("Received an extension entry after negotiation had finished")]
    EntryAfterFinalize,
    #[error("Extension list was announced twice")]
    DuplicateAnnounce,
    #[error("Expected an identification packet, got {0}")]
    NotIdentified(&'static str),
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("Unexpected {0} packet during extension negotiation")]
    UnexpectedPacket(&'static str),
    #[error("Client identified twice")]
    DuplicateIdentification,
}

/// Result of feeding an `ExtEntry` to the negotiator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    /// More entries are expected.
    Pending { remaining: usize },
    /// The last entry arrived; the capability set is now frozen.
    Finalized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum NegotiationState {
    Unnegotiated,
    AwaitingEntries {
        app_name: String,
        declared: usize,
        received: usize,
    },
    Finalized {
        app_name: String,
    },
}

/// Drives one connection's extension handshake.
pub struct Negotiator {
    state: NegotiationState,
    offered: CapabilitySet,
    required: usize,
    negotiated: CapabilitySet,
}

impl Negotiator {
    /// `offered` is the set of extensions this server implements; entries
    /// for anything else are counted but not added.
    pub fn new(offered: CapabilitySet, required: usize) -> Self {
        Self {
            state: NegotiationState::Unnegotiated,
            offered,
            required,
            negotiated: CapabilitySet::new(),
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.negotiated
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, NegotiationState::Finalized { .. })
    }

    /// The application name the peer announced, if any.
    pub fn app_name(&self) -> Option<&str> {
        match &self.state {
            NegotiationState::Unnegotiated => None,
            NegotiationState::AwaitingEntries { app_name, .. }
            | NegotiationState::Finalized { app_name } => Some(app_name),
        }
    }

    /// Handles the peer's `ExtInfo`.
    pub fn announce(&mut self, app_name: &str, count: usize) -> Result<Progress, HandshakeError> {
        if self.state != NegotiationState::Unnegotiated {
            return Err(HandshakeError::DuplicateAnnounce);
        }
        if count < self.required {
            return Err(HandshakeError::TooFewExtensions {
                required: self.required,
                declared: count,
            });
        }

        tracing::debug!("Peer {app_name} announced {count} extensions");
        if count == 0 {
            self.state = NegotiationState::Finalized {
                app_name: app_name.to_owned(),
            };
            return Ok(Progress::Finalized);
        }
        self.state = NegotiationState::AwaitingEntries {
            app_name: app_name.to_owned(),
            declared: count,
            received: 0,
        };
        Ok(Progress::Pending { remaining: count })
    }

    /// Handles one `ExtEntry`.
    pub fn entry(&mut self, name: &str, version: i32) -> Result<Progress, HandshakeError> {
        let NegotiationState::AwaitingEntries {
            app_name,
            declared,
            received,
        } = &mut self.state
        else {
            return Err(match self.state {
                NegotiationState::Unnegotiated => HandshakeError::EntryBeforeAnnounce,
                _ => HandshakeError::EntryAfterFinalize,
            });
        };

        *received += 1;
        if self.offered.supports(name) {
            if !self.negotiated.add(name, version) {
                tracing::debug!("Ignoring repeated extension entry {name}");
            }
        } else {
            tracing::trace!("Peer offered unknown extension {name} v{version}");
        }

        if *received < *declared {
            return Ok(Progress::Pending {
                remaining: *declared - *received,
            });
        }

        let app_name = std::mem::take(app_name);
        self.state = NegotiationState::Finalized { app_name };
        Ok(Progress::Finalized)
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("state", &self.state)
            .field("negotiated", &self.negotiated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered() -> CapabilitySet {
        [
            Capability::new(EXT_ENTITY_POSITIONS, 1),
            Capability::new(FULL_CP437, 1),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn capability_set_is_unique_by_name() {
        let mut set = CapabilitySet::new();
        assert!(set.add(FULL_CP437, 1));
        assert!(!set.add(FULL_CP437, 2));
        assert_eq!(set.len(), 1);
        assert!(set.supports(FULL_CP437));
        assert!(set.supports_version(FULL_CP437, 1));
        assert!(!set.supports_version(FULL_CP437, 2));
        assert!(!set.supports(FAST_MAP));
    }

    #[test]
    fn finalizes_exactly_once_after_declared_entries() {
        let mut negotiator = Negotiator::new(offered(), 0);
        assert_eq!(
            negotiator.announce("TestClient", 3).unwrap(),
            Progress::Pending { remaining: 3 }
        );
        assert_eq!(
            negotiator.entry(EXT_ENTITY_POSITIONS, 1).unwrap(),
            Progress::Pending { remaining: 2 }
        );
        assert_eq!(
            negotiator.entry("EnvColors", 1).unwrap(),
            Progress::Pending { remaining: 1 }
        );
        assert!(!negotiator.is_finalized());
        assert_eq!(negotiator.entry(FULL_CP437, 1).unwrap(), Progress::Finalized);
        assert!(negotiator.is_finalized());
        assert_eq!(negotiator.app_name(), Some("TestClient"));

        assert!(matches!(
            negotiator.entry(FAST_MAP, 1),
            Err(HandshakeError::EntryAfterFinalize)
        ));
        // unknown extensions are counted but never negotiated
        assert_eq!(negotiator.capabilities().len(), 2);
        assert!(!negotiator.capabilities().supports("EnvColors"));
    }

    #[test]
    fn zero_entries_finalizes_on_announce() {
        let mut negotiator = Negotiator::new(offered(), 0);
        assert_eq!(negotiator.announce("Bare", 0).unwrap(), Progress::Finalized);
        assert!(negotiator.capabilities().is_empty());
    }

    #[test]
    fn too_few_extensions_is_rejected_with_reason() {
        let mut negotiator = Negotiator::new(offered(), 5);
        let err = negotiator.announce("Old", 2).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::TooFewExtensions {
                required: 5,
                declared: 2
            }
        ));
        assert!(err.to_string().contains("at least 5"));
    }

    #[test]
    fn out_of_order_messages_are_errors() {
        let mut negotiator = Negotiator::new(offered(), 0);
        assert!(matches!(
            negotiator.entry(FULL_CP437, 1),
            Err(HandshakeError::EntryBeforeAnnounce)
        ));
        negotiator.announce("Client", 1).unwrap();
        assert!(matches!(
            negotiator.announce("Client", 1),
            Err(HandshakeError::DuplicateAnnounce)
        ));
    }
}
