//! A minimal shared world: everyone spawns on one flat level, sees each
//! other move, can build, and can chat.

use crate::{
    connection::ConnectionId,
    dispatcher::{PacketHandler, SessionContext},
    entity_id::EntityId,
    level::{self, Level},
    position::{BlockId, EntityPosition, Orientation, PositionDelta},
    protocol::{
        capability::CUSTOM_BLOCKS,
        packet::{
            client::{ClientPacket, Identification, PositionAndOrientation, SetBlock},
            extension::CustomBlockSupportLevel,
            server::{
                self, DespawnPlayer, PositionAndOrientationUpdate, ServerPacket, SpawnPlayer,
                Teleport,
            },
        },
    },
    server::Clients,
};
use ahash::AHashMap;
use std::sync::{Mutex, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct Player {
    entity: EntityId,
    name: String,
    position: EntityPosition,
    orientation: Orientation,
    custom_blocks: bool,
}

impl Player {
    fn spawn_packet(&self, entity: EntityId) -> SpawnPlayer {
        SpawnPlayer {
            id: entity,
            name: self.name.clone(),
            position: self.position,
            orientation: self.orientation,
        }
    }
}

/// Custom block tier we offer and understand.
const CUSTOM_BLOCK_LEVEL: u8 = 1;

pub struct Lobby {
    level: RwLock<Level>,
    players: Mutex<AHashMap<ConnectionId, Player>>,
}

impl Lobby {
    pub fn new(level: Level) -> Self {
        Self {
            level: RwLock::new(level),
            players: Mutex::new(AHashMap::new()),
        }
    }

    fn free_entity_id(players: &AHashMap<ConnectionId, Player>) -> Option<EntityId> {
        (0..=i8::MAX)
            .map(EntityId::new)
            .find(|candidate| players.values().all(|player| player.entity != *candidate))
    }

    fn player(&self, id: ConnectionId) -> Option<Player> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn on_move(&self, ctx: &SessionContext<'_>, packet: PositionAndOrientation) {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(player) = players.get_mut(&ctx.id) else {
            return;
        };
        let update: ServerPacket = match PositionDelta::between(player.position, packet.position) {
            Some(delta) => PositionAndOrientationUpdate {
                id: player.entity,
                delta,
                orientation: packet.orientation,
            }
            .into(),
            None => Teleport {
                id: player.entity,
                position: packet.position,
                orientation: packet.orientation,
            }
            .into(),
        };
        player.position = packet.position;
        player.orientation = packet.orientation;
        ctx.clients.broadcast_except(ctx.id, update);
    }

    fn on_set_block(&self, ctx: &SessionContext<'_>, packet: SetBlock) {
        let block = if packet.is_destroy() {
            BlockId::AIR
        } else {
            packet.block
        };
        let custom_blocks = self.player(ctx.id).is_some_and(|player| player.custom_blocks);
        let allowed = if custom_blocks {
            BlockId::MAX_CUSTOM
        } else {
            BlockId::MAX_CLASSIC
        };
        let mut level = self.level.write().unwrap_or_else(PoisonError::into_inner);
        if block > allowed || !level.set(packet.position, block) {
            // the client already drew the change; put the real block back
            let real = level.get(packet.position);
            ctx.handle.send(server::SetBlock {
                position: packet.position,
                block: if custom_blocks { real } else { real.fallback() },
            });
            return;
        }
        drop(level);
        self.broadcast_block(ctx.clients, server::SetBlock {
            position: packet.position,
            block,
        });
    }

    /// Sends a block change to everyone, as each peer can display it.
    fn broadcast_block(&self, clients: &Clients, change: server::SetBlock) {
        let recipients: Vec<_> = self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(&id, player)| (id, player.custom_blocks))
            .collect();
        for (id, custom_blocks) in recipients {
            let Some(handle) = clients.get(id) else {
                continue;
            };
            let block = if custom_blocks {
                change.block
            } else {
                change.block.fallback()
            };
            handle.send(server::SetBlock { block, ..change });
        }
    }

    fn on_support_level(&self, ctx: &SessionContext<'_>, reply: CustomBlockSupportLevel) {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(player) = players.get_mut(&ctx.id) {
            player.custom_blocks = reply.level >= CUSTOM_BLOCK_LEVEL;
            tracing::debug!(id = %ctx.id, "Custom block support level {}", reply.level);
        }
    }
}

impl PacketHandler for Lobby {
    fn on_negotiated(&self, ctx: &SessionContext<'_>) -> anyhow::Result<()> {
        if ctx.capabilities.supports(CUSTOM_BLOCKS) {
            ctx.handle.send(CustomBlockSupportLevel {
                level: CUSTOM_BLOCK_LEVEL,
            });
        }
        Ok(())
    }

    fn on_login(
        &self,
        ctx: &SessionContext<'_>,
        identification: &Identification,
    ) -> anyhow::Result<()> {
        let custom_blocks = ctx.capabilities.supports(CUSTOM_BLOCKS);
        let spawn = {
            let level = self.level.read().unwrap_or_else(PoisonError::into_inner);
            level::send_level(ctx.handle, &level, custom_blocks)?;
            level.spawn_point().standing_on()
        };

        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entity) = Self::free_entity_id(&players) else {
            drop(players);
            ctx.handle.kick("The server is full");
            return Ok(());
        };
        let player = Player {
            entity,
            name: identification.username.clone(),
            position: spawn,
            orientation: Orientation::default(),
            custom_blocks,
        };

        ctx.handle.send(player.spawn_packet(EntityId::SELF));
        for other in players.values() {
            ctx.handle.send(other.spawn_packet(other.entity));
        }
        ctx.clients
            .broadcast_except(ctx.id, player.spawn_packet(player.entity));
        ctx.clients.broadcast(server::Message {
            sender: EntityId::SELF,
            text: format!("&e{} joined the game", player.name),
        });
        tracing::info!(id = %ctx.id, entity = entity.as_i8(), "{} joined", player.name);
        players.insert(ctx.id, player);
        Ok(())
    }

    fn on_packet(&self, ctx: &SessionContext<'_>, packet: ClientPacket) -> anyhow::Result<()> {
        match packet {
            ClientPacket::PositionAndOrientation(packet) => self.on_move(ctx, packet),
            ClientPacket::SetBlock(packet) => self.on_set_block(ctx, packet),
            ClientPacket::CustomBlockSupportLevel(reply) => self.on_support_level(ctx, reply),
            ClientPacket::Message(message) => {
                if let Some(player) = self.player(ctx.id) {
                    ctx.clients.broadcast(server::Message {
                        sender: player.entity,
                        text: format!("{}: {}", player.name, message.text),
                    });
                }
            }
            other => tracing::trace!(id = %ctx.id, "Ignoring {}", other.name()),
        }
        Ok(())
    }

    fn on_disconnect(&self, id: ConnectionId, _username: Option<&str>, clients: &Clients) {
        let removed = self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(player) = removed {
            clients.broadcast(DespawnPlayer { id: player.entity });
            clients.broadcast(server::Message {
                sender: EntityId::SELF,
                text: format!("&e{} left the game", player.name),
            });
            tracing::info!(%id, "{} left", player.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client_handle::ClientHandle, position::BlockPosition, protocol::capability::CapabilitySet,
    };
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    struct Peer {
        handle: ClientHandle,
        frames: flume::Receiver<Bytes>,
    }

    impl Peer {
        fn new(id: u32) -> Self {
            let (sender, frames) = flume::unbounded();
            Self {
                handle: ClientHandle::new(ConnectionId::new(id), sender, CancellationToken::new()),
                frames,
            }
        }

        fn opcodes(&self) -> Vec<u8> {
            self.frames.try_iter().map(|frame| frame[0]).collect()
        }

        fn login(&self, lobby: &Lobby, clients: &Clients, name: &str) {
            self.login_with(lobby, clients, name, CapabilitySet::new());
        }

        fn login_with(&self, lobby: &Lobby, clients: &Clients, name: &str, caps: CapabilitySet) {
            clients.insert(self.handle.clone());
            let ctx = SessionContext {
                id: self.handle.id(),
                username: name,
                capabilities: &caps,
                handle: &self.handle,
                clients,
            };
            let identification = Identification {
                protocol_version: 7,
                username: name.to_owned(),
                verification_key: String::new(),
                magic: 0,
            };
            lobby.on_negotiated(&ctx).unwrap();
            lobby.on_login(&ctx, &identification).unwrap();
        }

        fn send(&self, lobby: &Lobby, clients: &Clients, packet: impl Into<ClientPacket>) {
            let caps = CapabilitySet::new();
            let ctx = SessionContext {
                id: self.handle.id(),
                username: "",
                capabilities: &caps,
                handle: &self.handle,
                clients,
            };
            lobby.on_packet(&ctx, packet.into()).unwrap();
        }
    }

    #[test]
    fn players_see_each_other() {
        let lobby = Lobby::new(Level::flat(16, 16, 16));
        let clients = Clients::default();
        let alice = Peer::new(1);
        let bob = Peer::new(2);

        alice.login(&lobby, &clients, "alice");
        let opcodes = alice.opcodes();
        assert_eq!(opcodes.first(), Some(&0x02));
        // level, self spawn, join message
        assert_eq!(&opcodes[opcodes.len() - 2..], &[0x07, 0x0d]);

        bob.login(&lobby, &clients, "bob");
        let bob_opcodes = bob.opcodes();
        // self spawn, alice's spawn, join message
        assert_eq!(&bob_opcodes[bob_opcodes.len() - 3..], &[0x07, 0x07, 0x0d]);
        assert_eq!(alice.opcodes(), vec![0x07, 0x0d]);

        bob.send(
            &lobby,
            &clients,
            PositionAndOrientation {
                held_block: 0xFF,
                position: EntityPosition::new(3.0, 10.0, 3.0),
                orientation: Orientation::default(),
            },
        );
        assert_eq!(alice.opcodes(), vec![0x08]);
        assert!(bob.opcodes().is_empty());

        bob.send(
            &lobby,
            &clients,
            PositionAndOrientation {
                held_block: 0xFF,
                position: EntityPosition::new(3.5, 10.0, 3.0),
                orientation: Orientation::default(),
            },
        );
        assert_eq!(alice.opcodes(), vec![0x09]);

        lobby.on_disconnect(bob.handle.id(), Some("bob"), &clients);
        assert_eq!(alice.opcodes(), vec![0x0c, 0x0d]);
    }

    #[test]
    fn building_updates_the_level() {
        let lobby = Lobby::new(Level::flat(8, 8, 8));
        let clients = Clients::default();
        let steve = Peer::new(1);
        steve.login(&lobby, &clients, "steve");
        steve.opcodes();

        let position = BlockPosition::new(1, 6, 1);
        steve.send(
            &lobby,
            &clients,
            SetBlock {
                position,
                mode: 1,
                block: BlockId::STONE,
            },
        );
        assert_eq!(steve.opcodes(), vec![0x06]);
        assert_eq!(
            lobby.level.read().unwrap().get(position),
            BlockId::STONE
        );

        // outside the level: reverted for the sender only
        steve.send(
            &lobby,
            &clients,
            SetBlock {
                position: BlockPosition::new(100, 0, 0),
                mode: 1,
                block: BlockId::STONE,
            },
        );
        let frames: Vec<_> = steve.frames.try_iter().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x06, 0, 100, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn custom_blocks_fall_back_for_classic_peers() {
        let lobby = Lobby::new(Level::flat(8, 8, 8));
        let clients = Clients::default();
        let classic = Peer::new(1);
        let modern = Peer::new(2);
        classic.login(&lobby, &clients, "classic");
        let mut caps = CapabilitySet::new();
        caps.add(CUSTOM_BLOCKS, 1);
        modern.login_with(&lobby, &clients, "modern", caps);

        assert!(!classic.opcodes().contains(&0x13));
        assert_eq!(modern.opcodes()[0], 0x13);
        modern.send(&lobby, &clients, CustomBlockSupportLevel { level: 1 });

        modern.send(
            &lobby,
            &clients,
            SetBlock {
                position: BlockPosition::new(2, 6, 2),
                mode: 1,
                block: BlockId(52),
            },
        );
        let seen_by = |peer: &Peer| -> Vec<Vec<u8>> {
            peer.frames.try_iter().map(|frame| frame.to_vec()).collect()
        };
        assert_eq!(seen_by(&modern), vec![vec![0x06, 0, 2, 0, 6, 0, 2, 52]]);
        assert_eq!(seen_by(&classic), vec![vec![0x06, 0, 2, 0, 6, 0, 2, 12]]);

        // classic peers cannot place tier 1 blocks
        classic.send(
            &lobby,
            &clients,
            SetBlock {
                position: BlockPosition::new(3, 6, 3),
                mode: 1,
                block: BlockId(52),
            },
        );
        assert_eq!(seen_by(&classic), vec![vec![0x06, 0, 3, 0, 6, 0, 3, 0]]);
        assert!(seen_by(&modern).is_empty());
    }
}
