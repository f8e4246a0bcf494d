use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    nbt,
    packet::{
        common::{KeepAlive, PluginMessage},
        decode_id, encode_id, Component, PacketSet, RawPacket,
    },
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    KeepAlive(KeepAlive),
    JoinGame(JoinGame),
    Respawn(Respawn),
    Disconnect(Disconnect),
    PluginMessage(PluginMessage),
    StartConfiguration,
    Opaque(RawPacket),
}

#[derive(Debug, Clone)]
pub struct Disconnect {
    pub reason: Component,
}

/// How the dimension is spelled on the wire; it changed four times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    /// Numeric id, pre-1.16 (-1 nether, 0 overworld, 1 end).
    Legacy(i32),
    /// Identifier string: 1.16–1.16.1 dimension ids, 1.19–1.20.4
    /// dimension-type keys.
    Named(String),
    /// Inline dimension-type compound, 1.16.2–1.18.2.
    Nbt(Vec<u8>),
    /// Registry index, 1.20.5+.
    Ided(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathLocation {
    pub dimension: String,
    pub position: i64,
}

/// The login packet of the Play state.
///
/// Decoded far enough to drive server switches (dimension bookkeeping and
/// the respawn sequence); everything past the last interpreted field is an
/// opaque tail echoed on re-encode, so unmodeled trailing fields of newer
/// revisions survive round trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub is_hardcore: bool,
    pub gamemode: u8,
    pub previous_gamemode: i8,
    /// 1.16+.
    pub world_names: Vec<String>,
    /// Raw registry NBT, 1.16–1.20.1 (moved to the configuration state
    /// afterwards).
    pub registry_data: Vec<u8>,
    pub dimension: Dimension,
    /// 1.16+.
    pub world_name: Option<String>,
    /// 1.15+.
    pub hashed_seed: i64,
    /// Pre-1.14.
    pub difficulty: u8,
    pub max_players: i32,
    /// Pre-1.16.
    pub level_type: Option<String>,
    /// 1.14+.
    pub view_distance: i32,
    /// 1.18+.
    pub simulation_distance: i32,
    /// 1.8+.
    pub reduced_debug_info: bool,
    /// 1.15+.
    pub enable_respawn_screen: bool,
    /// 1.20.2+.
    pub limited_crafting: bool,
    /// 1.16+.
    pub is_debug: bool,
    /// 1.16+.
    pub is_flat: bool,
    /// 1.19+.
    pub death_location: Option<DeathLocation>,
    /// 1.20+.
    pub portal_cooldown: i32,
    pub tail: Vec<u8>,
}

impl Default for JoinGame {
    fn default() -> Self {
        JoinGame {
            entity_id: 0,
            is_hardcore: false,
            gamemode: 0,
            previous_gamemode: -1,
            world_names: Vec::new(),
            registry_data: Vec::new(),
            dimension: Dimension::Legacy(0),
            world_name: None,
            hashed_seed: 0,
            difficulty: 0,
            max_players: 0,
            level_type: None,
            view_distance: 0,
            simulation_distance: 0,
            reduced_debug_info: false,
            enable_respawn_screen: true,
            limited_crafting: false,
            is_debug: false,
            is_flat: false,
            death_location: None,
            portal_cooldown: 0,
            tail: Vec::new(),
        }
    }
}

fn read_death_location(decoder: &mut Decoder) -> decoder::Result<Option<DeathLocation>> {
    if decoder.read_bool()? {
        Ok(Some(DeathLocation {
            dimension: decoder.read_string()?.to_owned(),
            position: decoder.read_i64()?,
        }))
    } else {
        Ok(None)
    }
}

fn write_death_location(encoder: &mut Encoder, death: &Option<DeathLocation>) {
    match death {
        Some(location) => {
            encoder.write_bool(true);
            encoder.write_string(&location.dimension);
            encoder.write_i64(location.position);
        }
        None => encoder.write_bool(false),
    }
}

impl JoinGame {
    fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        use ProtocolVersion as V;
        let mut join = JoinGame::default();

        join.entity_id = decoder.read_i32()?;

        if version >= V::V1_20_2 {
            // 1.20.2 restructure: registry data has moved to the
            // configuration state and the field order changed wholesale.
            join.is_hardcore = decoder.read_bool()?;
            let world_count = decoder.read_var_int()?;
            for _ in 0..world_count {
                join.world_names.push(decoder.read_string()?.to_owned());
            }
            join.max_players = decoder.read_var_int()?;
            join.view_distance = decoder.read_var_int()?;
            join.simulation_distance = decoder.read_var_int()?;
            join.reduced_debug_info = decoder.read_bool()?;
            join.enable_respawn_screen = decoder.read_bool()?;
            join.limited_crafting = decoder.read_bool()?;
            join.dimension = if version >= V::V1_20_5 {
                Dimension::Ided(decoder.read_var_int()?)
            } else {
                Dimension::Named(decoder.read_string()?.to_owned())
            };
            join.world_name = Some(decoder.read_string()?.to_owned());
            join.hashed_seed = decoder.read_i64()?;
            join.gamemode = decoder.read_u8()?;
            join.previous_gamemode = decoder.read_i8()?;
            join.is_debug = decoder.read_bool()?;
            join.is_flat = decoder.read_bool()?;
            join.death_location = read_death_location(decoder)?;
            join.portal_cooldown = decoder.read_var_int()?;
        } else if version >= V::V1_16 {
            if version >= V::V1_16_2 {
                join.is_hardcore = decoder.read_bool()?;
            }
            join.gamemode = decoder.read_u8()?;
            join.previous_gamemode = decoder.read_i8()?;
            let world_count = decoder.read_var_int()?;
            for _ in 0..world_count {
                join.world_names.push(decoder.read_string()?.to_owned());
            }
            join.registry_data = nbt::read_raw(decoder, version)?.to_vec();
            join.dimension = if version >= V::V1_16_2 && version < V::V1_19 {
                Dimension::Nbt(nbt::read_raw(decoder, version)?.to_vec())
            } else {
                Dimension::Named(decoder.read_string()?.to_owned())
            };
            join.world_name = Some(decoder.read_string()?.to_owned());
            join.hashed_seed = decoder.read_i64()?;
            join.max_players = if version >= V::V1_16_2 {
                decoder.read_var_int()?
            } else {
                i32::from(decoder.read_u8()?)
            };
            join.view_distance = decoder.read_var_int()?;
            if version >= V::V1_18 {
                join.simulation_distance = decoder.read_var_int()?;
            }
            join.reduced_debug_info = decoder.read_bool()?;
            join.enable_respawn_screen = decoder.read_bool()?;
            join.is_debug = decoder.read_bool()?;
            join.is_flat = decoder.read_bool()?;
            if version >= V::V1_19 {
                join.death_location = read_death_location(decoder)?;
            }
            if version >= V::V1_20 {
                join.portal_cooldown = decoder.read_var_int()?;
            }
        } else {
            join.gamemode = decoder.read_u8()?;
            join.dimension = if version >= V::V1_9_1 {
                Dimension::Legacy(decoder.read_i32()?)
            } else {
                Dimension::Legacy(i32::from(decoder.read_i8()?))
            };
            if version >= V::V1_15 {
                join.hashed_seed = decoder.read_i64()?;
            }
            if version < V::V1_14 {
                join.difficulty = decoder.read_u8()?;
            }
            join.max_players = i32::from(decoder.read_u8()?);
            join.level_type = Some(decoder.read_string_capped(16)?.to_owned());
            if version >= V::V1_14 {
                join.view_distance = decoder.read_var_int()?;
            }
            if version >= V::V1_8 {
                join.reduced_debug_info = decoder.read_bool()?;
            }
            if version >= V::V1_15 {
                join.enable_respawn_screen = decoder.read_bool()?;
            }
        }

        join.tail = decoder.consume_remaining().to_vec();
        Ok(join)
    }

    fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        use ProtocolVersion as V;

        encoder.write_i32(self.entity_id);

        if version >= V::V1_20_2 {
            encoder.write_bool(self.is_hardcore);
            encoder.write_var_int(self.world_names.len() as i32);
            for name in &self.world_names {
                encoder.write_string(name);
            }
            encoder.write_var_int(self.max_players);
            encoder.write_var_int(self.view_distance);
            encoder.write_var_int(self.simulation_distance);
            encoder.write_bool(self.reduced_debug_info);
            encoder.write_bool(self.enable_respawn_screen);
            encoder.write_bool(self.limited_crafting);
            match &self.dimension {
                Dimension::Ided(id) => {
                    encoder.write_var_int(*id);
                }
                Dimension::Named(name) => encoder.write_string(name),
                other => unreachable!("dimension form {other:?} impossible at {version}"),
            }
            encoder.write_string(self.world_name.as_deref().unwrap_or("minecraft:overworld"));
            encoder.write_i64(self.hashed_seed);
            encoder.write_u8(self.gamemode);
            encoder.write_i8(self.previous_gamemode);
            encoder.write_bool(self.is_debug);
            encoder.write_bool(self.is_flat);
            write_death_location(encoder, &self.death_location);
            encoder.write_var_int(self.portal_cooldown);
        } else if version >= V::V1_16 {
            if version >= V::V1_16_2 {
                encoder.write_bool(self.is_hardcore);
            }
            encoder.write_u8(self.gamemode);
            encoder.write_i8(self.previous_gamemode);
            encoder.write_var_int(self.world_names.len() as i32);
            for name in &self.world_names {
                encoder.write_string(name);
            }
            encoder.write_slice(&self.registry_data);
            match &self.dimension {
                Dimension::Nbt(raw) => encoder.write_slice(raw),
                Dimension::Named(name) => encoder.write_string(name),
                other => unreachable!("dimension form {other:?} impossible at {version}"),
            }
            encoder.write_string(self.world_name.as_deref().unwrap_or("minecraft:overworld"));
            encoder.write_i64(self.hashed_seed);
            if version >= V::V1_16_2 {
                encoder.write_var_int(self.max_players);
            } else {
                encoder.write_u8(self.max_players as u8);
            }
            encoder.write_var_int(self.view_distance);
            if version >= V::V1_18 {
                encoder.write_var_int(self.simulation_distance);
            }
            encoder.write_bool(self.reduced_debug_info);
            encoder.write_bool(self.enable_respawn_screen);
            encoder.write_bool(self.is_debug);
            encoder.write_bool(self.is_flat);
            if version >= V::V1_19 {
                write_death_location(encoder, &self.death_location);
            }
            if version >= V::V1_20 {
                encoder.write_var_int(self.portal_cooldown);
            }
        } else {
            let Dimension::Legacy(dimension) = self.dimension else {
                unreachable!("pre-1.16 join must carry a legacy dimension")
            };
            encoder.write_u8(self.gamemode);
            if version >= V::V1_9_1 {
                encoder.write_i32(dimension);
            } else {
                encoder.write_i8(dimension as i8);
            }
            if version >= V::V1_15 {
                encoder.write_i64(self.hashed_seed);
            }
            if version < V::V1_14 {
                encoder.write_u8(self.difficulty);
            }
            encoder.write_u8(self.max_players as u8);
            encoder.write_string(self.level_type.as_deref().unwrap_or("default"));
            if version >= V::V1_14 {
                encoder.write_var_int(self.view_distance);
            }
            if version >= V::V1_8 {
                encoder.write_bool(self.reduced_debug_info);
            }
            if version >= V::V1_15 {
                encoder.write_bool(self.enable_respawn_screen);
            }
        }

        encoder.write_slice(&self.tail);
    }

    /// The dimension-flip target used to force a full client reload when
    /// respawning into the same logical dimension.
    pub fn flipped_dimension(&self) -> Dimension {
        match &self.dimension {
            Dimension::Legacy(id) => Dimension::Legacy(if *id == 0 { -1 } else { 0 }),
            other => other.clone(),
        }
    }

    /// A world name differing from the current one, for the 1.16+ flip.
    pub fn flipped_world_name(&self) -> String {
        match self.world_name.as_deref() {
            Some("minecraft:overworld") | None => "minecraft:the_nether".to_owned(),
            Some(_) => "minecraft:overworld".to_owned(),
        }
    }
}

/// Respawn is only ever decoded as an opaque capture (forwarded traffic)
/// and encoded from a body the switch logic synthesizes out of the new
/// backend's JoinGame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Respawn {
    pub body: Vec<u8>,
}

impl Respawn {
    /// Builds the respawn matching `join`'s world. With `flip`, targets
    /// the throwaway counterpart world/dimension instead, forcing the
    /// client to drop its chunk and entity state.
    pub fn from_join_game(join: &JoinGame, version: ProtocolVersion, flip: bool) -> Respawn {
        use ProtocolVersion as V;
        debug_assert!(
            version < V::V1_20_2,
            "1.20.2+ switches re-enter the configuration state instead"
        );

        let mut body = Vec::new();
        let encoder = &mut Encoder::new(&mut body);

        if version >= V::V1_16 {
            let world_name = if flip {
                join.flipped_world_name()
            } else {
                join
                    .world_name
                    .clone()
                    .unwrap_or_else(|| "minecraft:overworld".to_owned())
            };
            match &join.dimension {
                Dimension::Nbt(raw) => encoder.write_slice(raw),
                Dimension::Named(name) => encoder.write_string(name),
                Dimension::Legacy(_) | Dimension::Ided(_) => {
                    unreachable!("1.16..1.20.2 join carries a named or NBT dimension")
                }
            }
            encoder.write_string(&world_name);
            encoder.write_i64(join.hashed_seed);
            encoder.write_u8(join.gamemode);
            encoder.write_i8(join.previous_gamemode);
            encoder.write_bool(join.is_debug);
            encoder.write_bool(join.is_flat);
            if version >= V::V1_19_3 {
                // data kept: wipe everything on a cross-server respawn
                encoder.write_i8(0);
            } else {
                // copy metadata
                encoder.write_bool(false);
            }
            if version >= V::V1_19 {
                write_death_location(encoder, &join.death_location);
            }
            if version >= V::V1_20 {
                encoder.write_var_int(join.portal_cooldown);
            }
        } else {
            let dimension = if flip {
                join.flipped_dimension()
            } else {
                join.dimension.clone()
            };
            let Dimension::Legacy(dimension) = dimension else {
                unreachable!("pre-1.16 join carries a legacy dimension")
            };
            encoder.write_i32(dimension);
            if version >= V::V1_15 {
                encoder.write_i64(join.hashed_seed);
            }
            if version < V::V1_14 {
                encoder.write_u8(join.difficulty);
            }
            encoder.write_u8(join.gamemode);
            encoder.write_string(join.level_type.as_deref().unwrap_or("default"));
        }

        Respawn { body }
    }
}

impl PacketSet for Packet {
    const STATE: State = State::Play;
    const DIRECTION: Direction = Direction::ClientBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::KeepAlive) => {
                Ok(Packet::KeepAlive(KeepAlive::decode_body(decoder, version)?))
            }
            Some(PacketKind::JoinGame) => Ok(Packet::JoinGame(JoinGame::decode_body(
                decoder, version,
            )?)),
            Some(PacketKind::Respawn) => Ok(Packet::Respawn(Respawn {
                body: decoder.consume_remaining().to_vec(),
            })),
            Some(PacketKind::Disconnect) => Ok(Packet::Disconnect(Disconnect {
                reason: Component::decode_chat(decoder, version)?,
            })),
            Some(PacketKind::PluginMessage) => Ok(Packet::PluginMessage(
                PluginMessage::decode_body(decoder, version)?,
            )),
            Some(PacketKind::StartConfiguration) => Ok(Packet::StartConfiguration),
            _ => Ok(Packet::Opaque(RawPacket {
                id,
                body: decoder.consume_remaining().to_vec(),
            })),
        }
    }

    fn encode(
        &self,
        encoder: &mut Encoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> anyhow::Result<()> {
        match self {
            Packet::KeepAlive(keep_alive) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::KeepAlive,
                )?;
                keep_alive.encode_body(encoder, version);
            }
            Packet::JoinGame(join) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::JoinGame,
                )?;
                join.encode_body(encoder, version);
            }
            Packet::Respawn(respawn) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::Respawn,
                )?;
                encoder.write_slice(&respawn.body);
            }
            Packet::Disconnect(disconnect) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::Disconnect,
                )?;
                disconnect.reason.encode_chat(encoder, version);
            }
            Packet::PluginMessage(message) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::PluginMessage,
                )?;
                message.encode_body(encoder, version);
            }
            Packet::StartConfiguration => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::StartConfiguration,
                )?;
            }
            Packet::Opaque(raw) => {
                encoder.write_var_int(raw.id);
                encoder.write_slice(&raw.body);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_join(join: JoinGame, version: ProtocolVersion) -> JoinGame {
        let registry = PacketRegistry::build().unwrap();
        let mut buf = Vec::new();
        Packet::JoinGame(join)
            .encode(&mut Encoder::new(&mut buf), version, &registry)
            .unwrap();
        let mut decoder = Decoder::new(&buf);
        match Packet::decode(&mut decoder, version, &registry).unwrap() {
            Packet::JoinGame(decoded) => {
                assert!(decoder.is_finished());
                decoded
            }
            other => panic!("wrong packet {other:?}"),
        }
    }

    fn legacy_join() -> JoinGame {
        JoinGame {
            entity_id: 99,
            gamemode: 1,
            dimension: Dimension::Legacy(0),
            difficulty: 2,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }
    }

    #[test]
    fn join_game_legacy_eras() {
        for version in [
            ProtocolVersion::V1_7_2,
            ProtocolVersion::V1_8,
            ProtocolVersion::V1_9,
            ProtocolVersion::V1_12_2,
        ] {
            let decoded = round_trip_join(legacy_join(), version);
            assert_eq!(decoded.dimension, Dimension::Legacy(0));
            assert_eq!(decoded.gamemode, 1);
            assert_eq!(decoded.level_type.as_deref(), Some("default"));
        }
    }

    #[test]
    fn join_game_1_15_carries_seed_and_respawn_screen() {
        let join = JoinGame {
            hashed_seed: 0x5EED,
            view_distance: 10,
            enable_respawn_screen: false,
            ..legacy_join()
        };
        let decoded = round_trip_join(join, ProtocolVersion::V1_15);
        assert_eq!(decoded.hashed_seed, 0x5EED);
        assert!(!decoded.enable_respawn_screen);
    }

    fn modern_named_join() -> JoinGame {
        JoinGame {
            entity_id: 7,
            gamemode: 0,
            previous_gamemode: -1,
            world_names: vec!["minecraft:overworld".to_owned()],
            registry_data: vec![0x0a, 0x00, 0x00, 0x00], // {}: named empty compound
            dimension: Dimension::Named("minecraft:overworld".to_owned()),
            world_name: Some("minecraft:overworld".to_owned()),
            hashed_seed: -1,
            max_players: 100,
            view_distance: 12,
            ..JoinGame::default()
        }
    }

    #[test]
    fn join_game_1_16_named_dimension() {
        let decoded = round_trip_join(modern_named_join(), ProtocolVersion::V1_16);
        assert_eq!(
            decoded.dimension,
            Dimension::Named("minecraft:overworld".to_owned())
        );
        assert_eq!(decoded.world_name.as_deref(), Some("minecraft:overworld"));
    }

    #[test]
    fn join_game_1_18_nbt_dimension() {
        let dim_nbt = {
            // named empty compound is a valid (if useless) dimension blob
            vec![0x0a, 0x00, 0x00, 0x00]
        };
        let join = JoinGame {
            is_hardcore: true,
            dimension: Dimension::Nbt(dim_nbt.clone()),
            simulation_distance: 8,
            ..modern_named_join()
        };
        let decoded = round_trip_join(join, ProtocolVersion::V1_18);
        assert_eq!(decoded.dimension, Dimension::Nbt(dim_nbt));
        assert!(decoded.is_hardcore);
        assert_eq!(decoded.simulation_distance, 8);
    }

    #[test]
    fn join_game_1_19_death_location() {
        let join = JoinGame {
            death_location: Some(DeathLocation {
                dimension: "minecraft:the_nether".to_owned(),
                position: 0x0123_4567,
            }),
            ..modern_named_join()
        };
        let decoded = round_trip_join(join, ProtocolVersion::V1_19_4);
        assert_eq!(
            decoded.death_location,
            Some(DeathLocation {
                dimension: "minecraft:the_nether".to_owned(),
                position: 0x0123_4567,
            })
        );
    }

    #[test]
    fn join_game_1_20_2_restructure() {
        let join = JoinGame {
            limited_crafting: true,
            portal_cooldown: 40,
            registry_data: Vec::new(),
            tail: vec![0x01], // 1.20.5 enforces-secure-chat flag
            ..modern_named_join()
        };
        let decoded = round_trip_join(join.clone(), ProtocolVersion::V1_20_3);
        assert!(decoded.limited_crafting);
        assert_eq!(decoded.portal_cooldown, 40);
        assert_eq!(decoded.tail, vec![0x01]);
    }

    #[test]
    fn join_game_1_20_5_ided_dimension() {
        let join = JoinGame {
            dimension: Dimension::Ided(2),
            registry_data: Vec::new(),
            ..modern_named_join()
        };
        let decoded = round_trip_join(join, ProtocolVersion::V1_21);
        assert_eq!(decoded.dimension, Dimension::Ided(2));
    }

    #[test]
    fn respawn_flip_changes_legacy_dimension() {
        let join = legacy_join();
        let flipped = Respawn::from_join_game(&join, ProtocolVersion::V1_8, true);
        let back = Respawn::from_join_game(&join, ProtocolVersion::V1_8, false);
        assert_ne!(flipped.body, back.body);
        // flipped respawn targets dimension -1
        assert_eq!(&flipped.body[..4], (-1i32).to_be_bytes().as_slice());
        assert_eq!(&back.body[..4], 0i32.to_be_bytes().as_slice());
    }

    #[test]
    fn respawn_flip_changes_world_on_1_16() {
        let join = modern_named_join();
        let flipped = Respawn::from_join_game(&join, ProtocolVersion::V1_16_2, true);
        let back = Respawn::from_join_game(&join, ProtocolVersion::V1_16_2, false);
        assert_ne!(flipped.body, back.body);
    }
}
