use serde::{Deserialize, Serialize};

pub mod srp;

/// Serialization version this client speaks. A server greeting carrying any
/// other value is dropped.
pub const SERIALIZE_VER: u8 = 28;
pub const MIN_PROTO_VER: u16 = 39;
pub const MAX_PROTO_VER: u16 = 39;

pub const DEFAULT_LANG: &str = "en_US";

/// Authentication methods advertised by the server as a bitmask in `Hello`.
pub mod auth_methods {
    pub const LEGACY_PASSWD: u32 = 1 << 0;
    pub const SRP: u32 = 1 << 1;
    pub const FIRST_SRP: u32 = 1 << 2;
}

/// Commands sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ToClient {
    Hello {
        serialize_ver: u8,
        proto_ver: u16,
        auth_methods: u32,
        username: String,
    },
    SrpBytesSaltB {
        salt: Vec<u8>,
        b: Vec<u8>,
    },
    Denied {
        reason: String,
        reconnect: bool,
    },
    AcceptAuth {
        player_pos: PlayerPos,
        map_seed: u64,
        send_interval: f32,
        sudo_auth_methods: u32,
    },
    TimeOfDay {
        time: u16,
        speed: f32,
    },
    DeathScreen {
        point_cam: bool,
        point_at: PlayerPos,
    },
    MovePlayer {
        pos: PlayerPos,
        pitch: f32,
        yaw: f32,
    },
    Breath {
        breath: u16,
    },
    ChatMsg {
        sender: String,
        text: String,
        timestamp: i64,
    },
}

impl ToClient {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ToClient::Hello { .. } => "hello",
            ToClient::SrpBytesSaltB { .. } => "srp_bytes_salt_b",
            ToClient::Denied { .. } => "denied",
            ToClient::AcceptAuth { .. } => "accept_auth",
            ToClient::TimeOfDay { .. } => "time_of_day",
            ToClient::DeathScreen { .. } => "death_screen",
            ToClient::MovePlayer { .. } => "move_player",
            ToClient::Breath { .. } => "breath",
            ToClient::ChatMsg { .. } => "chat_msg",
        }
    }
}

/// Commands sent by the client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ToServer {
    Init {
        serialize_ver: u8,
        min_proto_ver: u16,
        max_proto_ver: u16,
        player_name: String,
    },
    SrpBytesA {
        a: Vec<u8>,
        no_sha1: bool,
    },
    FirstSrp {
        salt: Vec<u8>,
        verifier: Vec<u8>,
        empty_passwd: bool,
    },
    SrpBytesM {
        m: Vec<u8>,
    },
    Init2 {
        lang: String,
    },
    CltReady {
        major: u8,
        minor: u8,
        patch: u8,
        reserved: u8,
        version: String,
        formspec: u16,
    },
    Respawn,
}

impl ToServer {
    pub fn kind(&self) -> &'static str {
        match self {
            ToServer::Init { .. } => "init",
            ToServer::SrpBytesA { .. } => "srp_bytes_a",
            ToServer::FirstSrp { .. } => "first_srp",
            ToServer::SrpBytesM { .. } => "srp_bytes_m",
            ToServer::Init2 { .. } => "init2",
            ToServer::CltReady { .. } => "clt_ready",
            ToServer::Respawn => "respawn",
        }
    }

    /// The initial handshake command for `player_name`.
    pub fn init(player_name: &str) -> Self {
        ToServer::Init {
            serialize_ver: SERIALIZE_VER,
            min_proto_ver: MIN_PROTO_VER,
            max_proto_ver: MAX_PROTO_VER,
            player_name: player_name.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct PlayerPos {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PlayerPos {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_init_carries_protocol_bounds() {
        match ToServer::init("bot") {
            ToServer::Init {
                serialize_ver,
                min_proto_ver,
                max_proto_ver,
                player_name,
            } => {
                assert_eq!(serialize_ver, 28);
                assert_eq!(min_proto_ver, 39);
                assert_eq!(max_proto_ver, 39);
                assert_eq!(player_name, "bot");
            }
            _ => panic!("Wrong command type"),
        }
    }

    #[test]
    fn test_auth_method_bits_are_distinct() {
        assert_eq!(auth_methods::LEGACY_PASSWD & auth_methods::SRP, 0);
        assert_eq!(auth_methods::SRP & auth_methods::FIRST_SRP, 0);
        assert_eq!(auth_methods::LEGACY_PASSWD & auth_methods::FIRST_SRP, 0);
    }

    #[test]
    fn test_chat_message_serialization() {
        let cmd = ToClient::ChatMsg {
            sender: "alice".to_string(),
            text: "<alice> hi there".to_string(),
            timestamp: 1_700_000_000,
        };

        let serialized = bincode::serialize(&cmd).unwrap();
        let deserialized: ToClient = bincode::deserialize(&serialized).unwrap();

        assert_eq!(deserialized, cmd);
    }

    #[test]
    fn test_move_player_serialization() {
        let cmd = ToClient::MovePlayer {
            pos: PlayerPos::new(10.5, -3.25, 7.0),
            pitch: 12.0,
            yaw: 270.0,
        };

        let serialized = bincode::serialize(&cmd).unwrap();
        let deserialized: ToClient = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            ToClient::MovePlayer { pos, pitch, yaw } => {
                assert_approx_eq!(pos.x, 10.5, 0.001);
                assert_approx_eq!(pos.y, -3.25, 0.001);
                assert_approx_eq!(pos.z, 7.0, 0.001);
                assert_approx_eq!(pitch, 12.0, 0.001);
                assert_approx_eq!(yaw, 270.0, 0.001);
            }
            _ => panic!("Wrong command type after deserialization"),
        }
    }

    #[test]
    fn test_truncated_packet_fails_to_decode() {
        let cmd = ToClient::Breath { breath: 11 };
        let serialized = bincode::serialize(&cmd).unwrap();

        let result: Result<ToClient, _> = bincode::deserialize(&serialized[..2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_kinds() {
        assert_eq!(ToClient::Breath { breath: 10 }.kind(), "breath");
        assert_eq!(
            ToClient::Denied {
                reason: "banned".to_string(),
                reconnect: false
            }
            .kind(),
            "denied"
        );
    }
}
