use serde::{Deserialize, Serialize};

use crate::player::{Avatar, Snapshot};
use crate::score::ScoreRecord;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Lobby server
    Register = 0x01,
    RequestRooms = 0x02,
    JoinRoom = 0x03,
    LobbyChat = 0x04,
    Ready = 0x05,
    ReturnToLobby = 0x06,

    // Client -> Game session
    AnnounceName = 0x08,
    PlayerAction = 0x09,
    Snapshot = 0x0A,
    PipeHole = 0x0B,
    Score = 0x0C,
    Restart = 0x0D,
    GetHighScores = 0x0E,
    SubmitHighScore = 0x0F,

    // Lobby server -> Client
    RegisterResponse = 0x10,
    RoomList = 0x11,
    LobbyChatBroadcast = 0x12,
    LobbyMemberJoined = 0x13,
    LobbyMembers = 0x14,
    LobbyMemberLeft = 0x15,
    RoomMemberJoined = 0x16,
    RoomMembers = 0x17,
    RoomMemberLeft = 0x18,
    ReturnedToLobby = 0x19,
    ReadyList = 0x1A,
    RoomJoinDenied = 0x1B,
    GamePort = 0x1C,

    // Game session -> Client
    Start = 0x20,
    PlebAction = 0x21,
    SnapshotUpdate = 0x22,
    CreatePipes = 0x23,
    ScoreUpdate = 0x24,
    HighScores = 0x25,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::Register,
            0x02 => Self::RequestRooms,
            0x03 => Self::JoinRoom,
            0x04 => Self::LobbyChat,
            0x05 => Self::Ready,
            0x06 => Self::ReturnToLobby,
            0x08 => Self::AnnounceName,
            0x09 => Self::PlayerAction,
            0x0A => Self::Snapshot,
            0x0B => Self::PipeHole,
            0x0C => Self::Score,
            0x0D => Self::Restart,
            0x0E => Self::GetHighScores,
            0x0F => Self::SubmitHighScore,
            0x10 => Self::RegisterResponse,
            0x11 => Self::RoomList,
            0x12 => Self::LobbyChatBroadcast,
            0x13 => Self::LobbyMemberJoined,
            0x14 => Self::LobbyMembers,
            0x15 => Self::LobbyMemberLeft,
            0x16 => Self::RoomMemberJoined,
            0x17 => Self::RoomMembers,
            0x18 => Self::RoomMemberLeft,
            0x19 => Self::ReturnedToLobby,
            0x1A => Self::ReadyList,
            0x1B => Self::RoomJoinDenied,
            0x1C => Self::GamePort,
            0x20 => Self::Start,
            0x21 => Self::PlebAction,
            0x22 => Self::SnapshotUpdate,
            0x23 => Self::CreatePipes,
            0x24 => Self::ScoreUpdate,
            0x25 => Self::HighScores,
            _ => return None,
        })
    }
}

/// A pleb's local input, forwarded to the boss for authoritative simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    Jump,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMsg {
    pub username: String,
    pub avatar: Avatar,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponseMsg {
    pub accepted: bool,
    pub username: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestRoomsMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomMsg {
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoinDeniedMsg {
    pub room: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyChatMsg {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyChatBroadcastMsg {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadyMsg {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnToLobbyMsg {}

/// Single-name notice shared by join/leave/returned broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberMsg {
    pub name: String,
}

/// Full name list shared by lobby/room/ready roster broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterMsg {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomListMsg {
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePortMsg {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnounceNameMsg {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerActionMsg {
    pub action: PlayerAction,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMsg {
    pub players: Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeHoleMsg {
    pub hole: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMsg {
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartMsg {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetHighScoresMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitHighScoreMsg {
    pub username: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScoresMsg {
    pub records: Vec<ScoreRecord>,
    /// The most recent record submitted within this session, if any.
    pub last: Option<ScoreRecord>,
}

/// Fired once per session when every participant has connected. The roster is
/// frozen at launch; index 0 of `participants` is the boss by join order, but
/// receivers must use the explicit `boss` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartMsg {
    pub participants: Vec<String>,
    pub boss: String,
    pub avatars: Vec<Avatar>,
}

/// Every message a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register(RegisterMsg),
    RequestRooms(RequestRoomsMsg),
    JoinRoom(JoinRoomMsg),
    LobbyChat(LobbyChatMsg),
    Ready(ReadyMsg),
    ReturnToLobby(ReturnToLobbyMsg),
    AnnounceName(AnnounceNameMsg),
    PlayerAction(PlayerActionMsg),
    Snapshot(SnapshotMsg),
    PipeHole(PipeHoleMsg),
    Score(ScoreMsg),
    Restart(RestartMsg),
    GetHighScores(GetHighScoresMsg),
    SubmitHighScore(SubmitHighScoreMsg),
}

/// Every message a server (lobby or session) may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    RegisterResponse(RegisterResponseMsg),
    RoomList(RoomListMsg),
    LobbyChatBroadcast(LobbyChatBroadcastMsg),
    LobbyMemberJoined(MemberMsg),
    LobbyMembers(RosterMsg),
    LobbyMemberLeft(MemberMsg),
    RoomMemberJoined(MemberMsg),
    RoomMembers(RosterMsg),
    RoomMemberLeft(MemberMsg),
    ReturnedToLobby(MemberMsg),
    ReadyList(RosterMsg),
    RoomJoinDenied(RoomJoinDeniedMsg),
    GamePort(GamePortMsg),
    Start(StartMsg),
    PlebAction(PlayerActionMsg),
    SnapshotUpdate(SnapshotMsg),
    CreatePipes(PipeHoleMsg),
    ScoreUpdate(ScoreMsg),
    HighScores(HighScoresMsg),
}
