use serde::{Deserialize, Serialize};

use super::messages::{
    AnnounceNameMsg, ClientMessage, GamePortMsg, GetHighScoresMsg, HighScoresMsg, JoinRoomMsg,
    LobbyChatBroadcastMsg, LobbyChatMsg, MemberMsg, MessageType, PipeHoleMsg, PlayerActionMsg,
    ReadyMsg, RegisterMsg, RegisterResponseMsg, RequestRoomsMsg, RestartMsg, ReturnToLobbyMsg,
    RoomJoinDeniedMsg, RoomListMsg, RosterMsg, ScoreMsg, ServerMessage, SnapshotMsg, StartMsg,
    SubmitHighScoreMsg,
};

/// Current protocol version, carried in the registration message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(f, "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::Register(m) => encode_message(MessageType::Register, m),
        ClientMessage::RequestRooms(m) => encode_message(MessageType::RequestRooms, m),
        ClientMessage::JoinRoom(m) => encode_message(MessageType::JoinRoom, m),
        ClientMessage::LobbyChat(m) => encode_message(MessageType::LobbyChat, m),
        ClientMessage::Ready(m) => encode_message(MessageType::Ready, m),
        ClientMessage::ReturnToLobby(m) => encode_message(MessageType::ReturnToLobby, m),
        ClientMessage::AnnounceName(m) => encode_message(MessageType::AnnounceName, m),
        ClientMessage::PlayerAction(m) => encode_message(MessageType::PlayerAction, m),
        ClientMessage::Snapshot(m) => encode_message(MessageType::Snapshot, m),
        ClientMessage::PipeHole(m) => encode_message(MessageType::PipeHole, m),
        ClientMessage::Score(m) => encode_message(MessageType::Score, m),
        ClientMessage::Restart(m) => encode_message(MessageType::Restart, m),
        ClientMessage::GetHighScores(m) => encode_message(MessageType::GetHighScores, m),
        ClientMessage::SubmitHighScore(m) => encode_message(MessageType::SubmitHighScore, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::RegisterResponse(m) => encode_message(MessageType::RegisterResponse, m),
        ServerMessage::RoomList(m) => encode_message(MessageType::RoomList, m),
        ServerMessage::LobbyChatBroadcast(m) => encode_message(MessageType::LobbyChatBroadcast, m),
        ServerMessage::LobbyMemberJoined(m) => encode_message(MessageType::LobbyMemberJoined, m),
        ServerMessage::LobbyMembers(m) => encode_message(MessageType::LobbyMembers, m),
        ServerMessage::LobbyMemberLeft(m) => encode_message(MessageType::LobbyMemberLeft, m),
        ServerMessage::RoomMemberJoined(m) => encode_message(MessageType::RoomMemberJoined, m),
        ServerMessage::RoomMembers(m) => encode_message(MessageType::RoomMembers, m),
        ServerMessage::RoomMemberLeft(m) => encode_message(MessageType::RoomMemberLeft, m),
        ServerMessage::ReturnedToLobby(m) => encode_message(MessageType::ReturnedToLobby, m),
        ServerMessage::ReadyList(m) => encode_message(MessageType::ReadyList, m),
        ServerMessage::RoomJoinDenied(m) => encode_message(MessageType::RoomJoinDenied, m),
        ServerMessage::GamePort(m) => encode_message(MessageType::GamePort, m),
        ServerMessage::Start(m) => encode_message(MessageType::Start, m),
        ServerMessage::PlebAction(m) => encode_message(MessageType::PlebAction, m),
        ServerMessage::SnapshotUpdate(m) => encode_message(MessageType::SnapshotUpdate, m),
        ServerMessage::CreatePipes(m) => encode_message(MessageType::CreatePipes, m),
        ServerMessage::ScoreUpdate(m) => encode_message(MessageType::ScoreUpdate, m),
        ServerMessage::HighScores(m) => encode_message(MessageType::HighScores, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::Register => Ok(ClientMessage::Register(decode_payload::<RegisterMsg>(
            data,
        )?)),
        MessageType::RequestRooms => Ok(ClientMessage::RequestRooms(decode_payload::<
            RequestRoomsMsg,
        >(data)?)),
        MessageType::JoinRoom => Ok(ClientMessage::JoinRoom(decode_payload::<JoinRoomMsg>(
            data,
        )?)),
        MessageType::LobbyChat => Ok(ClientMessage::LobbyChat(decode_payload::<LobbyChatMsg>(
            data,
        )?)),
        MessageType::Ready => Ok(ClientMessage::Ready(decode_payload::<ReadyMsg>(data)?)),
        MessageType::ReturnToLobby => Ok(ClientMessage::ReturnToLobby(decode_payload::<
            ReturnToLobbyMsg,
        >(data)?)),
        MessageType::AnnounceName => Ok(ClientMessage::AnnounceName(decode_payload::<
            AnnounceNameMsg,
        >(data)?)),
        MessageType::PlayerAction => Ok(ClientMessage::PlayerAction(decode_payload::<
            PlayerActionMsg,
        >(data)?)),
        MessageType::Snapshot => Ok(ClientMessage::Snapshot(decode_payload::<SnapshotMsg>(
            data,
        )?)),
        MessageType::PipeHole => Ok(ClientMessage::PipeHole(decode_payload::<PipeHoleMsg>(
            data,
        )?)),
        MessageType::Score => Ok(ClientMessage::Score(decode_payload::<ScoreMsg>(data)?)),
        MessageType::Restart => Ok(ClientMessage::Restart(decode_payload::<RestartMsg>(data)?)),
        MessageType::GetHighScores => Ok(ClientMessage::GetHighScores(decode_payload::<
            GetHighScoresMsg,
        >(data)?)),
        MessageType::SubmitHighScore => Ok(ClientMessage::SubmitHighScore(decode_payload::<
            SubmitHighScoreMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::RegisterResponse => Ok(ServerMessage::RegisterResponse(decode_payload::<
            RegisterResponseMsg,
        >(data)?)),
        MessageType::RoomList => Ok(ServerMessage::RoomList(decode_payload::<RoomListMsg>(
            data,
        )?)),
        MessageType::LobbyChatBroadcast => Ok(ServerMessage::LobbyChatBroadcast(decode_payload::<
            LobbyChatBroadcastMsg,
        >(data)?)),
        MessageType::LobbyMemberJoined => Ok(ServerMessage::LobbyMemberJoined(decode_payload::<
            MemberMsg,
        >(data)?)),
        MessageType::LobbyMembers => Ok(ServerMessage::LobbyMembers(
            decode_payload::<RosterMsg>(data)?,
        )),
        MessageType::LobbyMemberLeft => Ok(ServerMessage::LobbyMemberLeft(decode_payload::<
            MemberMsg,
        >(data)?)),
        MessageType::RoomMemberJoined => Ok(ServerMessage::RoomMemberJoined(decode_payload::<
            MemberMsg,
        >(data)?)),
        MessageType::RoomMembers => Ok(ServerMessage::RoomMembers(decode_payload::<RosterMsg>(
            data,
        )?)),
        MessageType::RoomMemberLeft => Ok(ServerMessage::RoomMemberLeft(decode_payload::<
            MemberMsg,
        >(data)?)),
        MessageType::ReturnedToLobby => Ok(ServerMessage::ReturnedToLobby(decode_payload::<
            MemberMsg,
        >(data)?)),
        MessageType::ReadyList => Ok(ServerMessage::ReadyList(decode_payload::<RosterMsg>(
            data,
        )?)),
        MessageType::RoomJoinDenied => Ok(ServerMessage::RoomJoinDenied(decode_payload::<
            RoomJoinDeniedMsg,
        >(data)?)),
        MessageType::GamePort => Ok(ServerMessage::GamePort(decode_payload::<GamePortMsg>(
            data,
        )?)),
        MessageType::Start => Ok(ServerMessage::Start(decode_payload::<StartMsg>(data)?)),
        MessageType::PlebAction => Ok(ServerMessage::PlebAction(decode_payload::<
            PlayerActionMsg,
        >(data)?)),
        MessageType::SnapshotUpdate => Ok(ServerMessage::SnapshotUpdate(decode_payload::<
            SnapshotMsg,
        >(data)?)),
        MessageType::CreatePipes => Ok(ServerMessage::CreatePipes(decode_payload::<PipeHoleMsg>(
            data,
        )?)),
        MessageType::ScoreUpdate => Ok(ServerMessage::ScoreUpdate(decode_payload::<ScoreMsg>(
            data,
        )?)),
        MessageType::HighScores => Ok(ServerMessage::HighScores(decode_payload::<HighScoresMsg>(
            data,
        )?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Map an inbound session message type to the type it is rebroadcast as.
/// Returns `None` for types the session does not fan out verbatim.
pub fn relay_retag(msg_type: MessageType) -> Option<MessageType> {
    match msg_type {
        MessageType::PlayerAction => Some(MessageType::PlebAction),
        MessageType::Snapshot => Some(MessageType::SnapshotUpdate),
        MessageType::PipeHole => Some(MessageType::CreatePipes),
        MessageType::Score => Some(MessageType::ScoreUpdate),
        _ => None,
    }
}

/// Rewrite a frame's type byte, leaving the payload bytes untouched. The relay
/// uses this to fan out boss traffic without ever decoding its contents.
pub fn retag(data: &[u8], msg_type: MessageType) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out[0] = msg_type as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::PlayerAction;
    use crate::player::{Avatar, PlayerState, Snapshot};
    use crate::score::ScoreRecord;

    #[test]
    fn roundtrip_register() {
        let msg = ClientMessage::Register(RegisterMsg {
            username: "alice".to_string(),
            avatar: Avatar::new(1).unwrap(),
            protocol_version: PROTOCOL_VERSION,
        });
        let encoded = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_player_action() {
        let msg = ClientMessage::PlayerAction(PlayerActionMsg {
            action: PlayerAction::Jump,
            name: "bob".to_string(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_snapshot() {
        let mut players = Snapshot::new();
        players.insert(
            "alice".to_string(),
            PlayerState {
                x: 10.0,
                y: 20.5,
                angle: -0.3,
                alive: true,
                velocity_y: 4.2,
            },
        );
        let msg = ClientMessage::Snapshot(SnapshotMsg { players });
        let encoded = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_start() {
        let msg = ServerMessage::Start(StartMsg {
            participants: vec!["alice".to_string(), "bob".to_string()],
            boss: "alice".to_string(),
            avatars: vec![Avatar::default(), Avatar::new(2).unwrap()],
        });
        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_high_scores() {
        let msg = ServerMessage::HighScores(HighScoresMsg {
            records: vec![ScoreRecord {
                username: "alice".to_string(),
                score: 42,
            }],
            last: None,
        });
        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn empty_message_rejected() {
        assert!(matches!(
            decode_message_type(&[]),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(
            decode_message_type(&[0xFF]),
            Err(ProtocolError::UnknownMessageType(0xFF))
        ));
    }

    #[test]
    fn retag_swaps_type_byte_only() {
        let msg = ClientMessage::Snapshot(SnapshotMsg {
            players: Snapshot::new(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        let retagged = retag(&encoded, MessageType::SnapshotUpdate);
        assert_eq!(retagged[0], MessageType::SnapshotUpdate as u8);
        assert_eq!(&retagged[1..], &encoded[1..]);
        // Retagged frame decodes as the broadcast form with an identical payload
        match decode_server_message(&retagged).unwrap() {
            ServerMessage::SnapshotUpdate(m) => assert!(m.players.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn relay_retag_covers_boss_traffic() {
        assert_eq!(
            relay_retag(MessageType::Snapshot),
            Some(MessageType::SnapshotUpdate)
        );
        assert_eq!(
            relay_retag(MessageType::PipeHole),
            Some(MessageType::CreatePipes)
        );
        assert_eq!(
            relay_retag(MessageType::Score),
            Some(MessageType::ScoreUpdate)
        );
        assert_eq!(
            relay_retag(MessageType::PlayerAction),
            Some(MessageType::PlebAction)
        );
        assert_eq!(relay_retag(MessageType::Register), None);
    }

    #[test]
    fn message_type_byte_roundtrip() {
        for b in 0..=0x30u8 {
            if let Some(t) = MessageType::from_byte(b) {
                assert_eq!(t as u8, b, "discriminator mismatch for 0x{b:02x}");
            }
        }
    }
}
