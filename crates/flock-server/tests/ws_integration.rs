mod common;

use flock_core::net::messages::{ClientMessage, LobbyChatMsg, RequestRoomsMsg, ServerMessage};

use common::{
    TestServer, ws_connect, ws_join_room, ws_read_until, ws_ready, ws_register, ws_register_ok,
    ws_send, ws_try_read,
};

#[tokio::test]
async fn register_shares_roster_and_join_notice() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let resp = ws_register(&mut alice, "alice").await;
    assert!(resp.accepted);
    assert_eq!(resp.username.as_deref(), Some("alice"));
    let roster =
        ws_read_until(&mut alice, |m| matches!(m, ServerMessage::LobbyMembers(_))).await;
    assert!(matches!(
        roster,
        ServerMessage::LobbyMembers(r) if r.names == vec!["alice".to_string()]
    ));

    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut bob, "bob").await;

    // alice sees bob's arrival
    let notice = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::LobbyMemberJoined(_))
    })
    .await;
    assert!(matches!(
        notice,
        ServerMessage::LobbyMemberJoined(n) if n.name == "bob"
    ));
}

#[tokio::test]
async fn duplicate_name_rejected_without_side_effects() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;

    let mut imposter = ws_connect(&server.ws_url()).await;
    let resp = ws_register(&mut imposter, "alice").await;
    assert!(!resp.accepted);
    assert!(resp.error.is_some());

    // The first holder saw nothing
    assert!(ws_try_read(&mut alice, 200).await.is_none());

    // And can keep using the connection: a retry with a fresh name works
    let retry = ws_register(&mut imposter, "alice2").await;
    assert!(retry.accepted);
}

#[tokio::test]
async fn empty_name_rejected() {
    let server = TestServer::new().await;
    let mut client = ws_connect(&server.ws_url()).await;
    let resp = ws_register(&mut client, "   ").await;
    assert!(!resp.accepted);
}

#[tokio::test]
async fn room_list_starts_empty_and_tracks_created_rooms() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_send(&mut alice, &ClientMessage::RequestRooms(RequestRoomsMsg {})).await;
    let list = ws_read_until(&mut alice, |m| matches!(m, ServerMessage::RoomList(_))).await;
    assert!(matches!(list, ServerMessage::RoomList(r) if r.rooms.is_empty()));

    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut bob, "bob").await;
    ws_join_room(&mut bob, "nest").await;

    // alice, still in the lobby, sees the refreshed open-room list
    let list = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::RoomList(r) if !r.rooms.is_empty())
    })
    .await;
    assert!(matches!(
        list,
        ServerMessage::RoomList(r) if r.rooms == vec!["nest".to_string()]
    ));
}

#[tokio::test]
async fn joining_a_room_broadcasts_membership() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;

    ws_join_room(&mut alice, "nest").await;
    ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::RoomMembers(r) if r.names == vec!["alice".to_string()])
    })
    .await;

    ws_join_room(&mut bob, "nest").await;
    let notice = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::RoomMemberJoined(_))
    })
    .await;
    assert!(matches!(
        notice,
        ServerMessage::RoomMemberJoined(n) if n.name == "bob"
    ));
    ws_read_until(&mut alice, |m| {
        matches!(
            m,
            ServerMessage::RoomMembers(r)
                if r.names == vec!["alice".to_string(), "bob".to_string()]
        )
    })
    .await;
    ws_read_until(&mut bob, |m| {
        matches!(
            m,
            ServerMessage::RoomMembers(r)
                if r.names == vec!["alice".to_string(), "bob".to_string()]
        )
    })
    .await;
}

#[tokio::test]
async fn lobby_chat_reaches_everyone() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;

    ws_send(
        &mut alice,
        &ClientMessage::LobbyChat(LobbyChatMsg {
            text: "anyone up for a round?".to_string(),
        }),
    )
    .await;

    for stream in [&mut alice, &mut bob] {
        let msg = ws_read_until(stream, |m| {
            matches!(m, ServerMessage::LobbyChatBroadcast(_))
        })
        .await;
        assert!(matches!(
            msg,
            ServerMessage::LobbyChatBroadcast(c)
                if c.sender == "alice" && c.text == "anyone up for a round?"
        ));
    }
}

#[tokio::test]
async fn ready_votes_broadcast_to_the_room() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;
    ws_join_room(&mut alice, "nest").await;
    ws_join_room(&mut bob, "nest").await;

    ws_ready(&mut bob).await;
    for stream in [&mut alice, &mut bob] {
        let msg = ws_read_until(stream, |m| matches!(m, ServerMessage::ReadyList(_))).await;
        assert!(matches!(
            msg,
            ServerMessage::ReadyList(r) if r.names == vec!["bob".to_string()]
        ));
    }
}

#[tokio::test]
async fn readying_room_rejects_new_joins() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    let mut carol = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;
    ws_register_ok(&mut carol, "carol").await;
    ws_join_room(&mut alice, "nest").await;
    ws_join_room(&mut bob, "nest").await;

    ws_ready(&mut alice).await;
    ws_read_until(&mut alice, |m| matches!(m, ServerMessage::ReadyList(_))).await;

    ws_join_room(&mut carol, "nest").await;
    let denied = ws_read_until(&mut carol, |m| {
        matches!(m, ServerMessage::RoomJoinDenied(_))
    })
    .await;
    assert!(matches!(
        denied,
        ServerMessage::RoomJoinDenied(d) if d.room == "nest"
    ));
}

#[tokio::test]
async fn disconnect_from_lobby_announces_and_releases_name() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;
    ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::LobbyMemberJoined(_))
    })
    .await;

    drop(bob);
    let notice = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::LobbyMemberLeft(_))
    })
    .await;
    assert!(matches!(
        notice,
        ServerMessage::LobbyMemberLeft(n) if n.name == "bob"
    ));

    // The name is free again for a new connection
    let mut bob2 = ws_connect(&server.ws_url()).await;
    let resp = ws_register(&mut bob2, "bob").await;
    assert!(resp.accepted);
}

#[tokio::test]
async fn last_member_disconnect_removes_the_room() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;

    ws_join_room(&mut alice, "nest").await;
    ws_read_until(&mut bob, |m| {
        matches!(m, ServerMessage::RoomList(r) if r.rooms == vec!["nest".to_string()])
    })
    .await;

    drop(alice);
    ws_read_until(&mut bob, |m| {
        matches!(m, ServerMessage::RoomList(r) if r.rooms.is_empty())
    })
    .await;

    // The room no longer shows up for explicit requests either
    ws_send(&mut bob, &ClientMessage::RequestRooms(RequestRoomsMsg {})).await;
    let list = ws_read_until(&mut bob, |m| matches!(m, ServerMessage::RoomList(_))).await;
    assert!(matches!(list, ServerMessage::RoomList(r) if r.rooms.is_empty()));
}

#[tokio::test]
async fn return_to_lobby_rejoins_the_roster() {
    let server = TestServer::new().await;

    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    ws_register_ok(&mut alice, "alice").await;
    ws_register_ok(&mut bob, "bob").await;
    ws_join_room(&mut bob, "nest").await;

    ws_send(
        &mut bob,
        &ClientMessage::ReturnToLobby(flock_core::net::messages::ReturnToLobbyMsg {}),
    )
    .await;

    // bob gets the lobby roster back; alice sees the return notice
    let roster = ws_read_until(&mut bob, |m| matches!(m, ServerMessage::LobbyMembers(_))).await;
    assert!(matches!(
        roster,
        ServerMessage::LobbyMembers(r) if r.names.contains(&"bob".to_string())
    ));
    let notice = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::ReturnedToLobby(_))
    })
    .await;
    assert!(matches!(
        notice,
        ServerMessage::ReturnedToLobby(n) if n.name == "bob"
    ));
}
