//! Connects to a lobby and logs everything that happens until Ctrl-C.
//!
//! ```text
//! LOBBY_URL=wss://lobby.example.com/lobby/ LOBBY_TOKEN=eyJ... \
//! RUST_LOG=info,lobby=debug cargo run -p lobby-probe
//! ```

use lobby::prelude::*;
use tracing_subscriber::EnvFilter;

/// Notifications worth printing.
const WATCHED: &[MessageType] = &[
    MessageType::ConnectNotif,
    MessageType::DisconnectNotif,
    MessageType::ErrorNotif,
    MessageType::PartyGetInvitedNotif,
    MessageType::PartyJoinNotif,
    MessageType::PartyLeaveNotif,
    MessageType::PartyKickNotif,
    MessageType::PartyDataUpdateNotif,
    MessageType::PartyChatNotif,
    MessageType::PersonalChatNotif,
    MessageType::UserStatusNotif,
    MessageType::MatchmakingNotif,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("LOBBY_URL")
        .unwrap_or_else(|_| LobbyConfig::default().url);
    let token = std::env::var("LOBBY_TOKEN")
        .map_err(|_| "LOBBY_TOKEN must hold an access token")?;

    let lobby = Lobby::builder().url(url).access_token(token).spawn_websocket();

    for kind in WATCHED {
        lobby.subscribe(kind.clone(), |frame| {
            tracing::info!(kind = %frame.kind, payload = %frame.fields.to_json(), "notification");
        });
    }
    lobby.on_user_banned(|notice| {
        tracing::warn!(ban = %notice.ban, reason = %notice.reason, "banned; set a fresh token to reconnect");
    });

    let mut events = lobby.events();
    lobby.connect().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LobbyEvent::Disconnected { code, reason }) if reason.is_terminal() => {
                    tracing::info!(%code, %reason, "lobby session over");
                    break;
                }
                Ok(event) => tracing::info!(?event, "lobby event"),
                Err(e) => tracing::warn!(error = %e, "missed lobby events"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, disconnecting");
                lobby.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}
