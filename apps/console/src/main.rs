use anyhow::Result;
use clap::Parser;
use hub_client::{AuthSnapshot, HubClient};
use room_service::{RoomRecipient, RoomRequest};
use shared::{
    domain::{UserProfile, UserSessionId},
    protocol::{EventKey, HubEvent},
};
use tracing::info;
use uuid::Uuid;

/// Presence probe: logs in a synthetic profile, prints presence and call
/// events, optionally rings another user, and stays up until ctrl-c.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    user_id: i64,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long, default_value = "user")]
    role: String,
    /// Session identifier of a user to invite into a consultation room.
    #[arg(long)]
    ring: Option<String>,
    #[arg(long)]
    video: bool,
    #[arg(long)]
    hub_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = hub_client::load_settings();
    if let Some(url) = args.hub_url {
        settings.hub_url = url;
    }
    if let Some(key) = args.api_key {
        settings.api_key = key;
    }

    let client = HubClient::new(settings);

    client.bus().subscribe(EventKey::OnlineUsersUpdate, |event| {
        if let HubEvent::OnlineUsersUpdate(update) = event {
            println!("online now: {:?}", update.online_users);
        }
    });
    client.bus().subscribe(EventKey::IncomingCall, |event| {
        if let HubEvent::IncomingCall(call) = event {
            let kind = if call.is_video { "video" } else { "audio" };
            println!(
                "incoming {kind} call from {} (room {})",
                call.from_username, call.room_id
            );
        }
    });

    let profile = UserProfile {
        id: Some(args.user_id),
        first_name: args.first_name,
        last_name: args.last_name,
        role: Some(args.role),
        ..UserProfile::default()
    };
    let caller_name = UserSessionId::from_profile(&profile)
        .and_then(|id| id.display_name())
        .unwrap_or_else(|| format!("user-{}", args.user_id));

    client.handle_auth_change(&AuthSnapshot {
        user: Some(profile),
        is_authenticated: true,
    });

    if let Some(target) = args.ring {
        let display_name = UserSessionId(target.clone())
            .display_name()
            .unwrap_or_else(|| target.clone());
        let request = RoomRequest {
            room_id: format!("consult-{}", Uuid::new_v4()),
            from_username: caller_name,
            recipients: vec![RoomRecipient {
                identifier: target,
                display_name,
            }],
            is_video: args.video,
            group_name: None,
            check_only: None,
        };
        match client.calls().request_room(&request).await {
            Ok(grant) => info!(
                room = %grant.room_id,
                server = %grant.server_url,
                participants = grant.participants.len(),
                "room provisioned"
            ),
            Err(err) => eprintln!("call setup failed: {err}"),
        }
    }

    tokio::signal::ctrl_c().await?;
    client.disconnect();
    Ok(())
}
