use std::fmt::Write as _;
use tracing::info;

use super::request::MusicRequest;
use crate::Data;
use crate::error::MusicResult;
use crate::player::{AddRequest, JoinOutcome, PlaybackState, Requester, SessionStatus};

/// Discord rejects messages over 2000 characters.
const MAX_REPLY_LEN: usize = 1900;

/// Runs one request and renders the text of its single reply.
pub async fn execute(
    data: &Data,
    guild: u64,
    requester: Requester,
    request: MusicRequest,
) -> MusicResult<String> {
    info!("Guild {}: {:?}", guild, request);

    match request {
        MusicRequest::Join => {
            let outcome = data
                .coordinators
                .coordinator(guild)
                .join(requester.voice_channel)
                .await?;
            Ok(match outcome {
                JoinOutcome::Joined(channel) => format!("Joined <#{}>", channel),
                JoinOutcome::AlreadyHere(channel) => format!("Already in <#{}>", channel),
            })
        }
        MusicRequest::Leave => {
            data.coordinators.coordinator(guild).leave().await?;
            Ok("Left the voice channel.".to_string())
        }
        MusicRequest::Stop => {
            let stopped = data.coordinators.coordinator(guild).stop().await?;
            Ok(format!("Music stopped ({}).", stopped))
        }
        MusicRequest::NowPlaying => {
            let status = match data.coordinators.get(guild) {
                Some(coordinator) => Some(coordinator.status().await?),
                None => None,
            };
            Ok(render_status(status))
        }
        MusicRequest::Play { track, playlist } => {
            let id = data
                .coordinators
                .coordinator(guild)
                .play_single(playlist, track, requester)
                .await?;
            Ok(format!("Now playing {}", id))
        }
        MusicRequest::PlayPlaylist { playlist } => {
            let started = data
                .coordinators
                .coordinator(guild)
                .play_playlist(playlist, requester)
                .await?;
            Ok(format!(
                "Playing playlist {} ({} tracks), starting with {}",
                started.playlist, started.total, started.first
            ))
        }
        MusicRequest::Add {
            source,
            title,
            playlist,
        } => {
            let added = data
                .acquirer
                .add_track(AddRequest {
                    source,
                    guild,
                    playlist,
                    title,
                })
                .await?;
            Ok(match added.playlist {
                Some(playlist) => {
                    format!("Downloaded and added {} to playlist {}.", added.id, playlist)
                }
                None => format!("Downloaded and added {} to the library.", added.id),
            })
        }
        MusicRequest::ListSongs { playlist } => {
            let playlist = playlist.as_deref().map(crate::library::resolve_identifier);
            let ids = data.acquirer.library().list(guild, playlist.as_deref())?;
            if ids.is_empty() {
                return Ok(match playlist {
                    Some(name) => format!("No songs in playlist {}.", name),
                    None => "No songs found for this server.".to_string(),
                });
            }
            Ok(render_list("Available songs:", &ids))
        }
        MusicRequest::ListPlaylists => {
            let names = data.acquirer.library().list_playlists(guild)?;
            if names.is_empty() {
                return Ok("No playlists yet. Add one with `/add url title playlist`.".to_string());
            }
            Ok(render_list("Playlists:", &names))
        }
    }
}

fn render_status(status: Option<SessionStatus>) -> String {
    let Some(status) = status else {
        return "Not connected to a voice channel.".to_string();
    };

    match (status.state, status.now_playing) {
        (PlaybackState::Disconnected, _) => "Not connected to a voice channel.".to_string(),
        (PlaybackState::Playing, Some(track)) => {
            let mut out = format!("Now playing {}", track);
            if let Some(playlist) = status.playlist {
                let _ = write!(out, " from playlist {}", playlist);
            }
            if !status.queue.is_empty() {
                out = render_list(&format!("{}\nUp next:", out), &status.queue);
            }
            out
        }
        _ => "Nothing is playing.".to_string(),
    }
}

/// Bullet list that stays under the message limit.
fn render_list(header: &str, items: &[String]) -> String {
    let mut out = header.to_string();
    for (i, item) in items.iter().enumerate() {
        let line = format!("\n- {}", item);
        if out.len() + line.len() > MAX_REPLY_LEN {
            let _ = write!(out, "\n...and {} more", items.len() - i);
            break;
        }
        out.push_str(&line);
    }
    out
}
