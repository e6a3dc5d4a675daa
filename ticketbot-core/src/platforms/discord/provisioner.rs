// File: ticketbot-core/src/platforms/discord/provisioner.rs
//
// ChannelProvisioner over the Discord REST API (twilight-http).

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use twilight_http::Client as HttpClient;
use twilight_http::error::{Error as HttpError, ErrorType};
use twilight_model::channel::permission_overwrite::{PermissionOverwrite, PermissionOverwriteType};
use twilight_model::channel::{ChannelType, Message};
use twilight_model::guild::Permissions;
use twilight_model::http::permission_overwrite::{
    PermissionOverwrite as HttpPermissionOverwrite, PermissionOverwriteType as HttpPermissionOverwriteType,
};
use twilight_model::id::Id;

use ticketbot_common::error::Error;
use ticketbot_common::models::{
    ChannelPermission, ChannelSpec, OverwriteTarget, PermissionGrant, TranscriptMessage,
};
use ticketbot_common::traits::api::ChannelProvisioner;

pub struct DiscordChannelProvisioner {
    http: Arc<HttpClient>,
}

impl DiscordChannelProvisioner {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

/// Parses a snowflake; zero and non-numeric input are rejected.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<Id<T>, Error> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::Platform(format!("invalid {what} id: {raw}")))
}

pub fn to_permissions(perms: &[ChannelPermission]) -> Permissions {
    perms.iter().fold(Permissions::empty(), |acc, p| {
        acc | match p {
            ChannelPermission::ViewChannel => Permissions::VIEW_CHANNEL,
            ChannelPermission::SendMessages => Permissions::SEND_MESSAGES,
            ChannelPermission::ReadMessageHistory => Permissions::READ_MESSAGE_HISTORY,
            ChannelPermission::ManageMessages => Permissions::MANAGE_MESSAGES,
            ChannelPermission::AttachFiles => Permissions::ATTACH_FILES,
        }
    })
}

/// Overwrite attached to a channel at creation time.
pub fn to_overwrite(grant: &PermissionGrant) -> Result<PermissionOverwrite, Error> {
    let (id, kind) = match &grant.target {
        OverwriteTarget::Role(id) => (parse_id(id, "role")?, PermissionOverwriteType::Role),
        OverwriteTarget::Member(id) => (parse_id(id, "user")?, PermissionOverwriteType::Member),
    };
    Ok(PermissionOverwrite {
        allow: to_permissions(&grant.allow),
        deny: to_permissions(&grant.deny),
        id,
        kind,
    })
}

/// Overwrite sent to an existing channel; empty sets are left out of the payload.
fn participant_overwrite(user_id: &str) -> Result<HttpPermissionOverwrite, Error> {
    let allow = to_permissions(&[
        ChannelPermission::ViewChannel,
        ChannelPermission::SendMessages,
        ChannelPermission::ReadMessageHistory,
    ]);
    Ok(HttpPermissionOverwrite {
        allow: Some(allow),
        deny: None,
        id: parse_id(user_id, "user")?,
        kind: HttpPermissionOverwriteType::Member,
    })
}

fn platform_err(what: &str, e: impl std::fmt::Debug) -> Error {
    Error::Platform(format!("{what}: {e:?}"))
}

fn is_not_found(e: &HttpError) -> bool {
    matches!(e.kind(), ErrorType::Response { status, .. } if status.get() == 404)
}

fn to_transcript_message(msg: &Message) -> TranscriptMessage {
    let author_tag = if msg.author.discriminator == 0 {
        msg.author.name.clone()
    } else {
        format!("{}#{:04}", msg.author.name, msg.author.discriminator)
    };
    TranscriptMessage {
        id: msg.id.to_string(),
        author_id: msg.author.id.to_string(),
        author_tag,
        content: msg.content.clone(),
        timestamp: DateTime::from_timestamp_micros(msg.timestamp.as_micros()).unwrap_or_else(Utc::now),
        attachments: msg.attachments.iter().map(|a| a.url.clone()).collect(),
    }
}

#[async_trait]
impl ChannelProvisioner for DiscordChannelProvisioner {
    async fn create_channel(&self, guild_id: &str, spec: &ChannelSpec) -> Result<String, Error> {
        let guild = parse_id(guild_id, "guild")?;
        let overwrites = spec
            .permissions
            .iter()
            .map(to_overwrite)
            .collect::<Result<Vec<_>, _>>()?;

        let mut request = self
            .http
            .create_guild_channel(guild, &spec.name)
            .kind(ChannelType::GuildText)
            .topic(&spec.topic)
            .permission_overwrites(&overwrites);
        if let Some(parent) = &spec.parent_id {
            request = request.parent_id(parse_id(parent, "category")?);
        }

        let channel = request
            .await
            .map_err(|e| platform_err("create channel", e))?
            .model()
            .await
            .map_err(|e| platform_err("decode created channel", e))?;
        debug!("created channel {} ({}) in guild {}", channel.id, spec.name, guild_id);
        Ok(channel.id.to_string())
    }

    async fn create_category(&self, guild_id: &str, name: &str) -> Result<String, Error> {
        let guild = parse_id(guild_id, "guild")?;
        let category = self
            .http
            .create_guild_channel(guild, name)
            .kind(ChannelType::GuildCategory)
            .await
            .map_err(|e| platform_err("create category", e))?
            .model()
            .await
            .map_err(|e| platform_err("decode created category", e))?;
        debug!("created category {} ({}) in guild {}", category.id, name, guild_id);
        Ok(category.id.to_string())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id, "channel")?;
        match self.http.delete_channel(channel).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(platform_err("delete channel", e)),
        }
    }

    async fn set_channel_parent(&self, channel_id: &str, category_id: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id, "channel")?;
        let category = parse_id(category_id, "category")?;
        self.http
            .update_channel(channel)
            .parent_id(Some(category))
            .await
            .map_err(|e| platform_err("move channel", e))?;
        Ok(())
    }

    async fn grant_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id, "channel")?;
        let overwrite = participant_overwrite(user_id)?;
        self.http
            .update_channel_permission(channel, &overwrite)
            .await
            .map_err(|e| platform_err("grant participant", e))?;
        Ok(())
    }

    async fn revoke_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id, "channel")?;
        let user = parse_id(user_id, "user")?;
        self.http
            .delete_channel_permission(channel)
            .member(user)
            .await
            .map_err(|e| platform_err("revoke participant", e))?;
        Ok(())
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, Error> {
        let channel = parse_id(channel_id, "channel")?;
        match self.http.channel(channel).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(platform_err("fetch channel", e)),
        }
    }

    async fn fetch_messages(&self, channel_id: &str, limit: u16) -> Result<Vec<TranscriptMessage>, Error> {
        let channel = parse_id(channel_id, "channel")?;
        let messages = self
            .http
            .channel_messages(channel)
            .limit(limit.clamp(1, 100))
            .await
            .map_err(|e| platform_err("fetch messages", e))?
            .models()
            .await
            .map_err(|e| platform_err("decode messages", e))?;
        Ok(messages.iter().map(to_transcript_message).collect())
    }

    async fn send_notice(&self, channel_id: &str, text: &str) -> Result<(), Error> {
        let channel = parse_id(channel_id, "channel")?;
        self.http
            .create_message(channel)
            .content(text)
            .await
            .map_err(|e| platform_err("send message", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twilight_model::id::marker::ChannelMarker;

    #[test]
    fn parse_id_rejects_zero_and_garbage() {
        assert!(parse_id::<ChannelMarker>("0", "channel").is_err());
        assert!(parse_id::<ChannelMarker>("abc", "channel").is_err());
        assert_eq!(parse_id::<ChannelMarker>(" 42 ", "channel").unwrap().get(), 42);
    }

    #[test]
    fn overwrite_maps_allow_and_deny() {
        let everyone = PermissionGrant::deny(
            OverwriteTarget::Role("10".into()),
            &[ChannelPermission::ViewChannel],
        );
        let ow = to_overwrite(&everyone).unwrap();
        assert_eq!(ow.kind, PermissionOverwriteType::Role);
        assert_eq!(ow.id.get(), 10);
        assert!(ow.allow.is_empty());
        assert_eq!(ow.deny, Permissions::VIEW_CHANNEL);

        let author = PermissionGrant::allow(
            OverwriteTarget::Member("12".into()),
            &[ChannelPermission::ViewChannel, ChannelPermission::AttachFiles],
        );
        let ow = to_overwrite(&author).unwrap();
        assert_eq!(ow.kind, PermissionOverwriteType::Member);
        assert_eq!(ow.allow, Permissions::VIEW_CHANNEL | Permissions::ATTACH_FILES);
        assert!(ow.deny.is_empty());
    }

    #[test]
    fn participant_overwrite_only_allows() {
        let member = participant_overwrite("11").unwrap();
        assert_eq!(member.kind, HttpPermissionOverwriteType::Member);
        assert_eq!(
            member.allow,
            Some(Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY)
        );
        assert_eq!(member.deny, None);
        assert!(participant_overwrite("nope").is_err());
    }
}
