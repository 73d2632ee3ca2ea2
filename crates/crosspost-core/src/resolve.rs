//! Mapping human-entered names and tags to backend-addressable recipients.

use tracing::debug;

use crate::{
    domain::{Backend, Conversation, Destination, Recipient},
    ports::{ContactLookup, Directory},
    Result,
};

/// Splits a raw multi-entry input into trimmed, non-blank entries.
/// Accepts newline or comma separation.
pub fn split_entries(raw: &str) -> Vec<String> {
    raw.split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits typed destinations into the per-backend raw lists the resolvers
/// consume: Telegram channels, Telegram group names, Slack channels.
pub fn partition(destinations: &[Destination]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut tg_channels = Vec::new();
    let mut tg_groups = Vec::new();
    let mut slack_channels = Vec::new();
    for dest in destinations {
        match dest {
            Destination::TelegramChannel(handle) => tg_channels.push(handle.clone()),
            Destination::TelegramGroup(name) => tg_groups.push(name.clone()),
            Destination::SlackChannel(key) => slack_channels.push(key.clone()),
        }
    }
    (tg_channels, tg_groups, slack_channels)
}

/// Picks the numeric id of every group conversation whose name exactly
/// matches a wanted name (case-sensitive). Non-group conversations never
/// match, even on an exact name hit. Duplicate names are not merged: every
/// matching conversation contributes its id. Wanted names that match
/// nothing are dropped without an error.
pub fn match_groups(conversations: &[Conversation], wanted: &[String]) -> Vec<i64> {
    let ids: Vec<i64> = conversations
        .iter()
        .filter(|conv| conv.is_group && wanted.iter().any(|name| name == &conv.name))
        .map(|conv| conv.id)
        .collect();

    for name in wanted {
        if !conversations
            .iter()
            .any(|conv| conv.is_group && &conv.name == name)
        {
            debug!(name = %name, "group name matched no conversation; dropped");
        }
    }

    ids
}

/// Resolves channels (passed through unchanged) and group display names
/// (via one directory listing) into a single recipient list.
///
/// The output is channels followed by resolved group ids; no deduplication
/// happens across the two halves, and each element is one delivery attempt.
pub async fn resolve_telegram(
    directory: &dyn Directory,
    channels: &[String],
    group_names: &[String],
) -> Result<Vec<Recipient>> {
    let mut recipients: Vec<Recipient> = channels
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| Recipient::Channel(c.to_string()))
        .collect();

    let wanted: Vec<String> = group_names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    if !wanted.is_empty() {
        let conversations = directory.list_conversations().await?;
        recipients.extend(
            match_groups(&conversations, &wanted)
                .into_iter()
                .map(Recipient::Group),
        );
    }

    Ok(recipients)
}

/// Slack channels are opaque string keys; no lookup needed.
pub fn resolve_slack(channels: &[String]) -> Vec<Recipient> {
    channels
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| Recipient::Channel(c.to_string()))
        .collect()
}

/// Tag-selection mode: the wanted list comes from the contact database,
/// filtered to this backend and the selected categories. Blank contact
/// entries are discarded. Recomputed on every call; tags have no lifecycle
/// of their own.
pub async fn wanted_from_tags(
    lookup: &dyn ContactLookup,
    backend: Backend,
    tags: &[String],
) -> Result<Vec<String>> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    let contacts = lookup.contacts(backend, tags).await?;
    Ok(contacts
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}
