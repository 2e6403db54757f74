use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical numeric identity of an agent, shared with the upstream CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

/// Stored agent record
///
/// This is the persisted shape; the bonus schedule lives in separate keys and is joined into an
/// [`Agent`] when a roster is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub user_id: AgentId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub group_id: Option<u64>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub personal_sound_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusTier {
    pub deals_required: u32,
    pub bonus_per_deal: Decimal,
}

/// Tier schedule for one campaign assigned to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAssignment {
    pub campaign_name: String,
    #[serde(default)]
    pub bonus_tiers: Vec<BonusTier>,
}

/// Media url update for one agent.
///
/// An absent field leaves the stored url alone and a blank one clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMedia {
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub personal_sound_url: Option<String>,
}

/// Roster entry: an agent joined with its bonus assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub user_id: AgentId,
    pub name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub personal_sound_url: Option<String>,
    #[serde(default)]
    pub bonus_assignments: Vec<CampaignAssignment>,
}

impl AgentRecord {
    /// Keeps media urls from `existing` where this record has none, so a roster sync never wipes
    /// uploaded images or sounds.
    pub fn merge_media(mut self, existing: &AgentRecord) -> Self {
        if self.profile_image_url.is_none() {
            self.profile_image_url = existing.profile_image_url.clone();
        }

        if self.personal_sound_url.is_none() {
            self.personal_sound_url = existing.personal_sound_url.clone();
        }

        self
    }

    pub fn apply_media(mut self, media: &AgentMedia) -> Self {
        fn apply(current: &mut Option<String>, update: &Option<String>) {
            if let Some(url) = update {
                let url = url.trim();
                *current = (!url.is_empty()).then(|| url.to_string());
            }
        }

        apply(&mut self.profile_image_url, &media.profile_image_url);
        apply(&mut self.personal_sound_url, &media.personal_sound_url);
        self
    }

    pub fn into_agent(self, bonus_assignments: Vec<CampaignAssignment>) -> Agent {
        Agent {
            user_id: self.user_id,
            name: self.name,
            profile_image_url: self.profile_image_url,
            personal_sound_url: self.personal_sound_url,
            bonus_assignments,
        }
    }
}

impl From<u64> for AgentId {
    fn from(value: u64) -> Self {
        AgentId(value)
    }
}

impl FromStr for AgentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(AgentId)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(image: Option<&str>, sound: Option<&str>) -> AgentRecord {
        AgentRecord {
            user_id: AgentId(7),
            name: String::from("Nok"),
            email: None,
            group_id: Some(2),
            profile_image_url: image.map(str::to_string),
            personal_sound_url: sound.map(str::to_string),
        }
    }

    #[test]
    fn test_merge_media_keeps_existing_urls() {
        let existing = record(Some("https://img/7.png"), Some("https://snd/7.mp3"));
        let synced = record(None, None).merge_media(&existing);

        assert_eq!(synced.profile_image_url.as_deref(), Some("https://img/7.png"));
        assert_eq!(synced.personal_sound_url.as_deref(), Some("https://snd/7.mp3"));

        let replaced = record(Some("https://img/new.png"), None).merge_media(&existing);
        assert_eq!(replaced.profile_image_url.as_deref(), Some("https://img/new.png"));
    }

    #[test]
    fn test_apply_media() {
        let stored = record(Some("https://img/7.png"), Some("https://snd/7.mp3"));

        let untouched = stored.clone().apply_media(&AgentMedia::default());
        assert_eq!(untouched, stored);

        let media: AgentMedia =
            serde_json::from_str(r#"{ "profileImageUrl": " https://img/8.png ", "personalSoundUrl": "" }"#)
                .unwrap();
        let updated = stored.clone().apply_media(&media);
        assert_eq!(updated.profile_image_url.as_deref(), Some("https://img/8.png"));
        assert_eq!(updated.personal_sound_url, None);

        let sound_only: AgentMedia =
            serde_json::from_str(r#"{ "personalSoundUrl": "https://snd/new.mp3" }"#).unwrap();
        let updated = stored.apply_media(&sound_only);
        assert_eq!(updated.profile_image_url.as_deref(), Some("https://img/7.png"));
        assert_eq!(updated.personal_sound_url.as_deref(), Some("https://snd/new.mp3"));
    }

    #[test]
    fn test_agent_id_parse() {
        assert_eq!(" 42".parse::<AgentId>().unwrap(), AgentId(42));
        assert!("abc".parse::<AgentId>().is_err());
    }
}
