use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::ChallengeSource;
use crate::error::PracticeError;
use crate::models::{DailyChallenge, Persona};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedChallenge {
    fetched_on: NaiveDate,
    challenge: DailyChallenge,
}

/// File-backed daily challenge cache with one slot per persona. An entry is
/// only served on the local day it was fetched.
#[derive(Debug, Clone)]
pub struct DailyChallengeCache {
    path: PathBuf,
}

impl DailyChallengeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self, persona: Persona, today: NaiveDate) -> Option<DailyChallenge> {
        let entry = self.read().remove(persona.as_str())?;
        if entry.fetched_on != today {
            debug!(persona = persona.as_str(), fetched_on = %entry.fetched_on, "cached challenge expired");
            return None;
        }
        Some(entry.challenge)
    }

    pub fn save(
        &self,
        persona: Persona,
        challenge: &DailyChallenge,
        today: NaiveDate,
    ) -> io::Result<()> {
        let mut entries = self.read();
        entries.insert(
            persona.as_str().to_string(),
            CachedChallenge {
                fetched_on: today,
                challenge: challenge.clone(),
            },
        );

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)
    }

    fn read(&self) -> BTreeMap<String, CachedChallenge> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!(%error, path = %self.path.display(), "ignoring unreadable challenge cache");
            BTreeMap::new()
        })
    }
}

/// Today's challenge for `persona`, from the cache when it was fetched today.
/// A failed cache write is logged and does not fail the lookup.
pub async fn daily_challenge<S: ChallengeSource>(
    source: &S,
    cache: &DailyChallengeCache,
    persona: Persona,
    today: NaiveDate,
) -> Result<DailyChallenge, PracticeError> {
    if let Some(challenge) = cache.load(persona, today) {
        debug!(persona = persona.as_str(), "daily challenge served from cache");
        return Ok(challenge);
    }

    let challenge = source.fetch_daily_challenge(persona).await?;
    if let Err(error) = cache.save(persona, &challenge, today) {
        warn!(%error, "failed to cache daily challenge");
    }
    Ok(challenge)
}
