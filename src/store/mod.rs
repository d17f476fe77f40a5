pub mod seed;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::llm::retry::RetryPolicy;
use crate::model::{RiskAssessment, StartupCandidate};
use types::{startup_id, AssessmentRecord, CuratedStartup, SectorRecord, StartupRecord};

// Key prefixes (no trailing slashes, cnidarium convention)
const SECTOR_PREFIX: &str = "sector";
const STARTUP_PREFIX: &str = "startup";
const ASSESSMENT_PREFIX: &str = "assessment";

fn sector_key(name: &str) -> String {
    format!("{}/{}", SECTOR_PREFIX, name)
}
fn startup_key(id: &str) -> String {
    format!("{}/{}", STARTUP_PREFIX, id)
}
fn assessment_key(startup_id: &str) -> String {
    format!("{}/{}", ASSESSMENT_PREFIX, startup_id)
}

/// Persisted sectors, startups and their latest assessments.
pub struct DealStore {
    storage: Storage,
}

impl DealStore {
    /// Open the store, retrying with `policy` before giving up.
    pub async fn open(data_dir: &Path, policy: &RetryPolicy) -> Result<Self> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::load(data_dir).await {
                Ok(store) => return Ok(store),
                Err(e) if attempt < max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to open deal store: {:#}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "deal store unavailable after {} attempts",
                        attempt
                    )))
                }
            }
        }
    }

    async fn load(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {:?}", data_dir))?;
        let prefixes = vec![
            SECTOR_PREFIX.to_string(),
            STARTUP_PREFIX.to_string(),
            ASSESSMENT_PREFIX.to_string(),
        ];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }

    /// Insert the default sectors and demo startups. Existing rows are left untouched.
    pub async fn seed(&self) -> Result<usize> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot.clone());
        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0;

        for name in seed::SECTORS {
            let key = sector_key(name);
            if snapshot.get_raw(&key).await?.is_none() {
                let record = SectorRecord {
                    name: name.to_string(),
                    created_at: now,
                };
                delta.put_raw(key, serde_json::to_vec(&record).context("serialize sector")?);
                debug!(sector = name, "Seeded sector");
                inserted += 1;
            }
        }

        for startup in seed::STARTUPS {
            let record = startup.record(now);
            let key = startup_key(&record.id);
            if snapshot.get_raw(&key).await?.is_none() {
                delta.put_raw(key, serde_json::to_vec(&record).context("serialize startup")?);
                debug!(startup = %record.name, "Seeded startup");
                inserted += 1;
            }
        }

        self.storage.commit(delta).await?;
        info!(inserted, "Deal store seeding complete");
        Ok(inserted)
    }

    pub async fn sectors(&self) -> Result<Vec<SectorRecord>> {
        let mut sectors: Vec<SectorRecord> = self.scan(SECTOR_PREFIX).await;
        sectors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sectors)
    }

    pub async fn startups_by_sector(
        &self,
        sector: &str,
        sub_sector: &str,
    ) -> Result<Vec<StartupRecord>> {
        let mut startups: Vec<StartupRecord> = self
            .scan::<StartupRecord>(STARTUP_PREFIX)
            .await
            .into_iter()
            .filter(|s| {
                s.sector.eq_ignore_ascii_case(sector) && s.sub_sector.eq_ignore_ascii_case(sub_sector)
            })
            .collect();
        startups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(startups)
    }

    pub async fn get_startup(&self, name: &str) -> Result<Option<StartupRecord>> {
        self.get(&startup_key(&startup_id(name))).await
    }

    pub async fn get_assessment(&self, startup_name: &str) -> Result<Option<AssessmentRecord>> {
        self.get(&assessment_key(&startup_id(startup_name))).await
    }

    /// Upsert a batch of discovered startups in one commit.
    pub async fn save_startups(
        &self,
        sector: &str,
        sub_sector: &str,
        candidates: &[StartupCandidate],
    ) -> Result<()> {
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        for candidate in candidates {
            let record = StartupRecord::from_candidate(candidate, sector, sub_sector);
            delta.put_raw(
                startup_key(&record.id),
                serde_json::to_vec(&record).context("serialize startup")?,
            );
        }
        self.storage.commit(delta).await?;
        debug!(sector, sub_sector, count = candidates.len(), "startups saved");
        Ok(())
    }

    /// Upsert the latest assessment of each startup in one commit.
    pub async fn save_assessments<'a>(
        &self,
        assessments: impl IntoIterator<Item = &'a RiskAssessment>,
    ) -> Result<usize> {
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        let now = chrono::Utc::now().timestamp();
        let mut count = 0;
        for assessment in assessments {
            let record = AssessmentRecord {
                startup_id: startup_id(&assessment.startup_name),
                risk_score: assessment.overall_score,
                comments: assessment.summary.clone(),
                assessed_at: now,
            };
            delta.put_raw(
                assessment_key(&record.startup_id),
                serde_json::to_vec(&record).context("serialize assessment")?,
            );
            count += 1;
        }
        self.storage.commit(delta).await?;
        debug!(count, "assessments saved");
        Ok(count)
    }

    /// Assessed startups, highest risk score first. Unscored assessments sort last.
    pub async fn curated(&self, limit: usize) -> Result<Vec<CuratedStartup>> {
        let assessments: Vec<AssessmentRecord> = self.scan(ASSESSMENT_PREFIX).await;
        let mut results = Vec::with_capacity(assessments.len());
        for assessment in assessments {
            match self
                .get::<StartupRecord>(&startup_key(&assessment.startup_id))
                .await?
            {
                Some(startup) => results.push(CuratedStartup {
                    startup,
                    assessment,
                }),
                None => warn!(startup_id = %assessment.startup_id, "Assessment without startup row"),
            }
        }

        results.sort_by(|a, b| match (a.assessment.risk_score, b.assessment.risk_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.startup.name.cmp(&b.startup.name),
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let snapshot = self.storage.latest_snapshot();
        match snapshot.get_raw(key).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).with_context(|| format!("decode {}", key))?,
            )),
            None => Ok(None),
        }
    }

    /// Decode every record under `prefix`, skipping entries that fail to read or decode.
    async fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Vec<T> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = snapshot.prefix_raw(prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => match serde_json::from_slice::<T>(&value) {
                    Ok(record) => results.push(record),
                    Err(e) => warn!("Skipping undecodable record {}: {}", key, e),
                },
                Err(e) => {
                    warn!("Error reading {} stream: {}", prefix, e);
                }
            }
        }
        results
    }
}
