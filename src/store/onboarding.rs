//! First-launch flag.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::storage::{self, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnboardingRecord {
    is_first_launch: bool,
}

pub struct OnboardingStore {
    is_first_launch: Mutex<bool>,
    storage: Arc<dyn KeyValueStore>,
}

impl OnboardingStore {
    /// Load the persisted flag; defaults to first launch
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let record: Option<OnboardingRecord> =
            storage::load_json(storage.as_ref(), config::ONBOARDING_STORAGE_KEY).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable onboarding record: {}", e);
                None
            });

        Self {
            is_first_launch: Mutex::new(record.map_or(true, |r| r.is_first_launch)),
            storage,
        }
    }

    pub fn is_first_launch(&self) -> bool {
        *self.is_first_launch.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn complete_onboarding(&self) {
        self.set(false);
    }

    pub fn reset_onboarding(&self) {
        self.set(true);
    }

    fn set(&self, is_first_launch: bool) {
        let mut flag = self.is_first_launch.lock().unwrap_or_else(|e| e.into_inner());
        *flag = is_first_launch;
        let record = OnboardingRecord { is_first_launch };
        if let Err(e) = storage::save_json(self.storage.as_ref(), config::ONBOARDING_STORAGE_KEY, &record) {
            log::error!("Failed to persist onboarding flag: {}", e);
        }
    }
}
