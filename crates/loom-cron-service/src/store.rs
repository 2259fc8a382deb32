// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use loom_cron_core::{CronError, CronStore, Result, CURRENT_STORE_VERSION};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Whole-store persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
	/// Read the persisted store. A store that was never written is empty.
	async fn load(&self) -> Result<CronStore>;

	/// Replace the persisted store atomically.
	async fn save(&self, store: &CronStore) -> Result<()>;

	/// Whether something other than this handle has written the store since
	/// it was last loaded or saved here. Stores with a single writer keep the
	/// default.
	async fn changed_externally(&self) -> bool {
		false
	}

	/// Human-readable location for logs.
	fn location(&self) -> String;
}

/// JSON file store. Writes go to a sibling temp file which is then renamed
/// over the target, so readers never observe a partial document.
///
/// The handle remembers the document it last read or wrote so that edits
/// made to the file by other processes can be detected.
pub struct FileJobStore {
	path: PathBuf,
	/// Last contents seen through this handle; `None` when the file was absent.
	last_seen: Mutex<Option<String>>,
}

impl FileJobStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			last_seen: Mutex::new(None),
		}
	}

	/// Store under `$XDG_DATA_HOME/loom/cron/jobs.json`.
	pub fn from_xdg() -> Self {
		let path = loom_cron_config::default_store_path();
		info!(path = %path.display(), "using default cron store");
		Self::new(path)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn tmp_path(&self) -> PathBuf {
		let file_name = self
			.path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "jobs.json".to_string());
		self
			.path
			.with_file_name(format!("{file_name}.{}.tmp", std::process::id()))
	}

	fn corrupt(&self, message: impl Into<String>) -> CronError {
		CronError::StoreCorrupt {
			path: self.path.clone(),
			message: message.into(),
		}
	}

	fn persistence(&self, source: std::io::Error) -> CronError {
		CronError::PersistenceFailure {
			path: self.path.clone(),
			source,
		}
	}
}

#[async_trait]
impl JobStore for FileJobStore {
	async fn load(&self) -> Result<CronStore> {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %self.path.display(), "cron store not found, starting empty");
				*self.last_seen.lock().await = None;
				return Ok(CronStore::new());
			}
			Err(e) => return Err(self.corrupt(format!("unreadable: {e}"))),
		};

		let store: CronStore =
			serde_json::from_str(&contents).map_err(|e| self.corrupt(e.to_string()))?;

		if store.version == 0 || store.version > CURRENT_STORE_VERSION {
			return Err(self.corrupt(format!("unsupported store version {}", store.version)));
		}
		if let Some(id) = store.duplicate_id() {
			return Err(self.corrupt(format!("duplicate job id '{id}'")));
		}

		debug!(
			path = %self.path.display(),
			version = store.version,
			jobs = store.jobs.len(),
			"loaded cron store"
		);
		*self.last_seen.lock().await = Some(contents);
		Ok(store)
	}

	async fn save(&self, store: &CronStore) -> Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| self.persistence(e))?;
		}

		let json = serde_json::to_string_pretty(store)?;
		let tmp_path = self.tmp_path();

		tokio::fs::write(&tmp_path, json.as_bytes())
			.await
			.map_err(|e| self.persistence(e))?;
		if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
			let _ = tokio::fs::remove_file(&tmp_path).await;
			return Err(self.persistence(e));
		}

		debug!(path = %self.path.display(), jobs = store.jobs.len(), "saved cron store");
		*self.last_seen.lock().await = Some(json);
		Ok(())
	}

	async fn changed_externally(&self) -> bool {
		let current = match tokio::fs::read_to_string(&self.path).await {
			Ok(contents) => Some(contents),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
			// Let the next load report it.
			Err(_) => return true,
		};
		*self.last_seen.lock().await != current
	}

	fn location(&self) -> String {
		self.path.display().to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_cron_core::{CronJob, JobState, Payload, RunStatus, Schedule};
	use tempfile::TempDir;

	fn job(id: &str) -> CronJob {
		CronJob {
			id: id.to_string(),
			name: format!("job {id}"),
			enabled: true,
			delete_after_run: false,
			created_at_ms: 1,
			updated_at_ms: 2,
			schedule: Schedule::Every { every_ms: 60_000 },
			session_target: Default::default(),
			wake_mode: Default::default(),
			payload: Payload::agent_turn("hello"),
			delivery: Default::default(),
			state: JobState {
				next_run_at_ms: Some(100),
				last_run_at_ms: Some(40),
				last_status: Some(RunStatus::Ok),
				last_duration_ms: Some(7),
				last_error: None,
			},
		}
	}

	#[tokio::test]
	async fn test_missing_file_loads_empty() {
		let dir = TempDir::new().unwrap();
		let store = FileJobStore::new(dir.path().join("jobs.json"));
		let loaded = store.load().await.unwrap();
		assert_eq!(loaded, CronStore::new());
	}

	#[tokio::test]
	async fn test_save_creates_directories_and_reloads() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("nested").join("cron").join("jobs.json");
		let store = FileJobStore::new(&path);

		let mut data = CronStore::new();
		data.jobs.push(job("a"));
		data.jobs.push(job("b"));
		store.save(&data).await.unwrap();

		assert!(path.exists());
		assert_eq!(store.load().await.unwrap(), data);
	}

	#[tokio::test]
	async fn test_save_leaves_no_temp_file() {
		let dir = TempDir::new().unwrap();
		let store = FileJobStore::new(dir.path().join("jobs.json"));
		store.save(&CronStore::new()).await.unwrap();

		let names: Vec<String> = std::fs::read_dir(dir.path())
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		assert_eq!(names, vec!["jobs.json".to_string()]);
	}

	#[tokio::test]
	async fn test_malformed_file_is_corrupt() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		std::fs::write(&path, "{\"version\": 1, \"jobs\": [").unwrap();

		let err = FileJobStore::new(&path).load().await.unwrap_err();
		assert!(matches!(err, CronError::StoreCorrupt { .. }));
		// The file is left for the operator.
		assert!(path.exists());
	}

	#[tokio::test]
	async fn test_duplicate_ids_are_corrupt() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		let mut data = CronStore::new();
		data.jobs.push(job("same"));
		data.jobs.push(job("same"));
		std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

		let err = FileJobStore::new(&path).load().await.unwrap_err();
		match err {
			CronError::StoreCorrupt { message, .. } => assert!(message.contains("same")),
			other => panic!("expected StoreCorrupt, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_detects_writes_from_other_handles() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		let ours = FileJobStore::new(&path);
		let theirs = FileJobStore::new(&path);

		let mut data = CronStore::new();
		data.jobs.push(job("a"));
		ours.save(&data).await.unwrap();
		assert!(!ours.changed_externally().await);

		data.jobs.push(job("b"));
		theirs.save(&data).await.unwrap();
		assert!(ours.changed_externally().await);

		assert_eq!(ours.load().await.unwrap(), data);
		assert!(!ours.changed_externally().await);

		std::fs::remove_file(&path).unwrap();
		assert!(ours.changed_externally().await);
	}

	#[tokio::test]
	async fn test_failed_load_keeps_previous_snapshot() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		let store = FileJobStore::new(&path);
		store.save(&CronStore::new()).await.unwrap();

		std::fs::write(&path, "garbage").unwrap();
		assert!(store.load().await.is_err());
		assert!(store.changed_externally().await);
	}

	#[tokio::test]
	async fn test_future_version_is_corrupt() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		std::fs::write(&path, r#"{"version": 99, "jobs": []}"#).unwrap();

		let err = FileJobStore::new(&path).load().await.unwrap_err();
		assert!(matches!(err, CronError::StoreCorrupt { .. }));
	}
}
