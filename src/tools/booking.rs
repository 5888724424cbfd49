//! Appointment booking
//!
//! Records the hospitals and doctors offered to a user so the presentation layer
//! can let them pick one. One record per user id; later offers replace earlier ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::{CarelineError, Result};
use crate::tools::registry::Tool;

/// Options offered to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub hospitals: Vec<String>,
    pub doctors: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// JSON file of booking records keyed by user id
pub struct BookingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BookingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, BookingRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace the record for `user_id`
    pub async fn upsert(
        &self,
        user_id: &str,
        hospitals: Vec<String>,
        doctors: Vec<String>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut records = self.read_all().await?;
        records.insert(
            user_id.to_string(),
            BookingRecord {
                hospitals,
                doctors,
                updated_at: Utc::now(),
            },
        );

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Get the record for `user_id`
    pub async fn get(&self, user_id: &str) -> Result<Option<BookingRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(user_id))
    }
}

#[derive(Debug, Deserialize)]
struct BookArgs {
    hospitals: Vec<String>,
    doctors: Vec<String>,
    #[serde(default)]
    user_id: String,
}

/// Tool that offers the user a choice of hospitals and doctors
pub struct BookAppointmentTool {
    store: BookingStore,
}

impl BookAppointmentTool {
    pub fn new(store: BookingStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BookingStore {
        &self.store
    }
}

#[async_trait]
impl Tool for BookAppointmentTool {
    fn name(&self) -> &str {
        "book_appointment"
    }

    fn description(&self) -> &str {
        "Gives the user options to select from the list of doctors and hospitals you provide. \
         The user id must be given or the tool will fail."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hospitals": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Hospitals to offer"
                },
                "doctors": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Doctors to offer"
                },
                "user_id": {
                    "type": "string",
                    "description": "Id of the user, from the system context"
                }
            },
            "required": ["hospitals", "doctors", "user_id"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: BookArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;

        if args.user_id.trim().is_empty() {
            return Err(CarelineError::tool("user_id must be given"));
        }

        self.store
            .upsert(&args.user_id, args.hospitals, args.doctors)
            .await?;
        info!(user_id = %args.user_id, "appointment options recorded");

        Ok("User was given options to select from the hospitals and doctors".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_booking_upserts_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BookAppointmentTool::new(BookingStore::new(dir.path().join("bookings.json")));

        tool.invoke(json!({"hospitals": ["A"], "doctors": ["Dr. X"], "user_id": "u1"}))
            .await
            .unwrap();
        tool.invoke(json!({"hospitals": ["B"], "doctors": ["Dr. Y"], "user_id": "u1"}))
            .await
            .unwrap();

        let record = tool.store().get("u1").await.unwrap().unwrap();
        assert_eq!(record.hospitals, vec!["B"]);
        assert_eq!(record.doctors, vec!["Dr. Y"]);
        assert!(tool.store().get("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.json");
        let store = BookingStore::new(path.clone());

        store
            .upsert("u1", vec!["A".to_string()], vec!["Dr. X".to_string()])
            .await
            .unwrap();
        store
            .upsert("u2", vec!["B".to_string()], vec!["Dr. Y".to_string()])
            .await
            .unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let records: HashMap<String, BookingRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records["u1"].doctors, vec!["Dr. X"]);
    }

    #[tokio::test]
    async fn test_missing_user_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BookAppointmentTool::new(BookingStore::new(dir.path().join("bookings.json")));

        let err = tool
            .invoke(json!({"hospitals": ["A"], "doctors": ["Dr. X"]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("user_id"));
    }
}
