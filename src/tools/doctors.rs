//! Doctor directory lookup
//!
//! Finds doctors of a given specialty, optionally restricted to specific hospitals.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::core::config::DoctorEntry;
use crate::core::{CarelineError, Result};
use crate::tools::registry::Tool;

#[derive(Debug, Deserialize)]
struct DoctorArgs {
    doctor_field: String,
    #[serde(default)]
    hospital_names: Vec<String>,
}

/// Tool backed by a static specialty → doctors directory
pub struct DoctorDirectoryTool {
    directory: HashMap<String, Vec<DoctorEntry>>,
}

impl DoctorDirectoryTool {
    pub fn new(directory: HashMap<String, Vec<DoctorEntry>>) -> Self {
        // Lookups are case-insensitive
        let directory = directory
            .into_iter()
            .map(|(field, doctors)| (field.to_lowercase(), doctors))
            .collect();
        Self { directory }
    }

    fn lookup(&self, field: &str, hospitals: &[String]) -> Vec<&DoctorEntry> {
        let Some(doctors) = self.directory.get(&field.trim().to_lowercase()) else {
            return Vec::new();
        };

        let wanted: Vec<String> = hospitals.iter().map(|h| h.to_lowercase()).collect();
        doctors
            .iter()
            .filter(|d| {
                wanted.is_empty() || {
                    let hospital = d.hospital.to_lowercase();
                    wanted
                        .iter()
                        .any(|w| hospital.contains(w.as_str()) || w.contains(hospital.as_str()))
                }
            })
            .collect()
    }
}

#[async_trait]
impl Tool for DoctorDirectoryTool {
    fn name(&self) -> &str {
        "get_doctors_information"
    }

    fn description(&self) -> &str {
        "Find the relevant doctors to visit, with their time slots, once you know the hospitals"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "doctor_field": {
                    "type": "string",
                    "description": "Type of doctor required by the patient, like Neurologist, ENT, Dentist etc."
                },
                "hospital_names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Hospitals to search for the user"
                }
            },
            "required": ["doctor_field", "hospital_names"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: DoctorArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;

        let found = self.lookup(&args.doctor_field, &args.hospital_names);
        if found.is_empty() {
            return Ok(format!(
                "No {} doctors found at the given hospitals",
                args.doctor_field
            ));
        }

        Ok(found
            .iter()
            .map(|d| format!("{} ({}), time slots: {}", d.name, d.hospital, d.time_slots))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
