//! Campaign data model: contacts, templates, jobs, and progress.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::HeraldError;

/// Minimum number of non-empty variants a template needs for campaign use.
pub const MIN_VARIANTS: usize = 3;

/// One recipient of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Extra `{{key}}` substitutions for this contact.
    #[serde(default)]
    pub extra_fields: HashMap<String, String>,
}

impl Contact {
    pub fn new(phone: &str, name: &str) -> Self {
        Self {
            phone: phone.to_string(),
            name: name.to_string(),
            extra_fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.extra_fields.insert(key.to_string(), value.to_string());
        self
    }
}

/// Message template with interchangeable variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Body used when the template has no variants.
    #[serde(default)]
    pub static_content: String,
    #[serde(default)]
    pub variants: Vec<String>,
}

impl Template {
    /// Build a template, rejecting one with fewer than [`MIN_VARIANTS`] usable variants.
    pub fn new(static_content: &str, variants: Vec<String>) -> Result<Self, HeraldError> {
        let template = Self {
            static_content: static_content.to_string(),
            variants,
        };
        template.validate()?;
        Ok(template)
    }

    /// Variants that are not blank.
    pub fn usable_variants(&self) -> Vec<&str> {
        self.variants
            .iter()
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), HeraldError> {
        let usable = self.usable_variants().len();
        if usable < MIN_VARIANTS {
            return Err(HeraldError::InvalidJob(format!(
                "template needs at least {MIN_VARIANTS} non-empty variants, got {usable}"
            )));
        }
        Ok(())
    }
}

/// Inclusive range for the randomized delay between two sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pacing {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Pacing {
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            min_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
        }
    }
}

/// One bulk-send campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub contacts: Vec<Contact>,
    pub template: Template,
    /// Local path or http(s) URL sent with every message.
    pub attachment: Option<String>,
    pub pacing: Pacing,
}

impl Job {
    /// Check everything that can be rejected before any send happens.
    pub fn validate(&self) -> Result<(), HeraldError> {
        if self.contacts.is_empty() {
            return Err(HeraldError::InvalidJob("contact list is empty".into()));
        }
        self.template.validate()?;
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(HeraldError::InvalidJob(format!(
                "minDelayMs ({}) is greater than maxDelayMs ({})",
                self.pacing.min_delay_ms, self.pacing.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Job as it arrives on the command surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub template: Template,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub pacing: Option<Pacing>,
}

impl JobRequest {
    /// Turn the request into a [`Job`]. Only the first attachment is kept.
    ///
    /// Validation is left to [`Job::validate`] so the processor reports it
    /// together with its other start preconditions.
    pub fn into_job(self, default_pacing: Pacing) -> Job {
        if self.attachments.len() > 1 {
            tracing::debug!(
                "job {}: ignoring {} extra attachment(s)",
                self.job_id,
                self.attachments.len() - 1
            );
        }
        Job {
            job_id: self.job_id,
            contacts: self.contacts,
            template: self.template,
            attachment: self.attachments.into_iter().next(),
            pacing: self.pacing.unwrap_or(default_pacing),
        }
    }
}

/// Lifecycle status reported in a [`ProgressSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
}

/// Counters for one job. `processed == success + failed` at every emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub processed: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub status: JobStatus,
}

impl ProgressSnapshot {
    pub fn new(job_id: &str, total: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            processed: 0,
            total,
            success: 0,
            failed: 0,
            status: JobStatus::Pending,
        }
    }

    pub fn record_success(&mut self) {
        self.success += 1;
        self.processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        self.processed += 1;
    }
}
