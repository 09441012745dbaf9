//! Campaign job processor: walks a contact list, one send at a time, with
//! pause/resume/stop control from other tasks.
//!
//! At most one job is active. Control operations flip a `watch` value the
//! worker awaits on, so a paused worker sleeps until resumed or stopped and a
//! pacing delay is cut short by `stop()`.

mod worker;

#[cfg(test)]
mod tests;

use crate::{lock, reporter::Reporter, session::SessionManager};
use herald_core::{
    config::SessionLossPolicy,
    error::HeraldError,
    event::SessionStatus,
    job::{Job, JobStatus, ProgressSnapshot},
    phone::PhoneNormalizer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;
use worker::Worker;

/// Control value shared between the processor and its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Run,
    Pause,
    Stop,
}

/// The job holding the active slot.
struct ActiveJob {
    job_id: String,
    control: Arc<watch::Sender<Control>>,
    progress: Arc<Mutex<ProgressSnapshot>>,
}

/// Drives one campaign job at a time.
pub struct JobProcessor {
    session: Arc<SessionManager>,
    reporter: Reporter,
    normalizer: PhoneNormalizer,
    policy: SessionLossPolicy,
    rng: Arc<Mutex<StdRng>>,
    slot: Arc<Mutex<Option<ActiveJob>>>,
    /// Final snapshot of the most recent finished job.
    last: Arc<Mutex<Option<ProgressSnapshot>>>,
}

impl JobProcessor {
    pub fn new(
        session: Arc<SessionManager>,
        reporter: Reporter,
        normalizer: PhoneNormalizer,
        policy: SessionLossPolicy,
    ) -> Self {
        Self {
            session,
            reporter,
            normalizer,
            policy,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            slot: Arc::new(Mutex::new(None)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the random source used for variant and delay selection.
    pub fn with_rng(self, rng: StdRng) -> Self {
        *lock(&self.rng) = rng;
        self
    }

    /// Accept a job and start processing it in the background.
    ///
    /// Returns the job id once the worker is spawned; progress arrives as
    /// `job-progress` events. An empty `job_id` gets a generated one.
    pub fn start(&self, mut job: Job) -> Result<String, HeraldError> {
        let mut slot = lock(&self.slot);
        if let Some(active) = slot.as_ref() {
            return Err(HeraldError::AlreadyProcessing(active.job_id.clone()));
        }
        job.validate()?;
        let status = self.session.status();
        if status != SessionStatus::Ready {
            return Err(HeraldError::NotReady(status));
        }
        if job.job_id.is_empty() {
            job.job_id = uuid::Uuid::new_v4().to_string();
        }

        let mut snapshot = ProgressSnapshot::new(&job.job_id, job.contacts.len());
        snapshot.status = JobStatus::Processing;
        let progress = Arc::new(Mutex::new(snapshot));
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let control = Arc::new(control_tx);

        *slot = Some(ActiveJob {
            job_id: job.job_id.clone(),
            control: control.clone(),
            progress: progress.clone(),
        });
        drop(slot);

        info!(
            "job {} accepted: {} contacts, pacing {}-{}ms, attachment: {}",
            job.job_id,
            job.contacts.len(),
            job.pacing.min_delay_ms,
            job.pacing.max_delay_ms,
            job.attachment.as_deref().unwrap_or("none"),
        );

        let job_id = job.job_id.clone();
        let worker = Worker {
            job,
            session: self.session.clone(),
            reporter: self.reporter.clone(),
            normalizer: self.normalizer.clone(),
            policy: self.policy,
            rng: self.rng.clone(),
            control,
            control_rx,
            progress,
            slot: self.slot.clone(),
            last: self.last.clone(),
        };
        tokio::spawn(worker.run());

        Ok(job_id)
    }

    /// Pause the processing job after its in-flight item. False if no job is processing.
    pub fn pause(&self) -> bool {
        self.switch(Control::Run, Control::Pause, JobStatus::Paused)
    }

    /// Resume a paused job. False if no job is paused.
    pub fn resume(&self) -> bool {
        self.switch(Control::Pause, Control::Run, JobStatus::Processing)
    }

    /// Stop the active job after its in-flight item. The job still finishes
    /// as Completed with the counts reached so far. False if no job is active;
    /// repeating it while the job winds down still succeeds.
    pub fn stop(&self) -> bool {
        let slot = lock(&self.slot);
        let Some(active) = slot.as_ref() else {
            return false;
        };
        let requested = active.control.send_if_modified(|c| {
            if *c == Control::Stop {
                return false;
            }
            *c = Control::Stop;
            true
        });
        if requested {
            info!("job {}: stop requested", active.job_id);
        }
        true
    }

    fn switch(&self, from: Control, to: Control, status: JobStatus) -> bool {
        let slot = lock(&self.slot);
        let Some(active) = slot.as_ref() else {
            return false;
        };
        let switched = active.control.send_if_modified(|c| {
            if *c != from {
                return false;
            }
            *c = to;
            true
        });
        if switched {
            lock(&active.progress).status = status;
            info!("job {}: {:?} -> {:?}", active.job_id, from, to);
        }
        switched
    }

    /// Id of the job holding the active slot.
    pub fn active_job_id(&self) -> Option<String> {
        lock(&self.slot).as_ref().map(|a| a.job_id.clone())
    }

    /// Progress of the active job, or the final snapshot of the last one.
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let active = lock(&self.slot)
            .as_ref()
            .map(|a| lock(&a.progress).clone());
        active.or_else(|| lock(&self.last).clone())
    }
}
