//! The per-job background loop.

use super::{ActiveJob, Control};
use crate::{lock, reporter::Reporter, session::SessionManager};
use herald_core::{
    config::SessionLossPolicy,
    error::HeraldError,
    event::{Event, JobErrorDetail, SessionStatus},
    job::{Contact, Job, JobStatus, ProgressSnapshot},
    phone::PhoneNormalizer,
    template,
};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub(super) struct Worker {
    pub(super) job: Job,
    pub(super) session: Arc<SessionManager>,
    pub(super) reporter: Reporter,
    pub(super) normalizer: PhoneNormalizer,
    pub(super) policy: SessionLossPolicy,
    pub(super) rng: Arc<Mutex<StdRng>>,
    pub(super) control: Arc<watch::Sender<Control>>,
    pub(super) control_rx: watch::Receiver<Control>,
    pub(super) progress: Arc<Mutex<ProgressSnapshot>>,
    pub(super) slot: Arc<Mutex<Option<ActiveJob>>>,
    pub(super) last: Arc<Mutex<Option<ProgressSnapshot>>>,
}

impl Worker {
    pub(super) async fn run(mut self) {
        let contacts = std::mem::take(&mut self.job.contacts);
        let total = contacts.len();

        for (index, contact) in contacts.iter().enumerate() {
            if !self.wait_until_runnable().await {
                info!("job {}: stopped before contact {}", self.job.job_id, index + 1);
                break;
            }

            self.process(contact).await;

            if index + 1 < total && !self.pace().await {
                info!("job {}: stopped during pacing delay", self.job.job_id);
                break;
            }
        }

        self.finish().await;
    }

    /// Block while paused. Returns false once the job is stopped.
    async fn wait_until_runnable(&mut self) -> bool {
        loop {
            let control = *self.control_rx.borrow_and_update();
            match control {
                Control::Stop => return false,
                Control::Pause => {
                    debug!("job {}: paused", self.job.job_id);
                    if self.control_rx.changed().await.is_err() {
                        return false;
                    }
                }
                Control::Run => {
                    let status = self.session.status();
                    if self.policy == SessionLossPolicy::Pause && status != SessionStatus::Ready {
                        self.pause_for_session_loss(status);
                        continue;
                    }
                    return true;
                }
            }
        }
    }

    fn pause_for_session_loss(&self, status: SessionStatus) {
        let paused = self.control.send_if_modified(|c| {
            if *c != Control::Run {
                return false;
            }
            *c = Control::Pause;
            true
        });
        if paused {
            lock(&self.progress).status = JobStatus::Paused;
            warn!(
                "job {}: session is {status}, pausing until resumed",
                self.job.job_id
            );
        }
    }

    /// Render, address, and deliver one contact, then report it.
    async fn process(&self, contact: &Contact) {
        let content = {
            let mut rng = lock(&self.rng);
            template::render(&self.job.template, contact, &mut *rng)
        };

        let result = self.deliver(contact, &content).await;

        let snapshot = {
            let mut progress = lock(&self.progress);
            match result {
                Ok(()) => progress.record_success(),
                Err(_) => progress.record_failure(),
            }
            progress.clone()
        };

        if let Err(e) = result {
            warn!("job {}: send to {} failed: {e}", self.job.job_id, contact.phone);
            self.reporter
                .emit(Event::JobErrorDetail(JobErrorDetail {
                    job_id: self.job.job_id.clone(),
                    phone: contact.phone.clone(),
                    error: e.to_string(),
                }))
                .await;
        }

        debug!(
            "job {}: {}/{} processed ({} ok, {} failed)",
            snapshot.job_id, snapshot.processed, snapshot.total, snapshot.success, snapshot.failed
        );
        self.reporter.emit(Event::JobProgress(snapshot)).await;
    }

    async fn deliver(&self, contact: &Contact, content: &str) -> Result<(), HeraldError> {
        let address = self.normalizer.normalize(&contact.phone)?;
        match self.job.attachment.as_deref() {
            Some(source) => self.session.send_media(&address, content, source).await,
            None => self.session.send_text(&address, content).await,
        }
    }

    /// Sleep a random pacing delay. Returns false if stopped meanwhile.
    async fn pace(&mut self) -> bool {
        let pacing = self.job.pacing;
        let delay = lock(&self.rng).gen_range(pacing.min_delay_ms..=pacing.max_delay_ms);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay)) => true,
            _ = self.control_rx.wait_for(|c| *c == Control::Stop) => false,
        }
    }

    async fn finish(self) {
        let snapshot = {
            let mut progress = lock(&self.progress);
            progress.status = JobStatus::Completed;
            progress.clone()
        };

        *lock(&self.last) = Some(snapshot.clone());
        {
            let mut slot = lock(&self.slot);
            if slot.as_ref().is_some_and(|a| a.job_id == snapshot.job_id) {
                *slot = None;
            }
        }

        info!(
            "job {} completed: {}/{} processed, {} sent, {} failed",
            snapshot.job_id, snapshot.processed, snapshot.total, snapshot.success, snapshot.failed
        );
        self.reporter.emit(Event::JobProgress(snapshot)).await;
    }
}
