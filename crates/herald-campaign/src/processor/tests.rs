use super::JobProcessor;
use crate::reporter::Reporter;
use crate::session::SessionManager;
use crate::testing::*;
use herald_core::config::SessionLossPolicy;
use herald_core::error::HeraldError;
use herald_core::event::{Event, JobErrorDetail, SessionStatus};
use herald_core::job::{Contact, Job, JobRequest, JobStatus, Pacing, ProgressSnapshot, Template};
use herald_core::phone::PhoneNormalizer;
use herald_core::traits::TransportEvent;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const VARIANTS: [&str; 3] = ["Hi {{name}}", "Hello {{name}}", "Hey {{name}}"];

fn contacts(n: usize) -> Vec<Contact> {
    (1..=n)
        .map(|i| Contact::new(&format!("08120000000{i}"), &format!("Contact {i}")))
        .collect()
}

fn address(phone: &str) -> String {
    PhoneNormalizer::default().normalize(phone).unwrap()
}

fn job(id: &str, n: usize, pacing: Pacing) -> Job {
    Job {
        job_id: id.to_string(),
        contacts: contacts(n),
        template: Template {
            static_content: String::new(),
            variants: VARIANTS.iter().map(|s| s.to_string()).collect(),
        },
        attachment: None,
        pacing,
    }
}

async fn ready_processor(
    transport: Arc<FakeTransport>,
    policy: SessionLossPolicy,
) -> (Arc<SessionManager>, JobProcessor, mpsc::Receiver<Event>) {
    let (reporter, rx) = Reporter::channel(1024);
    let session = Arc::new(SessionManager::new(transport, reporter.clone()));
    session.connect().await.unwrap();
    wait_for_status(&session, SessionStatus::Ready).await;
    let processor = JobProcessor::new(session.clone(), reporter, PhoneNormalizer::default(), policy)
        .with_rng(StdRng::seed_from_u64(42));
    (session, processor, rx)
}

/// Collect events until the job's final snapshot arrives.
async fn run_to_completion(rx: &mut mpsc::Receiver<Event>, job_id: &str) -> (ProgressSnapshot, Vec<Event>) {
    let mut seen = Vec::new();
    let final_snapshot = tokio::time::timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            let done = matches!(
                &event,
                Event::JobProgress(s) if s.job_id == job_id && s.status == JobStatus::Completed
            );
            seen.push(event.clone());
            if done {
                if let Event::JobProgress(s) = event {
                    return s;
                }
            }
        }
        panic!("event channel closed");
    })
    .await
    .expect("job did not complete");
    (final_snapshot, seen)
}

async fn wait_processed(rx: &mut mpsc::Receiver<Event>, processed: usize) {
    next_matching(rx, |e| matches!(e, Event::JobProgress(s) if s.processed == processed)).await;
}

fn progress_events(events: &[Event]) -> Vec<ProgressSnapshot> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobProgress(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn error_details(events: &[Event]) -> Vec<JobErrorDetail> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobErrorDetail(d) => Some(d.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_all_contacts_succeed() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    let id = processor.start(job("five", 5, Pacing::fixed(0))).unwrap();
    assert_eq!(id, "five");
    let (last, events) = run_to_completion(&mut rx, "five").await;

    assert_eq!(
        (last.processed, last.success, last.failed, last.status),
        (5, 5, 0, JobStatus::Completed)
    );

    let progress = progress_events(&events);
    let per_item: Vec<usize> = progress[..progress.len() - 1].iter().map(|s| s.processed).collect();
    assert_eq!(per_item, vec![1, 2, 3, 4, 5], "one snapshot per contact, in order");
    for snap in &progress {
        assert_eq!(snap.processed, snap.success + snap.failed);
        assert!(snap.processed <= snap.total);
    }

    let sent = transport.sent();
    assert_eq!(sent.len(), 5);
    for (i, s) in sent.iter().enumerate() {
        let contact = &contacts(5)[i];
        assert_eq!(s.address, address(&contact.phone), "list order preserved");
        assert!(
            VARIANTS
                .iter()
                .any(|v| s.content == v.replace("{{name}}", &contact.name)),
            "unexpected content {:?}",
            s.content
        );
    }
}

#[tokio::test]
async fn test_failed_contact_does_not_abort_job() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;
    let job = job("three", 3, Pacing::fixed(0));
    let failing_phone = job.contacts[1].phone.clone();
    transport.fail_for(&address(&failing_phone));

    processor.start(job).unwrap();
    let (last, events) = run_to_completion(&mut rx, "three").await;

    assert_eq!((last.processed, last.success, last.failed), (3, 2, 1));
    let details = error_details(&events);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].phone, failing_phone);
    assert_eq!(details[0].job_id, "three");
    assert!(details[0].error.contains("simulated failure"));
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn test_invalid_phone_counts_as_failure() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;
    let mut job = job("bad-phone", 2, Pacing::fixed(0));
    job.contacts[0].phone = "unknown".into();

    processor.start(job).unwrap();
    let (last, events) = run_to_completion(&mut rx, "bad-phone").await;
    assert_eq!((last.processed, last.success, last.failed), (2, 1, 1));
    assert_eq!(error_details(&events)[0].phone, "unknown");
}

#[tokio::test]
async fn test_start_rejects_invalid_jobs() {
    let transport = FakeTransport::paired();
    let (_session, processor, _rx) = ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    let empty = job("empty", 0, Pacing::fixed(0));
    assert!(matches!(processor.start(empty), Err(HeraldError::InvalidJob(_))));

    let mut two_variants = job("two", 2, Pacing::fixed(0));
    two_variants.template.variants.pop();
    assert!(matches!(processor.start(two_variants), Err(HeraldError::InvalidJob(_))));

    assert!(processor.active_job_id().is_none());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_start_requires_ready_session() {
    let (reporter, _rx) = Reporter::channel(16);
    let session = Arc::new(SessionManager::new(FakeTransport::unpaired(), reporter.clone()));
    let processor = JobProcessor::new(
        session,
        reporter,
        PhoneNormalizer::default(),
        SessionLossPolicy::Pause,
    );
    let err = processor.start(job("early", 1, Pacing::fixed(0))).unwrap_err();
    assert!(matches!(err, HeraldError::NotReady(SessionStatus::Uninitialized)));
}

#[tokio::test]
async fn test_second_job_rejected_while_active() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("first", 3, Pacing::fixed(200))).unwrap();
    wait_processed(&mut rx, 1).await;
    let before = processor.snapshot().unwrap();

    let err = processor.start(job("second", 2, Pacing::fixed(0))).unwrap_err();
    assert!(matches!(err, HeraldError::AlreadyProcessing(ref id) if id == "first"));
    assert_eq!(processor.snapshot().unwrap(), before, "first job untouched");

    assert!(processor.pause());
    let err = processor.start(job("second", 2, Pacing::fixed(0))).unwrap_err();
    assert!(matches!(err, HeraldError::AlreadyProcessing(_)));
    assert_eq!(processor.active_job_id().as_deref(), Some("first"));

    assert!(processor.stop());
    run_to_completion(&mut rx, "first").await;
    assert!(transport.sent().iter().all(|s| !s.content.is_empty()));
}

#[tokio::test]
async fn test_stop_during_pacing_halts_early() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("stoppable", 5, Pacing::fixed(2_000))).unwrap();
    wait_processed(&mut rx, 2).await;

    let stopped_at = Instant::now();
    assert!(processor.stop());
    assert!(processor.stop(), "repeated stop on a stopping job still succeeds");
    assert!(!processor.pause(), "a stopping job cannot be paused");
    let (last, _) = run_to_completion(&mut rx, "stoppable").await;

    assert!(
        stopped_at.elapsed() < Duration::from_millis(1_000),
        "stop must cut the pacing delay short"
    );
    assert_eq!(last.processed, 2);
    assert_eq!(last.total, 5);
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(transport.sent().len(), 2);
    assert!(processor.active_job_id().is_none());
}

#[tokio::test]
async fn test_stop_while_paused() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("paused-stop", 4, Pacing::fixed(100))).unwrap();
    wait_processed(&mut rx, 1).await;
    assert!(processor.pause());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(processor.stop());

    let (last, _) = run_to_completion(&mut rx, "paused-stop").await;
    assert_eq!(last.processed, 1);
    assert_eq!(last.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_pause_blocks_until_resume() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("pausable", 4, Pacing::fixed(100))).unwrap();
    wait_processed(&mut rx, 1).await;

    assert!(processor.pause());
    assert!(!processor.pause(), "already paused");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snap = processor.snapshot().unwrap();
    assert_eq!(snap.status, JobStatus::Paused);
    assert_eq!(snap.processed, 1, "no contact processed while paused");
    assert_eq!(transport.sent().len(), 1);

    assert!(processor.resume());
    assert!(!processor.resume(), "already running");
    let (last, _) = run_to_completion(&mut rx, "pausable").await;
    assert_eq!((last.processed, last.success), (4, 4));
}

#[tokio::test]
async fn test_pause_then_resume_leaves_counters_unchanged() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("blip", 3, Pacing::fixed(300))).unwrap();
    wait_processed(&mut rx, 1).await;

    let before = processor.snapshot().unwrap();
    assert!(processor.pause());
    assert!(processor.resume());
    let after = processor.snapshot().unwrap();
    assert_eq!(
        (before.processed, before.success, before.failed),
        (after.processed, after.success, after.failed)
    );
    assert_eq!(after.status, JobStatus::Processing);

    processor.stop();
    run_to_completion(&mut rx, "blip").await;
}

#[tokio::test]
async fn test_control_without_job_fails() {
    let transport = FakeTransport::paired();
    let (_session, processor, _rx) = ready_processor(transport, SessionLossPolicy::Pause).await;
    assert!(!processor.pause());
    assert!(!processor.resume());
    assert!(!processor.stop());
    assert!(processor.snapshot().is_none());
}

#[tokio::test]
async fn test_next_job_starts_after_completion() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("a", 1, Pacing::fixed(0))).unwrap();
    run_to_completion(&mut rx, "a").await;
    assert_eq!(processor.snapshot().unwrap().job_id, "a");

    processor.start(job("b", 2, Pacing::fixed(0))).unwrap();
    let (last, _) = run_to_completion(&mut rx, "b").await;
    assert_eq!(last.processed, 2);
    assert_eq!(processor.snapshot().unwrap().job_id, "b");
}

#[tokio::test]
async fn test_generated_job_id() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) = ready_processor(transport, SessionLossPolicy::Pause).await;
    let id = processor.start(job("", 1, Pacing::fixed(0))).unwrap();
    assert!(!id.is_empty());
    let (last, _) = run_to_completion(&mut rx, &id).await;
    assert_eq!(last.job_id, id);
}

#[tokio::test]
async fn test_session_loss_pauses_job() {
    let transport = FakeTransport::paired();
    let (session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    processor.start(job("lossy", 3, Pacing::fixed(150))).unwrap();
    wait_processed(&mut rx, 1).await;
    transport
        .push(TransportEvent::Disconnected("socket closed".into()))
        .await;
    wait_for_status(&session, SessionStatus::Disconnected).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snap = processor.snapshot().unwrap();
    assert_eq!(snap.status, JobStatus::Paused);
    assert_eq!((snap.processed, snap.failed), (1, 0), "remaining items not marked failed");

    session.connect().await.unwrap();
    wait_for_status(&session, SessionStatus::Ready).await;
    assert!(processor.resume());
    let (last, _) = run_to_completion(&mut rx, "lossy").await;
    assert_eq!((last.processed, last.success, last.failed), (3, 3, 0));
}

#[tokio::test]
async fn test_session_loss_continue_policy_fails_remaining() {
    let transport = FakeTransport::paired();
    let (session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Continue).await;

    processor.start(job("keep-going", 3, Pacing::fixed(150))).unwrap();
    wait_processed(&mut rx, 1).await;
    transport
        .push(TransportEvent::Disconnected("socket closed".into()))
        .await;
    wait_for_status(&session, SessionStatus::Disconnected).await;

    let (last, events) = run_to_completion(&mut rx, "keep-going").await;
    assert_eq!((last.processed, last.success, last.failed), (3, 1, 2));
    let details = error_details(&events);
    assert_eq!(details.len(), 2);
    assert!(details[0].error.contains("not ready"));
}

#[tokio::test]
async fn test_attachment_sent_with_every_message() {
    let transport = FakeTransport::paired();
    let (_session, processor, mut rx) =
        ready_processor(transport.clone(), SessionLossPolicy::Pause).await;

    let first = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    let request = JobRequest {
        job_id: "with-media".into(),
        contacts: contacts(2),
        template: job("", 1, Pacing::fixed(0)).template,
        attachments: vec![
            first.path().to_string_lossy().into_owned(),
            "/tmp/ignored.png".into(),
        ],
        pacing: Some(Pacing::fixed(0)),
    };
    processor.start(request.into_job(Pacing::fixed(0))).unwrap();
    let (last, _) = run_to_completion(&mut rx, "with-media").await;

    assert_eq!(last.success, 2);
    for sent in transport.sent() {
        assert_eq!(sent.media.as_deref(), Some(first.path()));
    }
}

#[tokio::test]
async fn test_seeded_rng_is_reproducible() {
    async fn contents(seed: u64) -> Vec<String> {
        let transport = FakeTransport::paired();
        let (reporter, mut rx) = Reporter::channel(1024);
        let session = Arc::new(SessionManager::new(transport.clone(), reporter.clone()));
        session.connect().await.unwrap();
        wait_for_status(&session, SessionStatus::Ready).await;
        let processor = JobProcessor::new(
            session,
            reporter,
            PhoneNormalizer::default(),
            SessionLossPolicy::Pause,
        )
        .with_rng(StdRng::seed_from_u64(seed));

        processor
            .start(job("seeded", 8, Pacing { min_delay_ms: 0, max_delay_ms: 5 }))
            .unwrap();
        run_to_completion(&mut rx, "seeded").await;
        transport.sent().into_iter().map(|s| s.content).collect()
    }

    assert_eq!(contents(9).await, contents(9).await);
}
