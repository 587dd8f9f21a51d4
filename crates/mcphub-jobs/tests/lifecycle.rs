//! End-to-end job lifecycle tests running real subprocesses.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use mcphub_jobs::{JobCommand, JobError, JobId, JobManager, JobManagerConfig, JobRequest, JobStatus};

fn manager(dir: &Path) -> JobManager {
    JobManager::new(
        JobManagerConfig::new(dir.join("jobs"))
            .with_poll_interval(Duration::from_millis(20))
            .with_cancel_grace(Duration::from_millis(500)),
    )
}

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

async fn wait_running(jobs: &JobManager, job_id: &JobId) -> u32 {
    for _ in 0..250 {
        let record = jobs.status(job_id).unwrap();
        if let (JobStatus::Running, Some(pid)) = (record.status, record.pid) {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never started");
}

fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_job_with_text_result() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(
            JobCommand::shell(r#"echo starting; echo hello > "$MCPHUB_JOB_OUTPUT""#),
            tmp.path(),
            Some("greeting".into()),
        )
        .unwrap();
    assert_eq!(receipt.status, "submitted");

    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.name, "greeting");
    assert_eq!(record.exit_code, Some(0));

    let started = record.started_at.unwrap();
    let completed = record.completed_at.unwrap();
    assert!(record.submitted_at < started);
    assert!(started < completed);

    assert_eq!(jobs.result(&receipt.job_id).unwrap(), json!({"content": "hello\n"}));
    assert_eq!(jobs.log(&receipt.job_id, 0).unwrap().lines, vec!["starting"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_result_is_parsed() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(
            JobCommand::shell(r#"printf '{"score": 0.9, "model": "esm"}' > "$MCPHUB_JOB_OUTPUT""#),
            tmp.path(),
            None,
        )
        .unwrap();
    jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    let result = jobs.result(&receipt.job_id).unwrap();
    assert_eq!(result["score"], json!(0.9));
    assert_eq!(result["model"], json!("esm"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relative_output_path_resolves_against_working_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let jobs = manager(tmp.path());

    let request = JobRequest::new(JobCommand::shell(r#"echo done > "$MCPHUB_JOB_OUTPUT""#), &work)
        .with_output_path("results/out.txt");
    std::fs::create_dir_all(work.join("results")).unwrap();
    let receipt = jobs.submit_request(request).unwrap();

    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.output_path, work.join("results/out.txt"));
    assert_eq!(std::fs::read_to_string(work.join("results/out.txt")).unwrap(), "done\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nonzero_exit_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(JobCommand::shell("echo boom >&2; exit 3"), tmp.path(), None)
        .unwrap();
    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.exit_code, Some(3));
    assert!(record.error.as_deref().unwrap().contains('3'));
    assert_eq!(jobs.log(&receipt.job_id, 0).unwrap().lines, vec!["boom"]);

    let err = jobs.result(&receipt.job_id).unwrap_err();
    assert!(matches!(err, JobError::NotReady { status: JobStatus::Failed, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawn_failure_is_recorded_not_raised() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(JobCommand::new("/nonexistent/bin/tool"), tmp.path(), None)
        .unwrap();
    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("failed to spawn"));
    assert!(record.pid.is_none());
    let log = jobs.log(&receipt.job_id, 0).unwrap();
    assert!(log.lines[0].contains("/nonexistent/bin/tool"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_log_tail() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(
            JobCommand::shell("i=1; while [ $i -le 100 ]; do echo line $i; i=$((i+1)); done"),
            tmp.path(),
            None,
        )
        .unwrap();
    jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    let tail = jobs.log(&receipt.job_id, 5).unwrap();
    assert_eq!(tail.total_lines, 100);
    assert_eq!(
        tail.lines,
        vec!["line 96", "line 97", "line 98", "line 99", "line 100"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_job_kills_process() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit(JobCommand::new("sleep").with_arg("30"), tmp.path(), None)
        .unwrap();
    let pid = wait_running(&jobs, &receipt.job_id).await;

    let err = jobs.result(&receipt.job_id).unwrap_err();
    assert!(matches!(err, JobError::NotReady { status: JobStatus::Running, .. }));

    let cancelled = jobs.cancel(&receipt.job_id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let mut alive = true;
    for _ in 0..150 {
        if !process_alive(pid) {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!alive, "process {pid} still alive after cancel");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = jobs.status(&receipt.job_id).unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(record.completed_at.is_some());

    let err = jobs.cancel(&receipt.job_id).unwrap_err();
    assert!(matches!(err, JobError::AlreadyTerminal { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_kills_job_ignoring_sigterm_after_grace() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = JobManager::new(
        JobManagerConfig::new(tmp.path().join("jobs"))
            .with_poll_interval(Duration::from_millis(20))
            .with_cancel_grace(Duration::from_secs(1)),
    );

    let receipt = jobs
        .submit(
            JobCommand::shell("trap '' TERM; while :; do sleep 0.05; done"),
            tmp.path(),
            None,
        )
        .unwrap();
    let pid = wait_running(&jobs, &receipt.job_id).await;

    jobs.cancel(&receipt.job_id).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(process_alive(pid), "process {pid} should outlive SIGTERM until the grace period ends");

    let mut alive = true;
    for _ in 0..250 {
        if !process_alive(pid) {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!alive, "process {pid} still alive after the grace period");

    let record = jobs.status(&receipt.job_id).unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_pending_job_never_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = JobManager::new(
        JobManagerConfig::new(tmp.path().join("jobs"))
            .with_max_concurrent_jobs(1)
            .with_poll_interval(Duration::from_millis(20))
            .with_cancel_grace(Duration::from_millis(500)),
    );

    let blocker = jobs
        .submit(JobCommand::new("sleep").with_arg("30"), tmp.path(), None)
        .unwrap();
    wait_running(&jobs, &blocker.job_id).await;

    let queued = jobs
        .submit(JobCommand::shell("echo ran"), tmp.path(), None)
        .unwrap();
    assert_eq!(jobs.status(&queued.job_id).unwrap().status, JobStatus::Pending);

    let cancelled = jobs.cancel(&queued.job_id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.started_at.is_none());

    jobs.cancel(&blocker.job_id).unwrap();
    jobs.wait(&blocker.job_id, WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let record = jobs.status(&queued.job_id).unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(record.started_at.is_none());
    assert!(jobs.log(&queued.job_id, 0).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_runs_as_one_job() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit_batch(
            vec![
                JobCommand::new("echo").with_arg("first step"),
                JobCommand::new("echo").with_arg("second"),
            ],
            tmp.path(),
            None,
        )
        .unwrap();
    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.name, "batch-2");
    assert_eq!(
        jobs.log(&receipt.job_id, 0).unwrap().lines,
        vec!["first step", "second"]
    );
    assert_eq!(jobs.list(None).iter().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_stops_at_first_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = manager(tmp.path());

    let receipt = jobs
        .submit_batch(
            vec![
                JobCommand::new("false"),
                JobCommand::new("echo").with_arg("unreachable"),
            ],
            tmp.path(),
            Some("pipeline".into()),
        )
        .unwrap();
    let record = jobs.wait(&receipt.job_id, WAIT).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert!(jobs.log(&receipt.job_id, 0).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_visible_to_other_manager_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let submitter = manager(tmp.path());
    let observer = manager(tmp.path());

    let ok = submitter.submit(JobCommand::new("true"), tmp.path(), None).unwrap();
    let bad = submitter.submit(JobCommand::new("false"), tmp.path(), None).unwrap();
    submitter.wait(&ok.job_id, WAIT).await.unwrap();
    submitter.wait(&bad.job_id, WAIT).await.unwrap();

    assert_eq!(observer.status(&ok.job_id).unwrap().status, JobStatus::Completed);

    let completed: Vec<_> = observer.list(Some(JobStatus::Completed)).iter().collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].job_id, ok.job_id);

    let all = observer.list(None);
    assert_eq!(all.iter().count(), 2);
    assert_eq!(all.sorted()[0].job_id, bad.job_id);

    let err = observer.status(&JobId::new("does-not-exist")).unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
