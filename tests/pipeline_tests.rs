//! End-to-end pipeline tests against the scripted page driver.

use std::sync::{Arc, Mutex};

use activity_bulk_edit::application::{
    ExecutionEngine, ExecutionRequest, PreviewEngine, PreviewRequest, TaskManager,
};
use activity_bulk_edit::domain::events::{ExecutionProgress, ExecutionStatus, PreviewStatus};
use activity_bulk_edit::domain::task::{Scenario, TaskStatus};
use activity_bulk_edit::domain::UpdateCriteria;
use activity_bulk_edit::infrastructure::storage::MemoryTaskStore;
use activity_bulk_edit::infrastructure::{EngineConfig, InterceptSession, PageDriver};
use activity_bulk_edit::test_utils::{january_ride_filter, paged, sample_activities, ScriptedPageDriver};

const PER_PAGE: usize = 4;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::fast_profile();
    config.delays.quick_edit_click_ms = 1;
    config.delays.form_fill_ms = 1;
    config.delays.submit_save_ms = 1;
    config.delays.page_load_ms = 1;
    config.delays.response_wait_timeout_ms = 100;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config.navigator.items_per_page = PER_PAGE as u32;
    config
}

async fn scripted_driver(config: &EngineConfig) -> (Arc<InterceptSession>, Arc<ScriptedPageDriver>) {
    let session = Arc::new(InterceptSession::new(config.cache_ttl()));
    let driver = Arc::new(
        ScriptedPageDriver::new(
            Arc::clone(&session),
            paged(sample_activities(), PER_PAGE),
            PER_PAGE,
        )
        .await,
    );
    (session, driver)
}

fn gear_update(gear: &str) -> UpdateCriteria {
    UpdateCriteria { gear_id: Some(gear.to_string()), ..Default::default() }
}

#[tokio::test]
async fn preview_counts_matches_without_modifying_anything() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    let engine = PreviewEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        config,
    );

    let progress_log = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&progress_log);
    let mut request = PreviewRequest::new(january_ride_filter());
    request.on_progress = Some(Arc::new(move |p| sink_log.lock().unwrap().push(p)));

    let outcome = engine.run(request).await;
    assert!(outcome.success, "preview failed: {:?}", outcome.error);
    assert_eq!(outcome.matched(), 6);
    let matched_ids: Vec<&str> =
        outcome.matched_records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(matched_ids, ["3", "4", "5", "7", "8", "9"]);
    assert_eq!(outcome.total_scanned, 10);
    assert_eq!(outcome.total_pages, 3);

    // nothing was edited
    let untouched = driver.record("3").await.unwrap();
    assert_eq!(untouched.bike_id.as_deref(), Some("bike_1"));

    let events = progress_log.lock().unwrap();
    assert_eq!(events.last().unwrap().status, PreviewStatus::Completed);
    assert!(events.iter().any(|e| e.status == PreviewStatus::Scanning));
    assert_eq!(events.last().unwrap().estimated_total, Some(10));
}

#[tokio::test]
async fn preview_aborts_when_first_page_never_arrives() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    // drop the page-1 capture so the scan has nothing to read
    session.cache().clear().await;
    let engine = PreviewEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        config,
    );

    let mut request = PreviewRequest::new(january_ride_filter());
    request.max_retries = Some(1);
    let outcome = engine.run(request).await;
    assert!(!outcome.success);
    assert_eq!(outcome.total_pages, 0);
    assert!(outcome.error.unwrap().contains("first page"));
}

#[tokio::test]
async fn execution_updates_every_matching_record() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        Arc::clone(&tasks),
        config,
    );

    let progress_log: Arc<Mutex<Vec<ExecutionProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&progress_log);
    let mut request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    request.on_progress = Some(Arc::new(move |p| sink_log.lock().unwrap().push(p)));

    let result = engine.run(request).await;
    assert!(result.success, "execution failed: {:?}", result.error);
    assert_eq!(result.successful_updates, 6);
    assert_eq!(result.failed_updates, 0);
    assert_eq!(result.skipped, 4);
    assert_eq!(result.total_processed, 10);
    assert_eq!(
        result.total_processed,
        result.successful_updates + result.failed_updates + result.skipped
    );

    // the six January rides now carry the new bike, the rest are untouched
    for id in ["3", "4", "5", "7", "8", "9"] {
        let record = driver.record(id).await.unwrap();
        assert_eq!(record.bike_id.as_deref(), Some("bike_2"), "record {id}");
    }
    assert_eq!(driver.record("1").await.unwrap().bike_id.as_deref(), Some("bike_1"));
    assert_eq!(driver.record("10").await.unwrap().bike_id.as_deref(), Some("bike_1"));

    let events = progress_log.lock().unwrap();
    assert_eq!(events.last().unwrap().status, ExecutionStatus::Completed);
    for event in events.iter() {
        assert_eq!(
            event.processed,
            event.successful_updates + event.failed_updates + event.skipped
        );
    }
}

#[tokio::test]
async fn rerun_skips_records_that_already_match() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        tasks,
        config.clone(),
    );
    let request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    let first = engine.run(request.clone()).await;
    assert_eq!(first.successful_updates, 6);

    // fresh session and driver, as after a page reload, over the edited data
    let session = Arc::new(InterceptSession::new(config.cache_ttl()));
    let driver = Arc::new(
        ScriptedPageDriver::new(Arc::clone(&session), driver.snapshot_pages().await, PER_PAGE)
            .await,
    );
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        driver as Arc<dyn PageDriver>,
        Arc::clone(&session),
        tasks,
        config,
    );

    let second = engine.run(request).await;
    assert!(second.success);
    assert_eq!(second.successful_updates, 0);
    assert_eq!(second.skipped, 10);
    assert_eq!(second.failed_updates, 0);
}

#[tokio::test]
async fn transient_submit_failure_is_retried() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    driver.fail_submits("3", 1).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        tasks,
        config,
    );

    let request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    let result = engine.run(request).await;
    assert!(result.success);
    assert_eq!(result.successful_updates, 6);
    assert_eq!(result.failed_updates, 0);
    assert_eq!(driver.record("3").await.unwrap().bike_id.as_deref(), Some("bike_2"));
}

#[tokio::test]
async fn exhausted_retries_mark_the_record_failed() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    driver.fail_submits("3", 100).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        tasks,
        config,
    );

    let request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    let result = engine.run(request).await;
    assert!(result.success, "continue_on_error keeps the run going");
    assert_eq!(result.successful_updates, 5);
    assert_eq!(result.failed_updates, 1);
    assert_eq!(result.skipped, 4);
    assert_eq!(result.failed_details.len(), 1);
    assert_eq!(result.failed_details[0].id, "3");
    assert_eq!(driver.record("3").await.unwrap().bike_id.as_deref(), Some("bike_1"));
}

#[tokio::test]
async fn page_read_failure_fails_the_task_when_not_continuing() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    // the initial page-1 capture is gone and nothing will replay it
    session.cache().clear().await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        Arc::clone(&tasks),
        config,
    );

    let mut request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    request.continue_on_error = false;
    request.max_retries = Some(1);
    let result = engine.run(request).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("page 1"));
    assert_eq!(tasks.current_task().await.unwrap().status, TaskStatus::Failed);
    assert_eq!(driver.record("3").await.unwrap().bike_id.as_deref(), Some("bike_1"));
}

#[tokio::test]
async fn stop_halts_at_a_checkpoint_and_a_rerun_starts_clean() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        Arc::clone(&tasks),
        config,
    ));

    // ask for a stop as soon as the first page's two updates are reported
    let stopper = Arc::clone(&engine);
    let mut request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    request.on_progress = Some(Arc::new(move |p: ExecutionProgress| {
        if p.status == ExecutionStatus::Executing && p.successful_updates >= 2 {
            stopper.stop();
        }
    }));
    let halted = engine.run(request.clone()).await;
    assert!(!halted.success);
    assert_eq!(halted.successful_updates, 2);
    assert_eq!(tasks.current_task().await.unwrap().status, TaskStatus::Paused);

    // the same engine runs again: the old stop is cleared, the paused task
    // is resumed, and the remaining rides are written
    request.on_progress = None;
    let finished = engine.run(request).await;
    assert!(finished.success, "rerun failed: {:?}", finished.error);
    assert_eq!(finished.successful_updates, 6);
    assert_eq!(driver.record("9").await.unwrap().bike_id.as_deref(), Some("bike_2"));
}

#[tokio::test]
async fn pause_holds_work_until_resume() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        Arc::clone(&tasks),
        config,
    );

    // pause is sampled at the first record boundary, so nothing runs yet
    engine.pause();
    let request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    let halted = engine.run(request.clone()).await;
    assert!(!halted.success);
    assert_eq!(halted.total_processed, 0);
    assert_eq!(tasks.current_task().await.unwrap().status, TaskStatus::Paused);
    assert_eq!(driver.record("3").await.unwrap().bike_id.as_deref(), Some("bike_1"));

    engine.resume();
    let finished = engine.run(request).await;
    assert!(finished.success, "resumed run failed: {:?}", finished.error);
    assert_eq!(finished.successful_updates, 6);
    assert_eq!(driver.record("3").await.unwrap().bike_id.as_deref(), Some("bike_2"));
}

#[tokio::test]
async fn failing_fast_aborts_the_run() {
    let config = test_config();
    let (session, driver) = scripted_driver(&config).await;
    driver.fail_submits("3", 100).await;
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        Arc::clone(&session),
        Arc::clone(&tasks),
        config,
    );

    let mut request =
        ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), gear_update("bike_2"));
    request.continue_on_error = false;
    let result = engine.run(request).await;
    assert!(!result.success);
    assert_eq!(result.failed_updates, 1);
    assert!(result.error.unwrap().contains("record 3"));
    let task = tasks.current_task().await.unwrap();
    assert!(task.error.is_some());
}
