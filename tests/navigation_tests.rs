//! Navigator behavior over a multi-page scripted list.

use std::sync::Arc;

use activity_bulk_edit::application::navigator::PageNavigator;
use activity_bulk_edit::application::{ExecutionEngine, ExecutionRequest, TaskManager};
use activity_bulk_edit::domain::activity::Activity;
use activity_bulk_edit::domain::task::Scenario;
use activity_bulk_edit::domain::UpdateCriteria;
use activity_bulk_edit::infrastructure::storage::MemoryTaskStore;
use activity_bulk_edit::infrastructure::{EngineConfig, InterceptSession, PageDriver};
use activity_bulk_edit::test_utils::{
    january_ride_filter, make_activity, paged, sample_activities, ScriptedPageDriver,
};

/// 41 rides, newest first, paged at the host's real page size.
fn forty_one_rides() -> Vec<Activity> {
    (0..41)
        .map(|i| {
            let day = 28 - (i / 2);
            make_activity(
                &format!("{}", 100 + i),
                "Ride",
                &format!("2025-01-{day:02}T08:00:00+0000"),
                20_000.0,
                Some("bike_1"),
            )
        })
        .collect()
}

async fn navigator_over(
    records: Vec<Activity>,
    per_page: usize,
) -> (PageNavigator, Arc<ScriptedPageDriver>) {
    let mut config = EngineConfig::fast_profile();
    config.delays.page_load_ms = 1;
    config.navigator.items_per_page = per_page as u32;
    config.navigator.navigation_retry_delay_ms = 1;
    let session = Arc::new(InterceptSession::new(config.cache_ttl()));
    let driver =
        Arc::new(ScriptedPageDriver::new(session, paged(records, per_page), per_page).await);
    let navigator = PageNavigator::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        config.navigator,
        config.delays,
    );
    (navigator, driver)
}

#[tokio::test]
async fn range_indicator_decodes_to_logical_page() {
    let (navigator, driver) = navigator_over(forty_one_rides(), 20).await;
    assert_eq!(navigator.current_page().await, 1);

    assert!(navigator.go_to_next_page().await);
    assert_eq!(driver.page_indicator_text().await.as_deref(), Some("21-40 of 41"));
    assert_eq!(navigator.current_page().await, 2);

    assert!(navigator.go_to_next_page().await);
    assert_eq!(navigator.current_page().await, 3);
    assert!(!navigator.has_next_page().await);
    assert!(!navigator.go_to_next_page().await);
}

#[tokio::test]
async fn sort_click_resets_to_first_page() {
    let (navigator, _driver) = navigator_over(forty_one_rides(), 20).await;
    assert!(navigator.go_to_next_page().await);
    assert_eq!(navigator.current_page().await, 2);

    assert!(navigator.ensure_first_page(3).await);
    assert_eq!(navigator.current_page().await, 1);
    // the reset toggled the sort, so this clicks it back to newest-first
    assert!(navigator.ensure_time_sorted().await);
}

#[tokio::test]
async fn environment_validation_passes_on_a_healthy_page() {
    let (navigator, _driver) = navigator_over(forty_one_rides(), 20).await;
    assert!(navigator.validate_environment().await.is_empty());
    let prepared = navigator.prepare_page_for_execution().await;
    assert!(prepared.success, "{:?}", prepared.errors);
}

#[tokio::test]
async fn prepare_fails_when_list_cannot_sort_newest_first() {
    let (navigator, driver) = navigator_over(forty_one_rides(), 20).await;
    driver.stick_sort_ascending().await;
    let prepared = navigator.prepare_page_for_execution().await;
    assert!(!prepared.success);
    assert!(
        prepared.errors.iter().any(|e| e.contains("sort")),
        "{:?}",
        prepared.errors
    );
}

#[tokio::test]
async fn paused_task_with_matching_shape_is_resumed() {
    let mut config = EngineConfig::fast_profile();
    config.delays.quick_edit_click_ms = 1;
    config.delays.form_fill_ms = 1;
    config.delays.submit_save_ms = 1;
    config.delays.page_load_ms = 1;
    config.delays.response_wait_timeout_ms = 100;
    config.navigator.items_per_page = 4;

    let session = Arc::new(InterceptSession::new(config.cache_ttl()));
    let driver = Arc::new(
        ScriptedPageDriver::new(Arc::clone(&session), paged(sample_activities(), 4), 4).await,
    );
    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let updates = UpdateCriteria { gear_id: Some("bike_2".to_string()), ..Default::default() };

    // a run that was interrupted earlier and persisted as paused
    let stored = tasks
        .create_task(Scenario::Bikes, january_ride_filter(), updates.clone())
        .await
        .unwrap();
    tasks.start().await.unwrap();
    tasks.pause().await.unwrap();

    let engine = ExecutionEngine::new(
        driver as Arc<dyn PageDriver>,
        session,
        Arc::clone(&tasks),
        config,
    );
    let request = ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), updates);
    let result = engine.run(request).await;
    assert!(result.success, "resumed run failed: {:?}", result.error);
    assert_eq!(result.successful_updates, 6);

    let finished = tasks.current_task().await.unwrap();
    assert_eq!(finished.id, stored.id, "run must resume the stored task, not replace it");
}

#[tokio::test]
async fn resume_from_a_later_page_finishes_the_remaining_records() {
    let mut config = EngineConfig::fast_profile();
    config.delays.quick_edit_click_ms = 1;
    config.delays.form_fill_ms = 1;
    config.delays.submit_save_ms = 1;
    config.delays.page_load_ms = 1;
    config.delays.response_wait_timeout_ms = 100;
    config.navigator.items_per_page = 4;

    // five of the six January rides were already updated before the pause
    let mut records = sample_activities();
    for record in &mut records {
        if ["3", "4", "5", "7", "8"].contains(&record.id.as_str()) {
            record.bike_id = Some("bike_2".to_string());
        }
    }
    let session = Arc::new(InterceptSession::new(config.cache_ttl()));
    let driver =
        Arc::new(ScriptedPageDriver::new(Arc::clone(&session), paged(records, 4), 4).await);
    // the interrupted run left the list sitting on its third page
    driver.click_next().await.unwrap();
    driver.click_next().await.unwrap();

    let tasks = Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())));
    let updates = UpdateCriteria { gear_id: Some("bike_2".to_string()), ..Default::default() };
    tasks
        .create_task(Scenario::Bikes, january_ride_filter(), updates.clone())
        .await
        .unwrap();
    tasks.start().await.unwrap();
    for _ in 0..3 {
        tasks.record_skipped().await.unwrap();
    }
    for _ in 0..5 {
        tasks.record_success().await.unwrap();
    }
    tasks.set_current_page(3).await.unwrap();
    tasks.set_total_pages(3).await.unwrap();
    tasks.pause().await.unwrap();

    let engine = ExecutionEngine::new(
        Arc::clone(&driver) as Arc<dyn PageDriver>,
        session,
        Arc::clone(&tasks),
        config,
    );
    let request = ExecutionRequest::new(Scenario::Bikes, january_ride_filter(), updates);
    let result = engine.run(request).await;
    assert!(result.success, "resumed run failed: {:?}", result.error);

    // the resumed walk starts back at page 1; the five finished rides are
    // skipped as no-ops and only the sixth is written
    assert_eq!(result.successful_updates, 6);
    assert_eq!(result.failed_updates, 0);
    assert!(result.failed_details.is_empty());
    assert_eq!(driver.record("9").await.unwrap().bike_id.as_deref(), Some("bike_2"));
    assert_eq!(driver.record("10").await.unwrap().bike_id.as_deref(), Some("bike_1"));
    assert_eq!(
        result.total_processed,
        result.successful_updates + result.failed_updates + result.skipped
    );
}
