mod common;

use common::{
    eventually, location, Event, Harness, MockClient, MockCredentials, RecordingCallback,
};
use location_tracker::source::ChannelLocationSource;
use location_tracker::store::{store_key, KeyValueStore};
use location_tracker::upload::{CycleReport, BATCH_SIZE, MAX_RETRY};
use location_tracker::{
    DataDir, FilterKind, LocationFilter, LocationTracker, LocationTrackingCallback, Platform,
    Sample, TrackerConfig, TrackerError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn failed_batch_stays_queued() {
    let harness = Harness::new();
    harness.client.fail_always();
    let tracker = harness.tracker();

    let locations: Vec<_> = (0..5).map(|i| location(1.0, 1.0, i * 1_000)).collect();
    let result = tracker.record_locations(&locations).await;

    assert!(matches!(result, Err(TrackerError::Transmit(_))));
    assert_eq!(harness.client.attempts(), MAX_RETRY);
    assert_eq!(tracker.queued_samples().unwrap().len(), 5);
    assert_eq!(tracker.last_uploaded(), None);
}

#[tokio::test]
async fn transient_failures_are_retried_in_the_same_cycle() {
    let harness = Harness::new();
    harness.client.fail_next.store(MAX_RETRY - 1, Ordering::SeqCst);
    let tracker = harness.tracker();

    let report = tracker
        .record_locations(&[location(1.0, 1.0, 5_000)])
        .await
        .unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(harness.client.attempts(), MAX_RETRY);
    assert!(tracker.queued_samples().unwrap().is_empty());
}

struct FailAfterFirstBatch(Arc<MockClient>);

impl LocationTrackingCallback for FailAfterFirstBatch {
    fn on_uploaded(&self, _batch: &[Sample]) {
        self.0.fail_always();
    }
}

#[tokio::test]
async fn earlier_batches_stay_committed_when_a_later_one_fails() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    for t in 0..15 {
        harness
            .samples
            .append(&Sample::new(0.0, 0.0, t * 100, 0.0))
            .unwrap();
    }

    let callback = FailAfterFirstBatch(harness.client.clone());
    let result = tracker.upload_location_updates(Some(&callback)).await;

    assert!(matches!(result, Err(TrackerError::Transmit(_))));
    assert_eq!(harness.client.batches().len(), 1);
    assert_eq!(tracker.queued_samples().unwrap().len(), 5);
    assert_eq!(tracker.last_uploaded().map(|s| s.timestamp), Some(900));
}

#[tokio::test]
async fn accepted_samples_upload_in_batches_of_ten() {
    let harness = Harness::new();
    let tracker = harness.tracker();

    let locations: Vec<_> = (0..23).rev().map(|i| location(0.0, 0.0, 1_000 + i)).collect();
    let report = tracker.record_locations(&locations).await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            queued: 23,
            skipped: 0,
            uploaded: 23,
            batches: 3,
        }
    );
    let batches = harness.client.batches();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![BATCH_SIZE, BATCH_SIZE, 3]);
    assert_eq!(batches.concat(), (1_000..1_023).collect::<Vec<i64>>());
    assert!(tracker.queued_samples().unwrap().is_empty());
    assert_eq!(tracker.last_uploaded().map(|s| s.timestamp), Some(1_022));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cycles_drain_the_queue_without_regressing() {
    let harness = Harness::new();
    harness.client.paused.store(true, Ordering::SeqCst);
    let tracker = harness.tracker();
    for t in [300, 100, 500, 200, 400] {
        harness
            .samples
            .append(&Sample::new(0.0, 0.0, t, 0.0))
            .unwrap();
    }

    let first = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.upload_location_updates(None).await }
    });
    let second = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.upload_location_updates(None).await }
    });
    assert!(eventually(|| harness.client.attempts() == 2).await);
    harness.client.release.add_permits(2);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.uploaded, 5);
    assert_eq!(second.uploaded, 5);

    // both cycles read the same queue, so the service sees every sample twice
    assert_eq!(harness.client.uploaded_count(), 10);
    assert!(tracker.queued_samples().unwrap().is_empty());
    assert_eq!(tracker.last_uploaded().map(|s| s.timestamp), Some(500));
}

#[tokio::test]
async fn time_filter_handles_extreme_timestamps() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    tracker.enable_filter(FilterKind::Time).unwrap();

    tracker
        .record_locations(&[location(0.0, 0.0, i64::MIN + 1)])
        .await
        .unwrap();
    let report = tracker
        .record_locations(&[location(0.0, 0.0, i64::MAX)])
        .await
        .unwrap();

    assert_eq!(report.uploaded, 1);
    assert!(tracker.queued_samples().unwrap().is_empty());
    assert_eq!(tracker.last_uploaded().map(|s| s.timestamp), Some(i64::MAX));
}

#[tokio::test]
async fn time_filter_accepts_greedily() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    tracker.enable_filter(FilterKind::Time).unwrap();

    let stamps = [
        0, 10_000, 25_000, 31_000, 50_000, 61_500, 62_000, 100_000, 130_000, 130_001,
    ];
    let mut expected = Vec::new();
    let mut last: Option<i64> = None;
    for &t in &stamps {
        if last.map_or(true, |l| t - l > 30_000) {
            expected.push(t);
            last = Some(t);
        }
    }

    for &t in &stamps {
        tracker.record_locations(&[location(0.0, 0.0, t)]).await.unwrap();
    }

    assert_eq!(harness.client.batches().concat(), expected);
    assert!(tracker.queued_samples().unwrap().is_empty());
}

#[tokio::test]
async fn first_sample_passes_every_filter() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    for kind in FilterKind::ALL {
        tracker.enable_filter(kind).unwrap();
    }

    let report = tracker
        .record_locations(&[location(10.0, 10.0, 42).with_accuracy(500.0)])
        .await
        .unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn accuracy_filter_skips_moves_within_reported_accuracy() {
    let harness = Harness::new();
    let tracker = harness.tracker_with(TrackerConfig {
        location_filters: vec![LocationFilter::Accuracy],
        ..TrackerConfig::new("fleet")
    });
    tracker.enable_filter(FilterKind::Accuracy).unwrap();
    let callback = RecordingCallback::default();

    harness
        .samples
        .append(&Sample::new(47.0, 8.0, 0, 5.0))
        .unwrap();
    tracker.upload_location_updates(Some(&callback)).await.unwrap();

    // about two meters north
    harness
        .samples
        .append(&Sample::new(47.0 + 2.0 / 111_195.0, 8.0, 1_000, 5.0))
        .unwrap();
    let report = tracker.upload_location_updates(Some(&callback)).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(
        callback.events(),
        vec![
            Event::Started(vec![0]),
            Event::Uploaded(vec![0]),
            Event::Skipped(1_000),
        ]
    );
    assert_eq!(harness.client.batches(), vec![vec![0]]);
    assert!(tracker.queued_samples().unwrap().is_empty());
}

#[tokio::test]
async fn last_uploaded_never_moves_backwards() {
    let harness = Harness::new();
    let tracker = harness.tracker();

    tracker
        .record_locations(&[location(1.0, 1.0, 100_000)])
        .await
        .unwrap();
    tracker
        .record_locations(&[location(2.0, 2.0, 50_000)])
        .await
        .unwrap();

    assert_eq!(harness.client.uploaded_count(), 2);
    assert_eq!(tracker.last_uploaded().map(|s| s.timestamp), Some(100_000));
}

#[tokio::test]
async fn credentials_are_checked_for_every_batch() {
    let client = Arc::new(MockClient::new());
    let harness = Harness::with_credentials(Arc::new(MockCredentials::always_expired(client)));
    let tracker = harness.tracker();

    let locations: Vec<_> = (0..23).map(|i| location(0.0, 0.0, i)).collect();
    tracker.record_locations(&locations).await.unwrap();

    assert_eq!(harness.credentials.refreshes(), 3);
}

#[tokio::test]
async fn credentials_are_checked_before_each_retry() {
    let client = Arc::new(MockClient::new());
    client.fail_next.store(1, Ordering::SeqCst);
    let harness = Harness::with_credentials(Arc::new(MockCredentials::always_expired(client)));
    let tracker = harness.tracker();

    let report = tracker
        .record_locations(&[location(0.0, 0.0, 1)])
        .await
        .unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(harness.client.attempts(), 2);
    assert_eq!(harness.credentials.refreshes(), 2);
}

#[tokio::test]
async fn missing_credentials_keep_samples_queued() {
    let harness = Harness::new();
    let platform = Platform {
        credentials: None,
        ..harness.platform()
    };
    let tracker = LocationTracker::new(TrackerConfig::new("fleet"), platform).unwrap();

    let result = tracker.record_locations(&[location(1.0, 1.0, 1)]).await;

    assert!(matches!(result, Err(TrackerError::CredentialsUnavailable)));
    assert_eq!(harness.client.attempts(), 0);
    assert_eq!(tracker.queued_samples().unwrap().len(), 1);
}

#[tokio::test]
async fn uploads_carry_the_persisted_device_id() {
    let harness = Harness::new();
    harness
        .device_store
        .put(store_key::DEVICE_ID, "abc-123")
        .unwrap();
    let tracker = harness.tracker();

    tracker.record_locations(&[location(1.0, 1.0, 1)]).await.unwrap();

    let requests = harness.client.requests.lock().unwrap().clone();
    assert_eq!(requests[0].tracker_name, "fleet");
    assert_eq!(requests[0].updates[0].device_id, "abc-123");
    assert_eq!(tracker.device_id().await.unwrap(), "abc-123");
}

#[tokio::test]
async fn reading_the_device_id_does_not_create_one() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let client = Arc::new(MockClient::new());
    let platform = Platform::from_data_dir(
        &data,
        Arc::new(ChannelLocationSource::new()),
        Some(Arc::new(MockCredentials::new(client))),
    )
    .unwrap();
    let tracker = LocationTracker::new(TrackerConfig::new("fleet"), platform).unwrap();

    assert_eq!(tracker.current_device_id().unwrap(), None);
    assert!(!data.device_path().exists());

    let id = tracker.device_id().await.unwrap();
    assert_eq!(tracker.current_device_id().unwrap(), Some(id));
}

#[tokio::test]
async fn implicit_construction_requires_cached_configuration() {
    let harness = Harness::new();
    assert!(matches!(
        LocationTracker::from_preferences(harness.platform()),
        Err(TrackerError::ConfigurationMissing)
    ));

    harness.tracker();
    let restored = LocationTracker::from_preferences(harness.platform()).unwrap();
    assert_eq!(restored.config(), TrackerConfig::new("fleet"));
}

#[tokio::test]
async fn invalid_filter_parameter_is_rejected() {
    let harness = Harness::new();
    let tracker = harness.tracker();

    assert!(matches!(
        tracker.update_filter_parameter(FilterKind::Accuracy, 5.0),
        Err(TrackerError::InvalidFilterParameter(FilterKind::Accuracy, _))
    ));
    assert!(matches!(
        tracker.update_filter_parameter(FilterKind::Distance, -1.0),
        Err(TrackerError::InvalidFilterParameter(FilterKind::Distance, _))
    ));
}

#[tokio::test]
async fn queue_and_filters_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let client = Arc::new(MockClient::new());
    client.fail_always();
    let credentials = Arc::new(MockCredentials::new(client.clone()));
    let platform = || {
        Platform::from_data_dir(
            &data,
            Arc::new(ChannelLocationSource::new()),
            Some(credentials.clone()),
        )
        .unwrap()
    };

    {
        let tracker = LocationTracker::new(TrackerConfig::new("fleet"), platform()).unwrap();
        tracker
            .update_filter_parameter(FilterKind::Distance, 75.0)
            .unwrap();
        tracker.enable_filter(FilterKind::Distance).unwrap();
        let result = tracker
            .record_locations(&[location(1.0, 1.0, 10), location(1.0, 1.0, 20)])
            .await;
        assert!(result.is_err());
    }

    let tracker = LocationTracker::from_preferences(platform()).unwrap();
    assert_eq!(
        tracker.filter(FilterKind::Distance),
        Some(LocationFilter::Distance {
            distance_threshold: 75.0
        })
    );
    assert!(tracker.is_filter_enabled(FilterKind::Distance));

    let queued = tracker.queued_samples().unwrap();
    assert_eq!(queued.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);

    client.fail_next.store(0, Ordering::SeqCst);
    let report = tracker.upload_location_updates(None).await.unwrap();
    assert_eq!(report.uploaded, 2);

    tracker.record_locations(&[location(5.0, 5.0, 30)]).await.unwrap();
    assert_eq!(client.uploaded_count(), 3);
    assert!(tracker.queued_samples().unwrap().is_empty());
}

#[tokio::test]
async fn remote_lookup_maps_missing_device_to_none() {
    let harness = Harness::new();
    let tracker = harness.tracker();

    assert_eq!(tracker.get_tracker_device_location().await.unwrap(), None);

    *harness.client.last_known.lock().unwrap() = Some(location(3.0, 4.0, 99));
    assert_eq!(
        tracker.get_tracker_device_location().await.unwrap(),
        Some(location(3.0, 4.0, 99))
    );
}

#[tokio::test]
async fn geofence_evaluation_tags_identity() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    let samples = [Sample::new(1.0, 2.0, 3, 0.0)];

    tracker
        .batch_evaluate_geofences("depots", "device-9", &samples, Some("eu-west-1:user-7"))
        .await
        .unwrap();

    let evaluations = harness.client.evaluations.lock().unwrap().clone();
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].collection_name, "depots");
    let update = &evaluations[0].updates[0];
    assert_eq!(update.device_id, "device-9");
    assert_eq!(update.position, [2.0, 1.0]);
    assert_eq!(update.position_properties["region"], "eu-west-1");
    assert_eq!(update.position_properties["id"], "user-7");
}
