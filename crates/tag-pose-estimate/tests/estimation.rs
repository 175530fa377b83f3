use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use approx::assert_relative_eq;
use tag_pose_camera::{
    CameraError, CameraService, CameraSession, SubscribeRequest, SubscriptionHandle,
};
use tag_pose_core::{
    CameraIdentity, ColorSpace, FrameBuffer, FrameView, IntrinsicsEntry, IntrinsicsTable,
    RawTransform, Resolution, Timestamp,
};
use tag_pose_estimate::{
    Detections, DetectorError, DetectorSetup, EstimateError, LoopLimits, MarkerConfig,
    MarkerDetector, PoseEstimationLoop, TargetSelector,
};

#[derive(Default)]
struct Accounting {
    requested: usize,
    released: usize,
    outstanding: bool,
}

/// Camera that serves blank frames forever and fails the test on a
/// second outstanding frame.
struct StrictCamera {
    stats: Rc<RefCell<Accounting>>,
    resolution: Resolution,
}

impl CameraService for StrictCamera {
    fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionHandle, CameraError> {
        self.resolution = request.resolution;
        Ok(SubscriptionHandle::new("cam_0"))
    }

    fn open_camera(&mut self, _camera: CameraIdentity) -> bool {
        true
    }

    fn start_camera(&mut self, _camera: CameraIdentity) -> bool {
        true
    }

    fn get_frame(&mut self, _handle: &SubscriptionHandle) -> Result<FrameBuffer, CameraError> {
        let mut stats = self.stats.borrow_mut();
        assert!(!stats.outstanding, "two frames outstanding at once");
        stats.outstanding = true;
        stats.requested += 1;
        let (w, h) = self.resolution.dimensions();
        Ok(FrameBuffer::blank(
            w,
            h,
            ColorSpace::Bgr,
            CameraIdentity::Secondary,
            Timestamp {
                sec: stats.requested as u64,
                usec: 0,
            },
        )?)
    }

    fn release_frame(&mut self, _handle: &SubscriptionHandle) {
        let mut stats = self.stats.borrow_mut();
        assert!(stats.outstanding, "release without an outstanding frame");
        stats.outstanding = false;
        stats.released += 1;
    }

    fn unsubscribe(&mut self, _handle: &SubscriptionHandle) {}
}

/// Detector replaying scripted per-frame results; empty once the script runs out.
struct ScriptedDetector {
    script: VecDeque<Detections>,
    setups: Vec<DetectorSetup>,
    fail_on_layout: bool,
}

impl ScriptedDetector {
    fn new(frames: Vec<Vec<(&str, RawTransform)>>) -> Self {
        Self {
            script: frames
                .into_iter()
                .map(|f| f.into_iter().map(|(n, t)| (n.to_string(), t)).collect())
                .collect(),
            setups: Vec::new(),
            fail_on_layout: false,
        }
    }
}

impl MarkerDetector for ScriptedDetector {
    fn configure(&mut self, setup: &DetectorSetup) -> Result<(), DetectorError> {
        if let (true, Some(path)) = (self.fail_on_layout, &setup.layout_path) {
            return Err(DetectorError::Layout {
                path: path.clone(),
                reason: "unreadable".into(),
            });
        }
        self.setups.push(setup.clone());
        Ok(())
    }

    fn estimate(&mut self, frame: &FrameView<'_>) -> Result<Detections, DetectorError> {
        assert!(frame.width > 0 && frame.height > 0);
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

fn pose(t: [f32; 3]) -> RawTransform {
    RawTransform::Homogeneous([
        [1.0, 0.0, 0.0, t[0]],
        [0.0, 0.0, -1.0, t[1]],
        [0.0, 1.0, 0.0, t[2]],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

fn open_session(
    camera: CameraIdentity,
    resolution: Resolution,
) -> (CameraSession<StrictCamera>, Rc<RefCell<Accounting>>) {
    let stats = Rc::new(RefCell::new(Accounting::default()));
    let mut session = CameraSession::new(StrictCamera {
        stats: Rc::clone(&stats),
        resolution,
    });
    session
        .subscribe(camera, resolution, ColorSpace::Bgr, 30)
        .expect("subscribe");
    (session, stats)
}

#[test]
fn targeted_run_stops_on_third_frame() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let detector = ScriptedDetector::new(vec![
        vec![],
        vec![],
        vec![("tag_8", pose([10.0, 20.0, 30.0]))],
        vec![("tag_8", pose([99.0, 99.0, 99.0]))],
    ]);
    let mut estimator = PoseEstimationLoop::new(detector);

    let records = estimator
        .run(
            &mut session,
            &MarkerConfig::default(),
            TargetSelector::Marker(8),
        )
        .expect("run");

    assert_eq!(stats.borrow().requested, 3);
    assert_eq!(stats.borrow().released, 3);
    assert_eq!(records.len(), 1);
    let v = records[0].values();
    assert_eq!(v[0], 8.0);
    assert_eq!(&v[1..4], &[1.0, 0.0, 0.0]);
    assert_eq!(&v[5..8], &[0.0, 0.0, -1.0]);
    assert_eq!(&v[9..12], &[0.0, 1.0, 0.0]);
    assert_relative_eq!(v[4], 0.010);
    assert_relative_eq!(v[8], 0.020);
    assert_relative_eq!(v[12], 0.030);
    assert_eq!(&v[13..], &[0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn targeted_run_skips_other_markers() {
    let (mut session, stats) = open_session(CameraIdentity::Primary, Resolution::High);
    let detector = ScriptedDetector::new(vec![
        vec![("tag_3", pose([1.0, 1.0, 1.0]))],
        vec![
            ("tag_3", pose([2.0, 2.0, 2.0])),
            ("tag_5", pose([500.0, 0.0, 0.0])),
            ("tag_9", pose([3.0, 3.0, 3.0])),
        ],
    ]);
    let mut estimator = PoseEstimationLoop::new(detector);

    let outcome = estimator
        .run_with_outcome(
            &mut session,
            &MarkerConfig::default(),
            TargetSelector::Marker(5),
        )
        .expect("run");

    assert_eq!(outcome.frames_consumed, 2);
    assert_eq!(stats.borrow().released, 2);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].marker_id(), 5);
    assert_relative_eq!(outcome.records[0].translation_m().x, 0.5);
}

#[test]
fn targeted_run_matches_ids_beyond_float_precision() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let detector = ScriptedDetector::new(vec![vec![
        ("tag_16777216", pose([0.0, 0.0, 100.0])),
        ("tag_16777217", pose([5.0, 0.0, 200.0])),
    ]]);
    let mut estimator = PoseEstimationLoop::new(detector)
        .with_limits(LoopLimits::unbounded().with_max_frames(3));

    let outcome = estimator
        .run_with_outcome(
            &mut session,
            &MarkerConfig::default(),
            TargetSelector::Marker(16_777_217),
        )
        .expect("target visible on the first frame");

    assert_eq!(outcome.frames_consumed, 1);
    assert_eq!(stats.borrow().released, 1);
    assert_eq!(outcome.records.len(), 1);
    assert_relative_eq!(outcome.records[0].translation_m().z, 0.2);
}

#[test]
fn any_run_returns_every_marker_of_first_non_empty_frame() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let detector = ScriptedDetector::new(vec![
        vec![],
        vec![
            ("tag_1", pose([0.0, 0.0, 100.0])),
            ("tag_12", pose([0.0, 0.0, 200.0])),
            ("tag_4", pose([0.0, 0.0, 300.0])),
        ],
        vec![("tag_7", pose([0.0, 0.0, 400.0]))],
    ]);
    let mut estimator = PoseEstimationLoop::new(detector);

    let records = estimator
        .run(&mut session, &MarkerConfig::default(), TargetSelector::Any)
        .expect("run");

    assert_eq!(stats.borrow().requested, 2);
    assert_eq!(stats.borrow().released, 2);
    let mut ids: Vec<u32> = records.iter().map(|r| r.marker_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4, 12]);
}

#[test]
fn malformed_names_count_as_empty_frames() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let detector = ScriptedDetector::new(vec![
        vec![("cube", pose([1.0, 2.0, 3.0])), ("tag_x", pose([0.0; 3]))],
        vec![("cube", pose([1.0, 2.0, 3.0])), ("tag_2", pose([0.0; 3]))],
    ]);
    let mut estimator = PoseEstimationLoop::new(detector);

    let outcome = estimator
        .run_with_outcome(&mut session, &MarkerConfig::default(), TargetSelector::Any)
        .expect("run");

    assert_eq!(outcome.frames_consumed, 2);
    assert_eq!(outcome.malformed, 3);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].marker_id(), 2);
    assert_eq!(stats.borrow().released, 2);
}

#[test]
fn detector_sees_intrinsics_and_current_config() {
    let (mut session, _stats) = open_session(CameraIdentity::Primary, Resolution::High);
    let detector = ScriptedDetector::new(vec![
        vec![("tag_0", pose([0.0; 3]))],
        vec![("tag_0", pose([0.0; 3]))],
    ]);
    let mut estimator = PoseEstimationLoop::new(detector);
    let mut config = MarkerConfig::default();
    config.set_default_size(55.0).expect("size");
    config.load_layout("markers.yml");

    estimator
        .run(&mut session, &config, TargetSelector::Any)
        .expect("first run");
    config.reset();
    estimator
        .run(&mut session, &config, TargetSelector::Any)
        .expect("second run");

    let setups = &estimator.detector().setups;
    assert_eq!(setups.len(), 2);
    assert_eq!(setups[0].frame_size(), (640, 480));
    assert_eq!(setups[0].intrinsics.focal_length, 380.0);
    assert_eq!(setups[0].camera_matrix[(0, 2)], 320.0);
    assert_eq!(setups[0].camera_matrix[(1, 2)], 240.0);
    assert_eq!(setups[0].default_marker_size_mm, 55.0);
    assert_eq!(setups[0].layout_path, Some(PathBuf::from("markers.yml")));
    assert_eq!(setups[1].default_marker_size_mm, 30.0);
    assert_eq!(setups[1].layout_path, None);
}

#[test]
fn layout_failure_surfaces_before_any_frame() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let mut detector = ScriptedDetector::new(vec![vec![("tag_1", pose([0.0; 3]))]]);
    detector.fail_on_layout = true;
    let mut estimator = PoseEstimationLoop::new(detector);
    let mut config = MarkerConfig::default();
    config.load_layout("missing.yml");

    let err = estimator
        .run(&mut session, &config, TargetSelector::Any)
        .expect_err("layout");
    assert!(matches!(
        err,
        EstimateError::Detector(DetectorError::Layout { .. })
    ));
    assert_eq!(stats.borrow().requested, 0);
}

#[test]
fn frame_limit_bounds_the_wait() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let mut estimator = PoseEstimationLoop::new(ScriptedDetector::new(vec![]))
        .with_limits(LoopLimits::unbounded().with_max_frames(4));

    let err = estimator
        .run(
            &mut session,
            &MarkerConfig::default(),
            TargetSelector::Marker(1),
        )
        .expect_err("never found");
    assert!(matches!(err, EstimateError::FrameLimitReached { frames: 4 }));
    assert_eq!(stats.borrow().requested, 4);
    assert_eq!(stats.borrow().released, 4);
}

#[test]
fn zero_timeout_fails_without_pulling_frames() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::Low);
    let mut estimator = PoseEstimationLoop::new(ScriptedDetector::new(vec![]))
        .with_limits(LoopLimits::unbounded().with_timeout(std::time::Duration::ZERO));

    let err = estimator
        .run(&mut session, &MarkerConfig::default(), TargetSelector::Any)
        .expect_err("timeout");
    assert!(matches!(err, EstimateError::TimedOut { .. }));
    assert_eq!(stats.borrow().requested, 0);
}

#[test]
fn closed_session_is_rejected() {
    let stats = Rc::new(RefCell::new(Accounting::default()));
    let mut session = CameraSession::new(StrictCamera {
        stats: Rc::clone(&stats),
        resolution: Resolution::Low,
    });
    let mut estimator = PoseEstimationLoop::new(ScriptedDetector::new(vec![]));
    let err = estimator
        .run(&mut session, &MarkerConfig::default(), TargetSelector::Any)
        .expect_err("closed");
    assert!(matches!(
        err,
        EstimateError::Camera(CameraError::InvalidState { .. })
    ));
}

#[test]
fn missing_table_entry_is_a_configuration_error() {
    let (mut session, stats) = open_session(CameraIdentity::Secondary, Resolution::High);
    let table = IntrinsicsTable::from_entries([IntrinsicsEntry {
        camera: CameraIdentity::Secondary,
        resolution: Resolution::Low,
        focal_length: 275.0,
    }])
    .expect("table");
    let mut estimator =
        PoseEstimationLoop::new(ScriptedDetector::new(vec![])).with_table(table);

    let err = estimator
        .run(&mut session, &MarkerConfig::default(), TargetSelector::Any)
        .expect_err("no VGA entry");
    assert!(matches!(err, EstimateError::Intrinsics(_)));
    assert_eq!(stats.borrow().requested, 0);
}
