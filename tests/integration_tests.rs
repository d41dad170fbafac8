//! Integration tests for parity-validation
//!
//! Tests the full pipeline from test case generation through dual execution,
//! certification, and reporting.

use parity_validation::generator::{InputVector, Value};
use parity_validation::report::FailureDetail;
use parity_validation::runner::{ExecutionStatus, FailureReason};
use parity_validation::{
    DistributionVerdict, Error, FnArtifact, InputDomain, OutputKind, ParamType, ParityEngine,
    ReportFormat, ValidationConfig, Verdict,
};

type FnResult = std::result::Result<String, String>;

fn float_domain() -> InputDomain {
    InputDomain::default()
        .with_parameter("x", ParamType::Float { min: -1000.0, max: 1000.0 })
        .with_parameter("y", ParamType::Float { min: 0.5, max: 2.0 })
}

/// Five options and a wide integer: case 3 is the only one with `("d", 0)`
fn marked_domain() -> InputDomain {
    InputDomain::default()
        .with_parameter(
            "op",
            ParamType::Choice {
                options: ["a", "b", "c", "d", "e"].map(String::from).to_vec(),
            },
        )
        .with_parameter("n", ParamType::Int { min: 0, max: 1_000_000 })
}

fn float(inputs: &InputVector, name: &str) -> f64 {
    match inputs.get(name) {
        Some(Value::Float(v)) => *v,
        _ => f64::NAN,
    }
}

fn is_case_three(inputs: &InputVector) -> bool {
    matches!(
        (inputs.get("op"), inputs.get("n")),
        (Some(Value::Text(op)), Some(Value::Int(0))) if op == "d"
    )
}

fn reference_product(inputs: &InputVector) -> FnResult {
    Ok(format!("{:?}", float(inputs, "x") * float(inputs, "y")))
}

fn candidate_product(inputs: &InputVector) -> FnResult {
    // the same value through a different, slightly lossy route
    let x = float(inputs, "x");
    let y = float(inputs, "y");
    Ok(format!("{:?}", (x * y) * (1.0 + 1e-9)))
}

fn fake_digest(inputs: &InputVector) -> FnResult {
    let json = inputs.to_json().map_err(|e| e.to_string())?;
    let folded = json
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
    Ok(format!("{folded:016x}"))
}

fn echo_marked(inputs: &InputVector) -> FnResult {
    Ok(format!("{}", inputs.len()))
}

#[test]
fn test_all_within_epsilon_is_certified() {
    let config = ValidationConfig::default()
        .with_sample_size(100)
        .with_min_confidence(0.93);
    let engine = ParityEngine::new(config).unwrap();
    let reference = FnArtifact::new("reference", reference_product);
    let candidate = FnArtifact::new("candidate", candidate_product);

    let report = engine
        .validate(&reference, &candidate, &float_domain())
        .unwrap();

    assert_eq!(report.status, Verdict::Certified);
    assert_eq!(report.test_cases, 100);
    assert_eq!(report.failures, 0);
    assert!(report.max_deviation > 0.0);
    assert!(report.max_deviation <= 1e-6);
    assert!(report.mean_deviation <= report.max_deviation);
    assert!(report.confidence >= 0.93);
    assert_eq!(report.distribution_test, DistributionVerdict::Pass);
}

#[test]
fn test_default_threshold_needs_more_cases() {
    let engine = ParityEngine::new(ValidationConfig::default().with_sample_size(100)).unwrap();
    let reference = FnArtifact::new("reference", reference_product);
    let report = engine
        .validate(&reference, &reference, &float_domain())
        .unwrap();
    // 100 clean cases bound the pass rate near 93.8%, below 99.9%
    assert_eq!(report.failures, 0);
    assert_eq!(report.status, Verdict::Failed);
}

#[test]
fn test_exact_hash_500_cases() {
    let config = ValidationConfig::default()
        .with_sample_size(500)
        .with_output_kind(OutputKind::ExactHash)
        .with_min_confidence(0.98);
    let engine = ParityEngine::new(config).unwrap();
    let reference = FnArtifact::new("reference", fake_digest);
    let candidate = FnArtifact::new("candidate", fake_digest);

    let report = engine
        .validate(&reference, &candidate, &marked_domain())
        .unwrap();

    assert_eq!(report.test_cases, 500);
    assert_eq!(report.failures, 0);
    assert_eq!(report.max_deviation, 0.0);
    assert_eq!(report.distribution_test, DistributionVerdict::NotApplicable);
    assert_eq!(report.status, Verdict::Certified);
}

#[test]
fn test_exact_hash_mismatch_reports_digests() {
    let config = ValidationConfig::default()
        .with_sample_size(20)
        .with_output_kind(OutputKind::ExactHash);
    let engine = ParityEngine::new(config).unwrap();
    let reference = FnArtifact::new("reference", fake_digest);
    let candidate = FnArtifact::new("candidate", |inputs: &InputVector| {
        let digest = fake_digest(inputs)?;
        Ok(if is_case_three(inputs) { format!("{digest}0") } else { digest })
    });

    let report = engine
        .validate(&reference, &candidate, &marked_domain())
        .unwrap();

    assert_eq!(report.failures, 1);
    let FailureDetail { index, reason, outputs, .. } = &report.failure_details[0];
    assert_eq!(*index, 3);
    assert_eq!(*reason, FailureReason::Mismatch);
    let outputs = outputs.as_ref().unwrap();
    assert_ne!(outputs.reference_digest, outputs.candidate_digest);
}

#[test]
fn test_reference_crash_aborts_run() {
    let engine = ParityEngine::new(ValidationConfig::default().with_sample_size(100)).unwrap();
    let reference = FnArtifact::new("reference", |inputs: &InputVector| {
        if is_case_three(inputs) {
            panic!("reference crashed");
        }
        echo_marked(inputs)
    });
    let candidate = FnArtifact::new("candidate", echo_marked);

    let err = engine
        .validate(&reference, &candidate, &marked_domain())
        .unwrap_err();

    assert_eq!(err.kind(), "ReferenceUnavailable");
    match err {
        Error::Runner(parity_validation::runner::Error::ReferenceUnavailable {
            index,
            status,
            ..
        }) => {
            assert_eq!(index, 3);
            assert_eq!(status, ExecutionStatus::Crashed);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_empty_sample_is_inconclusive() {
    let engine = ParityEngine::new(ValidationConfig::default().with_sample_size(0)).unwrap();
    let reference = FnArtifact::new("reference", reference_product);

    let report = engine
        .validate(&reference, &reference, &float_domain())
        .unwrap();

    assert_eq!(report.status, Verdict::Inconclusive);
    assert_eq!(report.confidence, 0.0);
    assert_eq!(report.test_cases, 0);
}

#[test]
fn test_single_candidate_crash_fails() {
    let engine = ParityEngine::new(ValidationConfig::default().with_sample_size(100)).unwrap();
    let reference = FnArtifact::new("reference", echo_marked);
    let candidate = FnArtifact::new("candidate", |inputs: &InputVector| {
        if is_case_three(inputs) {
            panic!("candidate crashed");
        }
        echo_marked(inputs)
    });

    let report = engine
        .validate(&reference, &candidate, &marked_domain())
        .unwrap();

    assert_eq!(report.test_cases, 100);
    assert_eq!(report.failures, 1);
    assert_eq!(report.max_deviation, 1.0);
    assert_eq!(report.status, Verdict::Failed);
    assert_eq!(report.failure_details[0].reason, FailureReason::CandidateCrashed);
}

#[test]
fn test_identical_runs_are_bit_identical() {
    let reference = FnArtifact::new("reference", reference_product);
    let candidate = FnArtifact::new("candidate", candidate_product);
    let render = |workers: usize| {
        let config = ValidationConfig::default()
            .with_sample_size(200)
            .with_seed(1234)
            .with_workers(workers);
        let engine = ParityEngine::new(config).unwrap();
        let report = engine
            .validate(&reference, &candidate, &float_domain())
            .unwrap();
        engine.reporter().render(&report, ReportFormat::Json).unwrap()
    };

    let first = render(1);
    let second = render(1);
    let parallel = render(8);
    assert_eq!(first, second);
    assert_eq!(first, parallel);
}

#[test]
fn test_different_seeds_generate_different_cases() {
    let a = ParityEngine::new(ValidationConfig::default().with_seed(1)).unwrap();
    let b = ParityEngine::new(ValidationConfig::default().with_seed(2)).unwrap();
    assert_ne!(
        a.test_cases(&float_domain()).unwrap(),
        b.test_cases(&float_domain()).unwrap()
    );
}

#[test]
fn test_out_of_tolerance_detected() {
    let config = ValidationConfig::default()
        .with_sample_size(50)
        .with_min_confidence(0.5);
    let engine = ParityEngine::new(config).unwrap();
    let reference = FnArtifact::new("reference", reference_product);
    let candidate = FnArtifact::new("candidate", |inputs: &InputVector| {
        let value = float(inputs, "x") * float(inputs, "y");
        Ok(format!("{:?}", value * 1.001))
    });

    let report = engine
        .validate(&reference, &candidate, &float_domain())
        .unwrap();

    assert_eq!(report.status, Verdict::Failed);
    assert!(report.failures > 0);
    assert!(report
        .failure_details
        .iter()
        .all(|f| f.reason == FailureReason::OutOfTolerance));
}

#[test]
fn test_run_deadline_aborts() {
    let config = ValidationConfig::default()
        .with_sample_size(200)
        .with_workers(2)
        .with_run_timeout_ms(100);
    let engine = ParityEngine::new(config).unwrap();
    let slow = FnArtifact::new("slow", |inputs: &InputVector| {
        std::thread::sleep(std::time::Duration::from_millis(10));
        reference_product(inputs)
    });

    let err = engine
        .validate(&slow, &slow, &float_domain())
        .unwrap_err();
    assert_eq!(err.kind(), "RunTimedOut");
}

#[test]
fn test_config_file_drives_engine_and_reports_written() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("parity.yaml");
    std::fs::write(
        &config_path,
        "sample_size: 60\nseed: 5\nmin_confidence: 0.9\nmax_failure_details: 3\n",
    )
    .unwrap();
    let engine = ParityEngine::new(ValidationConfig::load(&config_path).unwrap()).unwrap();
    let reference = FnArtifact::new("reference", reference_product);

    let report = engine
        .validate(&reference, &reference, &float_domain())
        .unwrap();
    assert_eq!(report.test_cases, 60);

    let reporter = engine.reporter();
    for format in ReportFormat::all() {
        let path = reporter
            .write_to_dir(&report, dir.path().join("reports"), format)
            .unwrap();
        assert!(path.exists());
    }
    let json = std::fs::read_to_string(dir.path().join("reports/parity-report.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for field in [
        "status",
        "test_cases",
        "failures",
        "max_deviation",
        "confidence",
        "distribution_test",
    ] {
        assert!(value.get(field).is_some(), "missing {field}");
    }
}

#[test]
fn test_domain_from_yaml() {
    let domain = InputDomain::from_yaml(
        r"
parameters:
  - name: x
    type: float
    min: -1.0
    max: 1.0
  - name: y
    type: float
    min: 0.5
    max: 2.0
",
    )
    .unwrap();
    let engine = ParityEngine::new(
        ValidationConfig::default()
            .with_sample_size(30)
            .with_min_confidence(0.8),
    )
    .unwrap();
    let reference = FnArtifact::new("reference", reference_product);
    let report = engine.validate(&reference, &reference, &domain).unwrap();
    assert_eq!(report.status, Verdict::Certified);
}

#[cfg(unix)]
mod process_artifacts {
    use super::*;
    use parity_validation::{InputMode, ProcessArtifact};

    fn sh(script: &str) -> ProcessArtifact {
        ProcessArtifact::new("sh")
            .with_name(script)
            .with_args(["-c", script, "artifact"])
            .with_input_mode(InputMode::Args)
    }

    fn int_domain() -> InputDomain {
        InputDomain::default().with_parameter("n", ParamType::Int { min: 0, max: 1000 })
    }

    #[test]
    fn test_shell_artifacts_with_output_pattern() {
        let config = ValidationConfig::default()
            .with_sample_size(40)
            .with_min_confidence(0.8)
            .with_output_pattern(r"Result: (\S+)")
            .with_workers(4);
        let engine = ParityEngine::new(config).unwrap();
        let reference = sh(r#"echo "Result: $(( $1 * 2 ))"; echo "Time: 1200ms""#);
        let candidate = sh(r#"echo "warming up"; echo "Result: $(( $1 + $1 ))""#);

        let report = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap();

        assert_eq!(report.failures, 0);
        assert_eq!(report.distribution_test, DistributionVerdict::Pass);
        assert_eq!(report.status, Verdict::Certified);
    }

    #[test]
    fn test_shell_candidate_timeouts_are_failures() {
        let config = ValidationConfig::default()
            .with_sample_size(4)
            .with_timeout_ms(200)
            .with_workers(4);
        let engine = ParityEngine::new(config).unwrap();
        let reference = sh(r#"echo "$1""#);
        let candidate = sh("exec sleep 10");

        let report = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap();

        assert_eq!(report.failures, 4);
        assert!(report
            .failure_details
            .iter()
            .all(|f| f.reason == FailureReason::CandidateTimeout));
    }

    #[test]
    fn test_shell_reference_timeout_aborts() {
        let config = ValidationConfig::default()
            .with_sample_size(3)
            .with_timeout_ms(200)
            .with_workers(1);
        let engine = ParityEngine::new(config).unwrap();
        let reference = sh("exec sleep 10");
        let candidate = sh(r#"echo "$1""#);

        let start = std::time::Instant::now();
        let err = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap_err();

        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        match err {
            Error::Runner(parity_validation::runner::Error::ReferenceUnavailable {
                index,
                status,
                ..
            }) => {
                assert_eq!(index, 0);
                assert_eq!(status, ExecutionStatus::Timeout);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shell_candidate_background_helper_times_out() {
        let config = ValidationConfig::default()
            .with_sample_size(4)
            .with_timeout_ms(200)
            .with_workers(4);
        let engine = ParityEngine::new(config).unwrap();
        let reference = sh(r#"echo "$1""#);
        let candidate = sh(r#"sleep 10 & echo "$1""#);

        let start = std::time::Instant::now();
        let report = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap();

        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(report.failures, 4);
        assert!(report
            .failure_details
            .iter()
            .all(|f| f.reason == FailureReason::CandidateTimeout));
    }

    #[test]
    fn test_shell_reference_non_zero_exit_aborts() {
        let engine = ParityEngine::new(ValidationConfig::default().with_sample_size(10)).unwrap();
        let reference = sh("echo broken >&2; exit 2");
        let candidate = sh(r#"echo "$1""#);

        let err = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap_err();

        assert!(err.is_reference_failure());
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_shell_candidate_exit_code_recorded() {
        let config = ValidationConfig::default().with_sample_size(5);
        let engine = ParityEngine::new(config).unwrap();
        let reference = sh(r#"echo "$1""#);
        let candidate = sh("exit 7");

        let report = engine
            .validate(&reference, &candidate, &int_domain())
            .unwrap();

        assert_eq!(report.failures, 5);
        assert_eq!(
            report.failure_details[0].reason,
            FailureReason::CandidateNonZeroExit { code: 7 }
        );
    }
}
