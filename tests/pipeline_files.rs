mod common;

use std::path::{Path, PathBuf};

use futures::stream;

use common::*;
use sdm_analyzer::{
    gateway::FileEntry, job::Job, Acquisition, ContainerKind, Outcome, Scheduler,
};

fn pipeline(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("pipelines").join(name)
}

fn acquisition(id: &str, label: &str, measurement: Option<&str>, files: &[&str]) -> Acquisition {
    Acquisition {
        id: id.to_string(),
        label: label.to_string(),
        measurement: measurement.map(str::to_string),
        files: files.iter().map(|n| FileEntry { name: n.to_string() }).collect(),
    }
}

#[tokio::test(start_paused = true)]
async fn afq_pipeline_runs_end_to_end() {
    let job = Job::from_file(&pipeline("afq.toml")).unwrap();
    let gateway = MockGateway::new();
    gateway.with(|s| {
        s.gears = gears(&["dtiinit", "afq"]);
        s.sessions = vec![session("s2", 2), session("s1", 1)];
        s.acquisitions.insert(
            "s1".to_string(),
            vec![acquisition(
                "acq-dwi",
                "DTI 2mm",
                Some("diffusion"),
                &["dwi_1000.bvec", "dwi_1000.bval", "dwi_1000.nii.gz", "dwi_2000.nii.gz"],
            )],
        );
        s.outputs.insert("dtiinit1000".to_string(), vec!["dtiInit_s1.zip".to_string()]);
        s.complete_after_reads = Some(1);
    });
    let scheduler = Scheduler::new(gateway.clone(), job.batch_options());

    let report = scheduler
        .run_until(job.operations().unwrap(), &project(), stream::pending())
        .await
        .unwrap();

    // session_limit = 1 keeps only the earliest session
    assert_eq!(report.outcomes, vec![("s1".to_string(), Outcome::Completed)]);
    assert_eq!(gateway.submitted_labels("s1"), vec!["dtiinit1000", "afq1000"]);

    let (dtiinit, afq) = gateway.with(|s| (s.submissions[0].1.clone(), s.submissions[1].1.clone()));
    assert_eq!(dtiinit.inputs["dwi"].name, "dwi_1000.nii.gz");
    assert_eq!(dtiinit.inputs["bval"].name, "dwi_1000.bval");
    assert_eq!(afq.inputs["dtiInit_Archive"].kind, ContainerKind::Analysis);
    assert_eq!(afq.inputs["dtiInit_Archive"].name, "dtiInit_s1.zip");
}

#[tokio::test(start_paused = true)]
async fn engage_pipeline_skips_sessions_without_the_task() {
    let job = Job::from_file(&pipeline("engage-gonogo.toml")).unwrap();
    let operations = job.operations().unwrap();
    assert_eq!(operations.len(), 3);

    let gateway = MockGateway::new();
    gateway.with(|s| {
        s.gears = gears(&[
            "reactivity-preprocessing",
            "connectivity-preprocessing",
            "first-level-models",
        ]);
        s.sessions = vec![session("s1", 1)];
        s.acquisitions.insert(
            "s1".to_string(),
            vec![acquisition("acq-t1", "T1w 1mm", Some("anatomy_t1w"), &["t1.nii.gz"])],
        );
    });
    let scheduler = Scheduler::new(gateway.clone(), job.batch_options());

    let report = scheduler
        .run_until(operations, &project(), stream::pending())
        .await
        .unwrap();

    assert_eq!(report.outcome("s1"), Some(&Outcome::Completed));
    assert_eq!(gateway.total_submissions(), 0);
    // acquisitions are fetched once per session, not per stage
    assert_eq!(gateway.acquisition_reads("s1"), 1);
}

#[tokio::test(start_paused = true)]
async fn engage_pipeline_feeds_first_level_models_every_input() {
    let job = Job::from_file(&pipeline("engage-gonogo.toml")).unwrap();
    let gateway = MockGateway::new();
    gateway.with(|s| {
        s.gears = gears(&[
            "reactivity-preprocessing",
            "connectivity-preprocessing",
            "first-level-models",
        ]);
        s.sessions = vec![session("s1", 1)];
        s.acquisitions.insert(
            "s1".to_string(),
            vec![
                acquisition("acq-gng", "go-no-go 2", Some("functional"), &["gonogo.nii.gz"]),
                acquisition("acq-t1", "T1w 1mm", Some("anatomy_t1w"), &["t1.nii.gz"]),
                acquisition("acq-beh", "Behavioral and Physiological", None, &["s1_GoNoGo.txt"]),
            ],
        );
        s.outputs.insert(
            "reactivity-preprocessing (go-no-go 2)".to_string(),
            [
                "realigned_unwarped_files@@func_data.nii",
                "highres2standard_warp@@warp.nii.gz",
                "example_func2highres_mat@@example_func2highres.mat",
                "highres2example_func_mat@@highres2example_func.mat",
                "smoothed@@s02_globalremoved_func_data.nii",
                "example_func@@example_func.nii.gz",
                "brain_fnirt_mask@@T1_brain_fnirt_mask.nii.gz",
                "wFD@@spike_regressors_wFD.mat",
            ]
            .iter()
            .map(|n| n.to_string())
            .collect(),
        );
        s.outputs.insert(
            "connectivity-preprocessing (go-no-go 2)".to_string(),
            vec!["result@@swa01_normalized_func_data.nii".to_string()],
        );
        s.complete_after_reads = Some(1);
    });
    let scheduler = Scheduler::new(gateway.clone(), job.batch_options());

    let report = scheduler
        .run_until(job.operations().unwrap(), &project(), stream::pending())
        .await
        .unwrap();

    assert_eq!(report.outcome("s1"), Some(&Outcome::Completed));
    assert_eq!(gateway.total_submissions(), 3);
    let models = gateway.with(|s| s.submissions[2].1.clone());
    assert_eq!(models.gear_name, "first-level-models");

    let names: Vec<&str> = models.inputs.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "behavioral",
            "connectivity_functional",
            "example_func",
            "example_func2highres",
            "highres2example_func",
            "highres2standard_warp",
            "reactivity_functional",
            "spike_regressors_wFD",
            "structural_brain_fnirt_mask",
        ]
    );
    assert_eq!(models.inputs["behavioral"].id, "acq-beh");
    assert_eq!(models.inputs["connectivity_functional"].id, "an-2");
    assert_eq!(models.inputs["structural_brain_fnirt_mask"].id, "an-1");
    assert_eq!(
        models.inputs["structural_brain_fnirt_mask"].name,
        "brain_fnirt_mask@@T1_brain_fnirt_mask.nii.gz"
    );
    assert_eq!(models.inputs["highres2example_func"].name, "highres2example_func_mat@@highres2example_func.mat");
    assert_eq!(config_value(&models, "task_type"), serde_json::json!("gonogo"));
}
