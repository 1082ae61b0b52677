//! End-to-end worker scenarios exercising ingestion, mapping, pipelines, and
//! publication together.

#![cfg(test)]

use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::clients::vrs::{MappedScore, TargetReference, VrsMappingResults};
use crate::error::CoreError;
use crate::jobs::manager::JobOutcome;
use crate::jobs::pipeline::PipelineManager;
use crate::jobs::test_support::{empty_clients, test_context_with, StubVrs};
use crate::jobs::variants::creation::CreateVariantsParams;
use crate::jobs::variants::mapping::MapVariantsParams;
use crate::jobs::AppContext;
use crate::store::models::{
    JobFunction, MappingState, PipelineStatus, PipelineStep, ProcessingState, TargetGene,
    TargetSequence,
};
use crate::urns::publish_score_set;
use crate::validation::target::SequenceType;

const SCORES_CSV: &str = "\
hgvs_nt,hgvs_pro,hgvs_splice,score\n\
g.4A>G,p.Thr2Ala,c.4A>G,1.0\n\
g.5C>G,p.Thr2Arg,c.5C>G,0.5\n\
g.6A>G,p.Thr2=,c.6A>G,1.5\n";

async fn seed(ctx: &AppContext) -> (i64, i64) {
    let mut store = ctx.db.lock().await;
    let user = store.create_user("0000-0001-2345-6789", vec![]);
    let experiment = store.create_experiment("exp", None, Some(user)).unwrap();
    let score_set = store.create_score_set("ss", experiment, Some(user)).unwrap();
    store
        .add_target_gene(TargetGene {
            score_set_id: score_set,
            name: "TEST1".to_owned(),
            target_sequence: Some(TargetSequence {
                sequence: "ATGACA".to_owned(),
                sequence_type: SequenceType::Dna,
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
    store.commit();
    (score_set, user)
}

fn successful_mapping(urn: &str, n: usize) -> VrsMappingResults {
    let mut results = VrsMappingResults {
        mapped_date_utc: Some("2026-08-01T00:00:00Z".to_owned()),
        dcd_mapping_version: "1.2.3".to_owned(),
        ..Default::default()
    };
    results
        .reference_sequences
        .insert("TEST1".to_owned(), TargetReference::default());
    for i in 1..=n {
        results.mapped_scores.push(MappedScore {
            mavedb_id: format!("{}#{}", urn, i),
            pre_mapped: Some(serde_json::json!({"id": format!("pre{}", i)})),
            post_mapped: Some(serde_json::json!({"id": format!("post{}", i)})),
            vrs_version: Some("2.0".to_owned()),
            error_message: None,
        });
    }
    results
}

fn creation_step(score_set: i64, user: i64) -> PipelineStep {
    PipelineStep {
        function: JobFunction::CreateVariantsForScoreSet,
        params: serde_json::to_value(CreateVariantsParams {
            score_set_id: score_set,
            updater_id: user,
            scores_csv: SCORES_CSV.to_owned(),
            counts_csv: None,
            score_columns_metadata: None,
            count_columns_metadata: None,
        })
        .unwrap(),
    }
}

fn mapping_step(score_set: i64) -> PipelineStep {
    PipelineStep {
        function: JobFunction::MapVariantsForScoreSet,
        params: serde_json::to_value(MapVariantsParams {
            score_set_id: score_set,
            updater_id: None,
        })
        .unwrap(),
    }
}

async fn drain(ctx: &AppContext) {
    crate::jobs::run_worker(ctx, std::time::Duration::from_millis(1), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn queue_driven_ingest_maps_and_publishes() {
    // Ingest through the queue + manager gate, then map, publish, export.
    let ctx_seed = test_context_with(empty_clients());
    let (score_set, user) = seed(&ctx_seed).await;
    let urn = ctx_seed.db.lock().await.score_set(score_set).unwrap().urn.clone();

    let mut clients = empty_clients();
    clients.vrs = Arc::new(StubVrs::new(vec![Ok(successful_mapping(&urn, 3))]));
    let ctx = AppContext {
        clients,
        ..ctx_seed
    };

    crate::jobs::enqueue_job(
        &ctx,
        "variant_creation",
        JobFunction::CreateVariantsForScoreSet,
        creation_step(score_set, user).params,
        0,
    )
    .await;
    // Drain runs creation, then the mapper manager, then the mapping job it
    // queued.
    drain(&ctx).await;

    {
        let store = ctx.db.lock().await;
        let row = store.score_set(score_set).unwrap();
        assert_eq!(ProcessingState::Success, row.processing_state);
        assert_eq!(Some(MappingState::Complete), row.mapping_state);
        assert_eq!(3, store.current_mapped_variants().len());
    }

    // Publish and verify the structured URNs flow through to the export.
    {
        let mut store = ctx.db.lock().await;
        publish_score_set(&mut store, score_set, crate::common::today()).unwrap();
        store.commit();

        let row = store.score_set(score_set).unwrap();
        assert_eq!("urn:mavedb:00000001-a-1", row.urn);
        assert!(!row.private);

        let csv = crate::score_sets::get_score_set_scores_as_csv(
            &store, score_set, None, None, false,
        )
        .unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            "accession,hgvs_nt,hgvs_splice,hgvs_pro,score",
            lines.next().unwrap()
        );
        assert!(lines.next().unwrap().starts_with("urn:mavedb:00000001-a-1#1,"));
    }
}

#[tokio::test]
async fn pipeline_retry_recovers_from_a_transient_mapping_error() {
    // Two-step pipeline (create → map); the first mapping attempt hits a
    // transient upstream error. With one retry available, the pipeline
    // stays RUNNING through the retry and finishes SUCCEEDED.
    let ctx_seed = test_context_with(empty_clients());
    let (score_set, user) = seed(&ctx_seed).await;
    let urn = ctx_seed.db.lock().await.score_set(score_set).unwrap().urn.clone();

    let mut clients = empty_clients();
    clients.vrs = Arc::new(StubVrs::new(vec![
        Err(CoreError::Transport("upstream 503".to_owned())),
        Ok(successful_mapping(&urn, 3)),
    ]));
    let ctx = AppContext {
        clients,
        ..ctx_seed
    };

    let pipeline_id = PipelineManager::create_pipeline(
        &ctx,
        "variant_processing",
        vec![creation_step(score_set, user), mapping_step(score_set)],
        1,
    )
    .await
    .unwrap();

    // Run the creation step; coordination enqueues the mapping step.
    let creation_job = ctx.queue.dequeue_job().await.unwrap();
    crate::jobs::execute_job(&ctx, creation_job).await;
    {
        let store = ctx.db.lock().await;
        assert_eq!(
            PipelineStatus::Running,
            store.pipeline(pipeline_id).unwrap().status
        );
    }

    // First mapping attempt fails and is retried; the pipeline stays
    // RUNNING.
    let mapping_job = ctx.queue.dequeue_job().await.unwrap();
    let result = crate::jobs::execute_job(&ctx, mapping_job).await;
    assert_eq!(JobOutcome::Retried, result.status);
    {
        let store = ctx.db.lock().await;
        assert_eq!(
            PipelineStatus::Running,
            store.pipeline(pipeline_id).unwrap().status
        );
    }

    // The retried attempt succeeds and terminates the pipeline.
    let retried_job = ctx.queue.dequeue_job().await.unwrap();
    assert_eq!(mapping_job, retried_job);
    let result = crate::jobs::execute_job(&ctx, retried_job).await;
    assert_eq!(JobOutcome::Ok, result.status);

    let store = ctx.db.lock().await;
    assert_eq!(
        PipelineStatus::Succeeded,
        store.pipeline(pipeline_id).unwrap().status
    );
    assert_eq!(
        Some(MappingState::Complete),
        store.score_set(score_set).unwrap().mapping_state
    );
}

#[tokio::test]
async fn pipeline_without_retries_fails_terminally() {
    let ctx_seed = test_context_with(empty_clients());
    let (score_set, user) = seed(&ctx_seed).await;

    let mut clients = empty_clients();
    clients.vrs = Arc::new(StubVrs::new(vec![Err(CoreError::Transport(
        "upstream 503".to_owned(),
    ))]));
    let ctx = AppContext {
        clients,
        ..ctx_seed
    };

    let pipeline_id = PipelineManager::create_pipeline(
        &ctx,
        "variant_processing",
        vec![creation_step(score_set, user), mapping_step(score_set)],
        0,
    )
    .await
    .unwrap();
    drain(&ctx).await;

    let store = ctx.db.lock().await;
    assert_eq!(
        PipelineStatus::Failed,
        store.pipeline(pipeline_id).unwrap().status
    );
    let row = store.score_set(score_set).unwrap();
    assert_eq!(Some(MappingState::Failed), row.mapping_state);
    assert!(row.mapping_errors.is_some());
}
