use std::path::PathBuf;
use std::sync::Arc;

use sqlbench_core::testing::{assert_all_executed, assert_result_match_rate, ScriptedClient};
use sqlbench_core::{
    comparator, markdown_to_csv, CsvGroundTruth, EquivalenceJudge, EquivalenceVerdict, Evaluation,
    GenerationOptions, GroundTruthSource, MarkdownGroundTruth, QueryExecutor, VecGroundTruth,
};
use sqlbench_store::EcommerceDb;

fn ground_truth_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/ground-truth.md")
}

#[tokio::test]
async fn recorded_results_match_the_seeded_database() {
    let items = MarkdownGroundTruth::new(ground_truth_path()).load().await.unwrap();
    assert_eq!(items.len(), 7);

    let db = EcommerceDb::in_memory().unwrap();
    for item in &items {
        let rows = db.execute(&item.sql).unwrap();
        let serialized = comparator::serialize(&rows).unwrap();
        assert!(
            comparator::matches(&serialized, &item.result),
            "{}: got {} expected {}",
            item.query,
            serialized,
            item.result
        );
    }
}

#[tokio::test]
async fn converted_csv_loads_the_same_items() {
    let dir = tempfile::tempdir().unwrap();
    let md = dir.path().join("ground-truth.md");
    tokio::fs::copy(ground_truth_path(), &md).await.unwrap();

    let csv = markdown_to_csv(&md).await.unwrap();
    let from_csv = CsvGroundTruth::new(csv).load().await.unwrap();
    let from_md = MarkdownGroundTruth::new(&md).load().await.unwrap();
    assert_eq!(from_csv, from_md);
}

#[tokio::test]
async fn models_are_scored_independently() {
    let items = MarkdownGroundTruth::new(ground_truth_path()).load().await.unwrap();

    // answers every question with the reference query
    let perfect = Arc::new(ScriptedClient::new("Local", "perfect", items.iter().map(|i| i.sql.clone())));
    // misses a table name once per question, then recovers
    let repairing = Arc::new(ScriptedClient::new(
        "Local",
        "repairing",
        items.iter().flat_map(|i| vec!["SELECT * FROM Nowhere".to_string(), i.sql.clone()]),
    ));
    let judge_client = Arc::new(ScriptedClient::new("Local", "judge", Vec::<&str>::new()));

    let evaluation = Evaluation::builder()
        .ground_truth(Arc::new(VecGroundTruth::new(items.clone())))
        .add_model(repairing.clone())
        .add_model(perfect.clone())
        .judge(Arc::new(EquivalenceJudge::new(judge_client.clone(), GenerationOptions::new(50))))
        .executor(Arc::new(EcommerceDb::in_memory().unwrap()))
        .build()
        .unwrap();

    let reports = evaluation.run().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].model, "Local : repairing");
    assert_eq!(reports[1].model, "Local : perfect");

    for report in &reports {
        assert_all_executed(report).unwrap();
        assert_result_match_rate(report, 1.0).unwrap();
        assert_eq!(report.summary.exact, items.len());
    }
    assert!(reports[1].items.iter().all(|i| i.attempts() == 1 && i.failed_attempts.is_empty()));
    for item in &reports[0].items {
        assert_eq!(item.attempts(), 2);
        assert_eq!(item.failed_attempts.len(), 1);
        assert_eq!(item.failed_attempts[0].error, "no such table: Nowhere");
    }

    // history for one question never leaks into the next
    let prompts = repairing.prompts();
    assert_eq!(prompts.len(), items.len() * 2);
    for pair in prompts.chunks(2) {
        assert_eq!(pair[0].0.matches("Generated failed sql query").count(), 0);
        assert_eq!(pair[1].0.matches("Generated failed sql query").count(), 1);
    }
    // nor from one model into the next
    let base = &prompts[0].0;
    assert!(perfect.prompts().iter().all(|(system, _)| system == base));

    assert_eq!(perfect.calls(), items.len());
    assert_eq!(judge_client.calls(), 0);
}

#[tokio::test]
async fn exhausted_model_does_not_stop_the_run() {
    let items = MarkdownGroundTruth::new(ground_truth_path()).load().await.unwrap();
    let broken = Arc::new(ScriptedClient::with_results(
        "Remote",
        "offline",
        std::iter::repeat_with(|| Err("connection refused".to_string())).take(items.len() * 3),
    ));
    let judge_client = Arc::new(ScriptedClient::new("Local", "judge", Vec::<&str>::new()));

    let reports = Evaluation::builder()
        .ground_truth(Arc::new(VecGroundTruth::new(items.clone())))
        .add_model(broken.clone())
        .judge(Arc::new(EquivalenceJudge::new(judge_client, GenerationOptions::default())))
        .executor(Arc::new(EcommerceDb::in_memory().unwrap()))
        .max_retries(2)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let report = &reports[0];
    assert_eq!(report.summary.exhausted, items.len());
    assert_eq!(report.summary.result_match_rate, 0.0);
    assert!(assert_all_executed(report).is_err());
    assert!(report.items.iter().all(|i| i.invocation_errors.len() == 3 && i.verdict.is_none()));
    assert_eq!(broken.calls(), items.len() * 3);
    assert!(report.summary_table().contains("Remote : offline"));
}

#[tokio::test]
async fn functional_verdicts_come_from_the_judge() {
    let items = vec![sqlbench_core::GroundTruthItem::new(
        "How many units of Product 7 have been sold?",
        r#"SELECT SUM("quantity") AS "total_sold" FROM "Order_Products" WHERE "product_id" = (SELECT "id" FROM "Products" WHERE "name" = 'Product 7');"#,
        r#"[{"total_sold":21}]"#,
    )];
    let model = Arc::new(ScriptedClient::new(
        "Local",
        "joiner",
        vec!["SELECT SUM(quantity)\nFROM Order_Products JOIN Products ON Order_Products.product_id = Products.id\nWHERE name = 'Product 7'"],
    ));
    let judge_client = Arc::new(ScriptedClient::new("Local", "judge", vec!["Functional"]));

    let reports = Evaluation::builder()
        .ground_truth(Arc::new(VecGroundTruth::new(items)))
        .add_model(model)
        .judge(Arc::new(EquivalenceJudge::new(judge_client.clone(), GenerationOptions::default())))
        .executor(Arc::new(EcommerceDb::in_memory().unwrap()))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let item = &reports[0].items[0];
    assert_eq!(item.verdict, Some(EquivalenceVerdict::Functional));
    // column is named SUM(quantity) rather than total_sold
    assert!(!item.result_match);
    assert_eq!(item.rows.as_deref(), Some(r#"[{"SUM(quantity)":21}]"#));

    let (_, user) = judge_client.prompts().pop().unwrap();
    assert!(user.ends_with("WHERE name = 'Product 7'"));
    // the candidate reaches the judge on a single line
    assert_eq!(user.matches('\n').count(), 1);
}
