use std::sync::Arc;

use sqlbench_core::testing::ScriptedClient;
use sqlbench_core::{
    source_for_path, EquivalenceJudge, Evaluation, GenerationOptions, GroundTruthItem, GroundTruthSource,
    VecGroundTruth,
};
use sqlbench_store::EcommerceDb;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: Inline ground truth with scripted models
    let items = vec![
        GroundTruthItem::new("How many customers are there?", r#"SELECT COUNT(*) FROM "Customers";"#, r#"[{"COUNT(*)":10}]"#),
        GroundTruthItem::new(
            "What is the name of the most expensive product?",
            r#"SELECT "name" FROM "Products" ORDER BY "price" DESC LIMIT 1;"#,
            r#"[{"name":"Product 10"}]"#,
        ),
    ];

    // The first answer to the second question names a table that does not exist,
    // so the model sees the error and tries again.
    let model = Arc::new(ScriptedClient::new(
        "Offline",
        "scripted",
        vec![
            "SELECT COUNT(*) FROM Customers",
            "SELECT name FROM Product ORDER BY price DESC LIMIT 1",
            "SELECT name FROM Products ORDER BY price DESC LIMIT 1",
        ],
    ));
    let judge = Arc::new(ScriptedClient::new("Offline", "judge", vec!["Functional", "Functional"]));

    let eval = Evaluation::builder()
        .ground_truth(Arc::new(VecGroundTruth::new(items)))
        .add_model(model)
        .judge(Arc::new(EquivalenceJudge::new(judge, GenerationOptions::default())))
        .executor(Arc::new(EcommerceDb::in_memory()?))
        .build()?;

    for report in eval.run().await? {
        println!("{}", report.summary_table());
    }

    // Example 2: Load ground truth from a .md or .csv file if provided and echo the reference SQL
    if let Some(path) = std::env::args().nth(1) {
        let source = source_for_path(path);
        let items = source.load().await?;
        let echo = Arc::new(ScriptedClient::new("Offline", "echo", items.iter().map(|i| i.sql.clone())));
        let eval = Evaluation::builder()
            .ground_truth(Arc::new(VecGroundTruth::new(items)))
            .add_model(echo)
            .executor(Arc::new(EcommerceDb::in_memory()?))
            .build()?;
        for report in eval.run().await? {
            println!("{}", report.summary_table());
        }
    }

    Ok(())
}
