// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use criterion::*;
use progressive_db::{Database, DatabaseOptions};

const ROWS: usize = 65536;

async fn lineitem(chunk_size: usize) -> Database {
    let db = Database::new_in_memory(DatabaseOptions {
        chunk_size: Some(chunk_size),
        ..Default::default()
    })
    .await
    .unwrap();
    db.run("CREATE TABLE lineitem (l_quantity INT, l_returnflag CHAR(1), l_linestatus CHAR(1))")
        .await
        .unwrap();
    let values = (0..ROWS)
        .map(|i| {
            let flag = ["A", "N", "R"][i % 3];
            let status = ["F", "O"][i % 2];
            format!("({}, '{flag}', '{status}')", i % 50)
        })
        .collect::<Vec<_>>()
        .join(",");
    db.run(&format!("INSERT INTO lineitem VALUES {values}"))
        .await
        .unwrap();
    db.run("PREPARE TABLE lineitem").await.unwrap();
    db
}

const QUERY: &str = "l_returnflag, l_linestatus, SUM(l_quantity), AVG(l_quantity), COUNT(*) \
    FROM lineitem GROUP BY l_returnflag, l_linestatus ORDER BY l_returnflag, l_linestatus";

fn progressive_select(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("progressive select");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));
    for chunk_size in [256, 4096, 65536] {
        let db = runtime.block_on(lineitem(chunk_size));
        let sql = format!("SELECT PROGRESSIVE {QUERY}");
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, _| {
                b.to_async(&runtime)
                    .iter(|| async { db.run_to_end(&sql).await.unwrap() });
            },
        );
    }
    group.finish();
}

fn one_pass_select(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let db = runtime.block_on(lineitem(4096));
    let sql = format!("SELECT {QUERY}");
    c.bench_function("one-pass select", |b| {
        b.to_async(&runtime)
            .iter(|| async { db.run_to_end(&sql).await.unwrap() });
    });
}

fn view_advance(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let db = runtime.block_on(lineitem(4096));
    c.bench_function("view advance", |b| {
        b.to_async(&runtime).iter(|| async {
            db.run(
                "CREATE PROGRESSIVE VIEW v AS SELECT SUM(l_quantity), l_returnflag FUTURE \
                 FROM lineitem GROUP BY l_returnflag FUTURE",
            )
            .await
            .unwrap();
            db.views().advance("v", usize::MAX).await.unwrap();
            db.run("DROP PROGRESSIVE VIEW v").await.unwrap();
        });
    });
}

criterion_group!(benches, progressive_select, one_pass_select, view_advance);
criterion_main!(benches);
