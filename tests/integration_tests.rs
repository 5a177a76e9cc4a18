//! Integration tests: whole enrichment jobs against the in-memory database.

use rowscript::{
    ColumnDef, DataType, Database, EnrichmentConfig, JobConfig, JobStatus, OutputColumnType, Row,
    TableSchema, Value,
};

fn items_db(descriptions: &[&str]) -> Database {
    let db = Database::new();
    db.create_table(
        TableSchema::new(
            "items".into(),
            vec![
                ColumnDef::new("id", DataType::Int64).expect("id column"),
                ColumnDef::new("description", DataType::String).expect("description column"),
            ],
            vec!["id".into()],
        )
        .expect("schema"),
    )
    .expect("create table");

    let rows: Vec<Row> = descriptions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            Row::new()
                .with("id", Value::Int64(i as i64 + 1))
                .with("description", Value::String((*d).to_string()))
        })
        .collect();
    db.insert_rows("items", &rows).expect("insert rows");
    db
}

fn column(db: &Database, table: &str, name: &str) -> Vec<Value> {
    db.rows(table)
        .expect("rows")
        .iter()
        .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}

// =============================================================================
// Single Mode
// =============================================================================

mod single_mode_tests {
    use super::*;

    #[test]
    fn test_description_lengths() {
        let db = items_db(&["First item", "Second item", "Third item"]);
        let config = EnrichmentConfig::single(
            "fn enrich(row) { row.description.len() }",
            "description_length",
            OutputColumnType::Integer,
        );

        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.status, JobStatus::Finished);
        assert_eq!(record.row_count, 3);
        assert_eq!(record.progress.done_count, 3);
        assert_eq!(record.progress.error_count, 0);
        assert!(record.progress.errors.is_empty());
        assert!(record.is_complete());

        let schema = db.schema("items").expect("schema");
        assert_eq!(
            schema.get_column("description_length").expect("column").data_type,
            DataType::Int64
        );
        assert_eq!(
            column(&db, "items", "description_length"),
            vec![Value::Int64(10), Value::Int64(11), Value::Int64(10)]
        );
    }

    #[test]
    fn test_default_function() {
        let db = items_db(&["First item"]);
        let record = db
            .enrich("items", &EnrichmentConfig::default(), JobConfig::default())
            .expect("enrich");
        assert_eq!(record.progress.error_count, 0);

        let values = column(&db, "items", "javascript_output");
        let text = values[0].as_string().expect("text output");
        assert!(text.ends_with(" enriched"), "{text}");
        let rendered = text.trim_end_matches(" enriched");
        let row: serde_json::Value = serde_json::from_str(rendered).expect("row as JSON");
        assert_eq!(row["description"], "First item");
    }

    #[test]
    fn test_existing_column_is_reused() {
        let db = items_db(&["a", "bb"]);
        let config = EnrichmentConfig::single(
            r#"fn enrich(row) { row.description + "!" }"#,
            "description",
            OutputColumnType::Text,
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.error_count, 0);
        assert_eq!(db.schema("items").expect("schema").columns.len(), 2);
        assert_eq!(
            column(&db, "items", "description"),
            vec![Value::String("a!".into()), Value::String("bb!".into())]
        );
    }

    #[test]
    fn test_float_column() {
        let db = items_db(&["abcd"]);
        let config = EnrichmentConfig::single(
            "fn enrich(row) { row.description.len() / 8.0 }",
            "ratio",
            OutputColumnType::Float,
        );
        db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(column(&db, "items", "ratio"), vec![Value::Float64(0.5)]);
    }

    #[test]
    fn test_unconvertible_result_is_row_error() {
        let db = items_db(&["a", "b"]);
        let config = EnrichmentConfig::single(
            r#"fn enrich(row) { if row.id == 1 { "not a number" } else { 5 } }"#,
            "n",
            OutputColumnType::Integer,
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 2);
        assert_eq!(record.progress.error_count, 1);
        assert!(record.progress.errors[0].message.starts_with("Type error"));
        assert_eq!(column(&db, "items", "n"), vec![Value::Null, Value::Int64(5)]);
    }
}

// =============================================================================
// Multi Mode
// =============================================================================

mod multi_mode_tests {
    use super::*;

    #[test]
    fn test_mapping_creates_columns() {
        let db = items_db(&["First item", "Second item"]);
        let config = EnrichmentConfig::multi(
            r#"fn enrich(row) { #{ upper: row.description.to_upper(), words: row.description.split(" ").len() } }"#,
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.error_count, 0);

        let schema = db.schema("items").expect("schema");
        assert_eq!(schema.get_column("upper").expect("upper").data_type, DataType::String);
        assert_eq!(schema.get_column("words").expect("words").data_type, DataType::Int64);
        assert_eq!(
            column(&db, "items", "upper"),
            vec![
                Value::String("FIRST ITEM".into()),
                Value::String("SECOND ITEM".into())
            ]
        );
        assert_eq!(
            column(&db, "items", "words"),
            vec![Value::Int64(2), Value::Int64(2)]
        );
    }

    #[test]
    fn test_json_string_result() {
        let db = items_db(&["x"]);
        let config = EnrichmentConfig::multi(r#"fn enrich(row) { "{\"a\":1,\"b\":2}" }"#);
        db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(column(&db, "items", "a"), vec![Value::Int64(1)]);
        assert_eq!(column(&db, "items", "b"), vec![Value::Int64(2)]);
    }

    #[test]
    fn test_plain_result_uses_fallback_column() {
        let db = items_db(&["x", "y"]);
        let config = EnrichmentConfig::multi(r#"fn enrich(row) { "hello" }"#);
        db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(
            column(&db, "items", "javascript_output"),
            vec![Value::String("hello".into()), Value::String("hello".into())]
        );
    }

    #[test]
    fn test_multi_mode_creates_no_column_up_front() {
        let db = items_db(&["x"]);
        let config = EnrichmentConfig::multi(r#"fn enrich(row) { throw "nope"; }"#);
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.error_count, 1);
        assert_eq!(db.schema("items").expect("schema").columns.len(), 2);
    }

    #[test]
    fn test_composite_primary_key() {
        let db = Database::new();
        db.create_table(
            TableSchema::new(
                "sales".into(),
                vec![
                    ColumnDef::new("region", DataType::String).expect("region"),
                    ColumnDef::new("id", DataType::Int64).expect("id"),
                    ColumnDef::new("amount", DataType::Float64).expect("amount"),
                ],
                vec!["region".into(), "id".into()],
            )
            .expect("schema"),
        )
        .expect("create table");
        for (region, id, amount) in [("eu", 1, 10.0), ("us", 1, 20.0), ("eu", 2, 30.0)] {
            db.insert(
                "sales",
                &Row::new()
                    .with("region", Value::String(region.into()))
                    .with("id", Value::Int64(id))
                    .with("amount", Value::Float64(amount)),
            )
            .expect("insert");
        }

        let config = EnrichmentConfig::multi(
            r#"fn enrich(row) { if row.region == "us" { throw "skip us"; } #{ doubled: row.amount * 2.0 } }"#,
        );
        let record = db.enrich("sales", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 3);
        assert_eq!(record.progress.error_count, 1);
        assert_eq!(record.progress.errors[0].primary_key.to_string(), "(us, 1)");

        let row = db
            .find_row("sales", &[Value::String("eu".into()), Value::Int64(2)])
            .expect("find")
            .expect("row");
        assert_eq!(row.get("doubled"), Some(&Value::Float64(60.0)));
        let row = db
            .find_row("sales", &[Value::String("us".into()), Value::Int64(1)])
            .expect("find")
            .expect("row");
        assert_eq!(row.get("doubled"), Some(&Value::Null));
    }
}

// =============================================================================
// Failure Isolation
// =============================================================================

mod failure_tests {
    use super::*;
    use rowscript::{JobRunner, RowscriptError};

    #[test]
    fn test_throw_on_one_row() {
        let db = items_db(&["a", "b", "c"]);
        let config = EnrichmentConfig::new(
            r#"fn enrich(row) { if row.id == 2 { throw "row two is bad"; } row.id }"#,
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 3);
        assert_eq!(record.progress.error_count, 1);
        assert_eq!(record.progress.errors[0].primary_key.to_string(), "2");
        assert!(record.progress.errors[0].message.contains("row two is bad"));
        assert_eq!(
            column(&db, "items", "javascript_output"),
            vec![
                Value::String("1".into()),
                Value::Null,
                Value::String("3".into())
            ]
        );
    }

    #[test]
    fn test_timeout_on_every_row() {
        let db = items_db(&["a", "b", "c"]);
        let config = EnrichmentConfig::new(
            "fn enrich(row) {\n  let start = now();\n  while now() - start < 1000 {}\n  row.id\n}",
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 3);
        assert_eq!(record.progress.error_count, 3);
        for error in &record.progress.errors {
            assert!(
                error.message.starts_with("InternalError: interrupted\n    at enrich (<input>"),
                "{}",
                error.message
            );
        }
    }

    #[test]
    fn test_nested_growth_is_contained() {
        let db = items_db(&["a"]);
        let config = EnrichmentConfig::new(
            "fn enrich(row) {\n  let a = [];\n  loop { a.push([1, 2, 3, 4, 5, 6, 7, 8]); }\n}",
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 1);
        // Either recorded as a failure or stored as null.
        if record.progress.error_count == 0 {
            assert_eq!(column(&db, "items", "javascript_output"), vec![Value::Null]);
        }
    }

    #[test]
    fn test_compile_error_touches_nothing() {
        let db = items_db(&["a", "b"]);
        let config = EnrichmentConfig::new("fn enrich(row) { row.id + }");
        let err = db
            .enrich("items", &config, JobConfig::default())
            .expect_err("compile error");
        assert!(matches!(err, RowscriptError::CompileError(_)));
        assert_eq!(db.schema("items").expect("schema").columns.len(), 2);
    }

    #[test]
    fn test_missing_key_column_is_row_error() {
        let db = items_db(&["a"]);
        let rows = vec![
            Row::new().with("description", Value::String("orphan".into())),
            Row::new().with("id", Value::Int64(1)),
        ];
        let record = JobRunner::new(&db)
            .run("items", &EnrichmentConfig::new("fn enrich(row) { 1 }"), &rows, &["id".to_string()])
            .expect("run");
        assert_eq!(record.progress.done_count, 2);
        assert_eq!(record.progress.error_count, 1);
        assert_eq!(record.progress.errors[0].primary_key.to_string(), "null");
        assert!(record.progress.errors[0].message.contains("Missing primary key column 'id'"));
    }

    #[test]
    fn test_update_by_non_key_column() {
        let db = items_db(&["same", "same", "other"]);
        let rows = vec![Row::new().with("description", Value::String("same".into()))];
        let record = JobRunner::new(&db)
            .run(
                "items",
                &EnrichmentConfig::single("fn enrich(row) { 1 }", "hit", OutputColumnType::Integer),
                &rows,
                &["description".to_string()],
            )
            .expect("run");
        assert_eq!(record.progress.error_count, 0);
        assert_eq!(
            column(&db, "items", "hit"),
            vec![Value::Int64(1), Value::Int64(1), Value::Null]
        );
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency_tests {
    use super::*;
    use rowscript::EnrichmentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_concurrent_ensure_column() {
        let db = items_db(&["a"]);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    db.ensure_column("items", "score", DataType::Float64)
                        .expect("ensure column");
                });
            }
        });
        assert_eq!(db.schema("items").expect("schema").columns.len(), 3);
    }

    #[test]
    fn test_parallel_batches() {
        let descriptions: Vec<String> = (1..=250).map(|i| format!("item {i}")).collect();
        let refs: Vec<&str> = descriptions.iter().map(String::as_str).collect();
        let db = items_db(&refs);

        let config = EnrichmentConfig::single(
            r#"fn enrich(row) { if row.id % 50 == 0 { throw "every fiftieth"; } row.id * 2 }"#,
            "doubled",
            OutputColumnType::Integer,
        );
        let batches = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&batches);
        let record = rowscript::JobRunner::new(&db)
            .with_config(JobConfig::new().with_batch_size(20).with_parallelism(4))
            .with_progress(Box::new(move |_record: &rowscript::JobRecord| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .run(
                "items",
                &config,
                &db.rows("items").expect("rows"),
                &["id".to_string()],
            )
            .expect("run");

        assert_eq!(batches.load(Ordering::SeqCst), 13);
        assert_eq!(record.progress.done_count, 250);
        assert_eq!(record.progress.error_count, 5);
        let failed: Vec<String> = record
            .progress
            .errors
            .iter()
            .map(|e| e.primary_key.to_string())
            .collect();
        assert_eq!(failed, vec!["50", "100", "150", "200", "250"]);

        let doubled = column(&db, "items", "doubled");
        assert_eq!(doubled[0], Value::Int64(2));
        assert_eq!(doubled[49], Value::Null);
        assert_eq!(doubled[248], Value::Int64(498));
    }

    #[test]
    fn test_progress_reports_running_totals() {
        let db = items_db(&["a", "b", "c", "d", "e"]);
        let totals = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&totals);
        rowscript::JobRunner::new(&db)
            .with_config(JobConfig::new().with_batch_size(2))
            .with_progress(Box::new(move |record: &rowscript::JobRecord| {
                sink.lock().push(record.progress.done_count);
            }))
            .run(
                "items",
                &EnrichmentConfig::new("fn enrich(row) { row.id }"),
                &db.rows("items").expect("rows"),
                &["id".to_string()],
            )
            .expect("run");
        assert_eq!(*totals.lock(), vec![2, 4, 5]);
    }
}

// =============================================================================
// CSV Import and Snapshots
// =============================================================================

mod persistence_tests {
    use super::*;
    use rowscript::CsvImportConfig;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_import_then_enrich() {
        let db = items_db(&[]);
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "id,description").expect("write");
        writeln!(file, "1,First item").expect("write");
        writeln!(file, "2,\"Second, item\"").expect("write");
        writeln!(file, "x,bad id").expect("write");

        let result = db
            .import_csv(
                "items",
                file.path(),
                &CsvImportConfig::new().with_ignore_errors(true),
            )
            .expect("import");
        assert_eq!(result.rows_imported, 2);
        assert_eq!(result.rows_failed, 1);
        assert_eq!(result.errors[0].row_number, 3);

        let config = EnrichmentConfig::single(
            "fn enrich(row) { row.description.len() }",
            "len",
            OutputColumnType::Integer,
        );
        let record = db.enrich("items", &config, JobConfig::default()).expect("enrich");
        assert_eq!(record.progress.done_count, 2);
        assert_eq!(
            column(&db, "items", "len"),
            vec![Value::Int64(10), Value::Int64(12)]
        );
    }

    #[test]
    fn test_import_aborts_without_ignore_errors() {
        let db = items_db(&[]);
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "id,description\nx,bad").expect("write");
        assert!(db
            .import_csv("items", file.path(), &CsvImportConfig::default())
            .is_err());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("items.rowscript");

        let db = items_db(&["First item", "Second item"]);
        let config = EnrichmentConfig::multi(r#"fn enrich(row) { #{ n: row.description.len() } }"#);
        db.enrich("items", &config, JobConfig::default()).expect("enrich");
        db.save(&path).expect("save");

        let reopened = Database::open(&path).expect("open");
        assert_eq!(reopened.id(), db.id());
        assert_eq!(reopened.table_names(), vec!["items".to_string()]);
        assert_eq!(reopened.schema("items"), db.schema("items"));
        assert_eq!(
            reopened.rows("items").expect("rows"),
            db.rows("items").expect("rows")
        );
        assert!(reopened
            .find_row("items", &[Value::Int64(2)])
            .expect("find")
            .is_some());
    }

    #[test]
    fn test_corrupted_snapshot_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("items.rowscript");
        items_db(&["First item"]).save(&path).expect("save");

        let mut bytes = std::fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).expect("write");
        assert!(Database::open(&path).is_err());

        std::fs::write(&path, b"not a snapshot at all").expect("write");
        assert!(Database::open(&path).is_err());
    }
}

// =============================================================================
// Properties
// =============================================================================

mod proptest_determinism {
    use super::*;
    use proptest::prelude::*;

    fn enriched(descriptions: &[String]) -> Vec<Row> {
        let refs: Vec<&str> = descriptions.iter().map(String::as_str).collect();
        let db = items_db(&refs);
        let config = EnrichmentConfig::multi(
            r#"fn enrich(row) { #{ len: row.description.len(), upper: row.description.to_upper() } }"#,
        );
        let record = db
            .enrich("items", &config, JobConfig::new().with_batch_size(3))
            .expect("enrich");
        assert_eq!(record.progress.error_count, 0);
        db.rows("items").expect("rows")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_pure_function_is_deterministic(
            descriptions in proptest::collection::vec("[a-z ]{1,12}", 1..10)
        ) {
            prop_assert_eq!(enriched(&descriptions), enriched(&descriptions));
        }

        #[test]
        fn test_all_rows_counted(n in 1usize..40, batch_size in 1usize..16) {
            let descriptions: Vec<String> = (0..n).map(|i| format!("d{i}")).collect();
            let refs: Vec<&str> = descriptions.iter().map(String::as_str).collect();
            let db = items_db(&refs);
            let record = db
                .enrich(
                    "items",
                    &EnrichmentConfig::new("fn enrich(row) { row.id }"),
                    JobConfig::new().with_batch_size(batch_size),
                )
                .expect("enrich");
            prop_assert_eq!(record.progress.done_count, n as u64);
            prop_assert_eq!(record.progress.error_count, 0);
        }
    }
}
