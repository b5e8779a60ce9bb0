use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use tempfile::tempdir;

use regdata_explorer::config::Catalog;
use regdata_explorer::data::export::export_csv;
use regdata_explorer::data::{
    aggregate, filter, filter_all, load, parse_csv, AggregationSpec, Criterion, DataClient,
    DatasetKind, FileSource, FilterWarning, LoadError, SourceId, Table, Value,
};
use regdata_explorer::panel::{run_all, run_request, PanelMessage, PanelRequest};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn write_parquet(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let schema = Arc::new(Schema::new(vec![
        Field::new("isin", DataType::Utf8, false),
        Field::new("first_trade_date", DataType::Date32, true),
        Field::new("notional", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec!["FR0000000001", "DE0000000002"])),
            // 19358 = 2023-01-01
            Arc::new(Date32Array::from(vec![Some(19358), None])),
            Arc::new(Float64Array::from(vec![Some(12.5), Some(3.0)])),
        ],
    )
    .unwrap();
    let file = fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// A small snapshot laid out like the generator's output.
fn snapshot(root: &Path) {
    write(
        root,
        "mifid/files.csv",
        "publication_date,file_name,file_type,download_link\n\
         2023-01-01,FULINS_1.parquet,FULINS,mifid/files/FULINS_1.parquet\n\
         2023-01-02,DLTINS_2.csv,DLTINS,mifid/files/DLTINS_2.csv\n",
    );
    write_parquet(root, "mifid/files/FULINS_1.parquet");
    write(
        root,
        "mifid/files/DLTINS_2.csv",
        "isin,note\nIT0000000003,\"needs, quoting\"\n",
    );
    write(
        root,
        "firds/files.json",
        r#"[
            {"file_name": "a.csv", "instrument_type": "EQUI", "download_link": "firds/files/a.csv"},
            {"file_name": "b.csv", "instrument_type": "DEBT", "download_link": "firds/files/b.csv"},
            {"file_name": "c.csv", "instrument_type": "EQUI", "download_link": null}
        ]"#,
    );
    write(
        root,
        "ssr/reference.csv",
        "issuer_name,country_code,exemption_start_date\n\
         Acme Corp,FR,2023-01-01\n\
         acme Ltd,DE,2023-06-15\n\
         Other,FR,\n",
    );
}

#[test]
fn scenario_a_case_insensitive_issuer_filter() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());
    let table = load(&source, &SourceId::Reference(DatasetKind::Ssr), &["issuer_name"]).unwrap();

    let out = filter(&table, &Criterion::contains("issuer_name", "acme"));
    assert_eq!(out.matched, 2);
    let names: Vec<String> = out
        .table
        .column_values("issuer_name")
        .unwrap()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(names, vec!["Acme Corp", "acme Ltd"]);
}

#[test]
fn scenario_b_empty_table_never_errors() {
    let empty = Table::default();
    let out = filter_all(
        &empty,
        &[
            Criterion::contains("issuer_name", "acme"),
            Criterion::on("exemption_start_date", date(2023, 1, 1)),
        ],
    );
    assert!(out.table.is_empty());
    assert_eq!(out.warnings, vec![FilterWarning::NoData]);

    let agg = aggregate(&empty, &AggregationSpec::new("issuer_name"));
    assert!(agg.table.is_empty());
    assert_eq!(agg.warnings, vec![FilterWarning::NoData]);
}

#[test]
fn scenario_c_null_dates_are_counted() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());
    let table = load::<_, &str>(&source, &SourceId::Reference(DatasetKind::Ssr), &[]).unwrap();

    let out = filter(
        &table,
        &Criterion::on("exemption_start_date", date(2023, 1, 1)),
    );
    assert_eq!(out.matched, 1);
    assert_eq!(out.table.value(0, "issuer_name"), Some(&Value::from("Acme Corp")));
    assert_eq!(out.invalid_dates, 1);
}

#[test]
fn parquet_and_json_snapshots_load() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());

    let parquet = source
        .fetch(&SourceId::File("mifid/files/FULINS_1.parquet".into()))
        .unwrap();
    assert_eq!(parquet.column_names(), vec!["isin", "first_trade_date", "notional"]);
    assert_eq!(parquet.value(0, "first_trade_date"), Some(&Value::Date(date(2023, 1, 1))));
    assert_eq!(parquet.value(1, "first_trade_date"), Some(&Value::Null));
    assert_eq!(
        String::from_utf8(export_csv(&parquet).unwrap()).unwrap(),
        "isin,first_trade_date,notional\nFR0000000001,2023-01-01,12.5\nDE0000000002,,3\n"
    );

    let firds = source.fetch(&SourceId::FileList(DatasetKind::Firds)).unwrap();
    assert_eq!(
        firds.column_names(),
        vec!["file_name", "instrument_type", "download_link"]
    );
    assert_eq!(firds.value(2, "download_link"), Some(&Value::Null));
}

#[test]
fn missing_snapshot_is_a_fetch_error_and_bad_file_is_malformed() {
    let dir = tempdir().unwrap();
    write(dir.path(), "broken.json", "{\"not\": \"an array\"}");
    let source = FileSource::new(dir.path());

    let err = load::<_, &str>(&source, &SourceId::FileList(DatasetKind::Mifid), &[]).unwrap_err();
    assert!(matches!(err, LoadError::Fetch { .. }), "{err:?}");

    let err = load::<_, &str>(&source, &SourceId::File("broken.json".into()), &[]).unwrap_err();
    assert!(matches!(err, LoadError::Malformed { .. }), "{err:?}");

    let err = load::<_, &str>(&source, &SourceId::File("notes.txt".into()), &[]).unwrap_err();
    assert!(matches!(err, LoadError::Malformed { .. }), "{err:?}");
}

#[test]
fn badly_encoded_files_are_malformed_whatever_the_format() {
    let dir = tempdir().unwrap();
    let latin1 = b"[{\"issuer_name\": \"Soci\xe9t\xe9\"}]";
    fs::write(dir.path().join("latin1.json"), latin1).unwrap();
    fs::write(dir.path().join("latin1.csv"), b"issuer_name\nSoci\xe9t\xe9\n").unwrap();
    let source = FileSource::new(dir.path());

    for locator in ["latin1.json", "latin1.csv"] {
        let err = load::<_, &str>(&source, &SourceId::File(locator.into()), &[]).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }), "{locator}: {err:?}");
    }
}

#[test]
fn keyless_json_records_load_empty_and_round_trip() {
    let dir = tempdir().unwrap();
    write(dir.path(), "ssr/reference.json", "[{}, {}]");
    let source = FileSource::new(dir.path());

    let table = load(&source, &SourceId::Reference(DatasetKind::Ssr), &["issuer_name"]).unwrap();
    assert!(table.is_empty());
    let back = parse_csv(&export_csv(&table).unwrap()).unwrap();
    assert_eq!(back.len(), table.len());

    let report = run_request(&source, &Catalog::builtin(), &PanelRequest::new(DatasetKind::Ssr));
    assert!(!report.has_errors());
    assert_eq!(
        report.messages,
        vec![PanelMessage::Warning("No data found.".into())]
    );
}

#[test]
fn export_then_parse_round_trips() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());
    for id in [
        SourceId::FileList(DatasetKind::Mifid),
        SourceId::FileList(DatasetKind::Firds),
        SourceId::Reference(DatasetKind::Ssr),
        SourceId::File("mifid/files/DLTINS_2.csv".into()),
    ] {
        let table = source.fetch(&id).unwrap();
        let bytes = export_csv(&table).unwrap();
        let back = parse_csv(&bytes).unwrap();
        assert_eq!(back.column_names(), table.column_names(), "{id}");
        assert_eq!(back.len(), table.len(), "{id}");
        for (a, b) in back.rows().iter().zip(table.rows()) {
            let a: Vec<String> = a.iter().map(|v| v.to_string()).collect();
            let b: Vec<String> = b.iter().map(|v| v.to_string()).collect();
            assert_eq!(a, b, "{id}");
        }
        assert_eq!(export_csv(&back).unwrap(), bytes, "{id}");
    }
}

#[test]
fn firds_panel_upper_cases_filter_and_downloads_selection() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    write(dir.path(), "firds/files/a.csv", "isin\nFR1\nFR2\nFR3\n");
    let source = FileSource::new(dir.path());

    let request = PanelRequest {
        text: Some("equi".into()),
        selected_row: Some(0),
        download: true,
        ..PanelRequest::new(DatasetKind::Firds)
    };
    let report = run_request(&source, &Catalog::builtin(), &request);
    assert!(!report.has_errors(), "{:?}", report.messages);
    assert_eq!(report.matched, 2);

    let file = report.file.unwrap();
    assert_eq!(file.rows, 3);
    let artifact = file.export.unwrap();
    assert_eq!(artifact.file_name(), "firds_data.csv");
    assert_eq!(artifact.bytes(), b"isin\nFR1\nFR2\nFR3\n");
}

#[test]
fn row_without_link_is_a_warning() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());

    let request = PanelRequest {
        text: Some("EQUI".into()),
        selected_row: Some(1),
        ..PanelRequest::new(DatasetKind::Firds)
    };
    let report = run_request(&source, &Catalog::builtin(), &request);
    assert!(!report.has_errors());
    assert!(report.file.is_none());
    assert!(report
        .messages
        .contains(&PanelMessage::Warning("Row 1 has no 'download_link'.".into())));
}

#[test]
fn mifid_panel_explicit_range_and_parquet_download() {
    let dir = tempdir().unwrap();
    snapshot(dir.path());
    let source = FileSource::new(dir.path());

    let request = PanelRequest {
        date_range: Some((date(2023, 1, 1), date(2023, 1, 1))),
        selected_row: Some(0),
        ..PanelRequest::new(DatasetKind::Mifid)
    };
    let report = run_request(&source, &Catalog::builtin(), &request);
    assert_eq!(report.matched, 1);
    let file = report.file.unwrap();
    assert_eq!(file.locator, "mifid/files/FULINS_1.parquet");
    assert_eq!(file.preview.len(), 2);
    assert!(file.export.is_none());
}

#[test]
fn panels_are_isolated() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "ssr/reference.csv",
        "issuer_name,country_code\nAcme Corp,FR\n",
    );
    let source = FileSource::new(dir.path());
    let reports = run_all(
        &source,
        &Catalog::builtin(),
        &DatasetKind::ALL.map(PanelRequest::new),
    );
    assert!(reports[0].has_errors());
    assert!(reports[1].has_errors());
    assert!(!reports[2].has_errors());
    assert_eq!(reports[2].matched, 1);
}
