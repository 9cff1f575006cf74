// tests/export_csv.rs
use chrono::NaiveDate;
use opsidius_leads::export::HEADERS;
use opsidius_leads::{
    export_filename, save_to_file, to_delimited_text, Company, LeadsError,
};

fn company(id: &str, name: &str, has_website: bool, score: u8) -> Company {
    Company {
        registry_id: id.into(),
        name: name.into(),
        city: "Nantes".into(),
        postal_code: "44000".into(),
        created_at: NaiveDate::from_ymd_opt(2026, 10, 2).unwrap(),
        sector_code: "56.10A".into(),
        sector_label: "Food service".into(),
        website_url: has_website.then(|| "https://example.test/a,b".to_string()),
        has_website,
        email: None,
        phone: Some("+33240000000".into()),
        score,
    }
}

#[test]
fn standard_reader_recovers_fields() {
    let rows = vec![
        company("123456789", "O\"Brien Co", false, 90),
        company("987654321", "Dupont, Fils & Associés", true, 40),
    ];
    let text = to_delimited_text(&rows);

    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>());

    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);

    assert_eq!(&records[0][0], "O\"Brien Co");
    assert_eq!(&records[0][3], "2026-10-02");
    assert_eq!(&records[0][4], "Yes");
    assert_eq!(&records[0][5], "");
    assert_eq!(&records[0][9], "+33240000000");
    assert_eq!(&records[0][10], "90");
    assert_eq!(&records[0][11], "123456789");

    assert_eq!(&records[1][0], "Dupont, Fils & Associés");
    assert_eq!(&records[1][4], "No");
    assert_eq!(&records[1][5], "https://example.test/a,b");
}

#[test]
fn empty_list_is_header_only() {
    let text = to_delimited_text(&[]);
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("Name,City,PostalCode"));
}

#[test]
fn save_creates_directory_and_writes_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("output");
    let name = export_filename(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(), "44");
    let text = to_delimited_text(&[company("123456789", "Crêperie Élise", false, 80)]);

    let path = save_to_file(&out, &name, &text).unwrap();
    assert_eq!(path, out.join("leads-44-2026-10-17.csv"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    assert!(!out.join("leads-44-2026-10-17.csv.tmp").exists());
}

#[test]
fn unwritable_destination_surfaces_export_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    let err = save_to_file(&blocker, "leads.csv", "Name").unwrap_err();
    match err {
        LeadsError::Export { path, .. } => assert_eq!(path, blocker.join("leads.csv")),
        other => panic!("unexpected error: {other}"),
    }
}
