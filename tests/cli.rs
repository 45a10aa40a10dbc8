use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

#[allow(deprecated)]
fn salonbook(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("salonbook").expect("salonbook binary");
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn init(home: &TempDir) {
    let data_dir = home.path().join("data");
    salonbook(home.path())
        .args(["init", "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(contains("Initialized salonbook"));
}

fn write_visit_log(path: &Path) {
    let mut book = rust_xlsxwriter::Workbook::new();
    let ws = book.add_worksheet();
    ws.set_name("消耗记录").unwrap();
    let header = [
        "客户ID", "到店时间", "离店时间", "总耗卡次数", "总耗卡金额", "服务满意度",
        "项目内容", "操作美容师", "耗卡金额", "是否指定",
        "项目内容", "操作美容师", "耗卡金额", "是否指定",
    ];
    ws.write_string(0, 0, "2023年12月消耗记录").unwrap();
    for (col, name) in header.iter().enumerate() {
        ws.write_string(1, col as u16, *name).unwrap();
    }
    let row = [
        "C003", "2023-12-01 19:00", "2023-12-01 21:30", "2次", "1840", "4.9/5",
        "Gold RF Tightening", "Zhou Jie", "1360", "✓",
        "Ice Renewal Facial", "Wang Fang", "480元", "",
    ];
    for (col, value) in row.iter().enumerate() {
        ws.write_string(2, col as u16, *value).unwrap();
    }
    book.save(path).unwrap();
}

#[test]
fn cli_status_before_init() {
    let home = TempDir::new().unwrap();
    salonbook(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Run `salonbook init`"));
}

#[test]
fn cli_import_twice_skips_duplicates() {
    let home = TempDir::new().unwrap();
    init(&home);
    let file = home.path().join("december.xlsx");
    write_visit_log(&file);

    salonbook(home.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("Imported 1 new and 0 updated visit(s) from sheet '消耗记录'"));

    salonbook(home.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("Imported 0 new and 0 updated visit(s)"))
        .stdout(contains("(1 duplicate(s) skipped)"));

    salonbook(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Visits:     1"))
        .stdout(contains("Items:      2 (0 inferred)"));
}

#[test]
fn cli_report_and_export() {
    let home = TempDir::new().unwrap();
    init(&home);
    let file = home.path().join("december.xlsx");
    write_visit_log(&file);
    salonbook(home.path()).arg("import").arg(&file).assert().success();

    salonbook(home.path())
        .args(["report", "--customer", "C003"])
        .assert()
        .success()
        .stdout(contains("1 visit(s)"));

    let out = home.path().join("visits.csv");
    salonbook(home.path())
        .args(["export", "--output"])
        .arg(&out)
        .assert()
        .success();
    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.contains("Gold RF Tightening - Zhou Jie - 1360元 - specified"), "{csv}");
    assert!(csv.contains("Ice Renewal Facial - Wang Fang - 480元 - unspecified"), "{csv}");
}

#[test]
fn cli_import_without_visit_sheet_fails() {
    let home = TempDir::new().unwrap();
    init(&home);
    let file = home.path().join("customers.xlsx");
    let mut book = rust_xlsxwriter::Workbook::new();
    book.add_worksheet().set_name("客户信息").unwrap().write_string(0, 0, "客户ID").unwrap();
    book.save(&file).unwrap();

    salonbook(home.path())
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("No visit sheet found (sheets: 客户信息)"));
}

#[test]
fn cli_cleanup_removes_visits() {
    let home = TempDir::new().unwrap();
    init(&home);
    let file = home.path().join("december.xlsx");
    write_visit_log(&file);
    salonbook(home.path()).arg("import").arg(&file).assert().success();

    salonbook(home.path())
        .args(["cleanup", "--customer", "C003", "--from", "2023-12-01", "--to", "2023-12-01"])
        .assert()
        .success()
        .stdout(contains("Deleted 1 visit(s) for customer C003"));
}

#[test]
fn cli_dry_run_lists_visits_without_writing() {
    let home = TempDir::new().unwrap();
    init(&home);
    let file = home.path().join("december.xlsx");
    write_visit_log(&file);

    salonbook(home.path())
        .args(["import", "--dry-run"])
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("Would import 1 new"))
        .stdout(contains("Gold RF Tightening - Zhou Jie"))
        .stdout(contains("Dry run: nothing was written."));

    salonbook(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Visits:     0"));
}
