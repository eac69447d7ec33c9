#![allow(clippy::unwrap_used)]

mod util;

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use propertypal_lib::backend::{Backend, SqliteBackend};
use propertypal_lib::db::open_sqlite_pool;
use propertypal_lib::migrate::apply_migrations;
use propertypal_lib::ResourceKind;
use serde_json::{json, Value};
use tempfile::tempdir;
use util::{object, property};

async fn seed_database(db_path: &Path) -> Result<()> {
    let pool = open_sqlite_pool(db_path).await?;
    apply_migrations(&pool).await?;
    let backend = SqliteBackend::new(pool.clone());
    backend.insert_property(&property("p1")).await?;
    backend.insert_property(&property("p2")).await?;
    for (amount, on) in [(12000, "2024-01-10"), (8000, "2024-02-10")] {
        backend
            .create(
                ResourceKind::Expenses,
                object(json!({
                    "title": "Power", "amount": amount, "category": "utilities",
                    "date": on, "property_id": "p2"
                })),
            )
            .await?;
    }
    pool.close().await;
    Ok(())
}

fn propertypal(dir: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("propertypal")?;
    cmd.env("PROPERTYPAL_DATA_DIR", dir)
        .env("PROPERTYPAL_TZ", "UTC")
        .env("PROPERTYPAL_LOG", "propertypal=warn")
        .env_remove("PROPERTYPAL_LOG_DIR")
        .arg("--db")
        .arg(dir.join("cli.sqlite3"))
        .arg("--session")
        .arg(dir.join("session.json"));
    Ok(cmd)
}

fn stdout_json(output: &std::process::Output) -> Value {
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[tokio::test]
async fn select_persists_across_invocations() -> Result<()> {
    let tmp = tempdir()?;
    seed_database(&tmp.path().join("cli.sqlite3")).await?;

    let listed = stdout_json(&propertypal(tmp.path())?.args(["properties", "--json"]).output()?);
    assert_eq!(listed["current"], json!("p1"));
    assert_eq!(listed["properties"].as_array().map(Vec::len), Some(2));

    let output = propertypal(tmp.path())?.args(["select", "p2"]).output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Current property: p2"));

    let session: Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("session.json"))?)?;
    assert_eq!(session["currentPropertyId"], json!("p2"));

    let dashboard = stdout_json(&propertypal(tmp.path())?.args(["dashboard", "--json"]).output()?);
    assert_eq!(dashboard["property_id"], json!("p2"));
    assert_eq!(dashboard["maintenance"]["loading"], json!(false));

    Ok(())
}

#[tokio::test]
async fn unknown_property_exits_nonzero() -> Result<()> {
    let tmp = tempdir()?;
    seed_database(&tmp.path().join("cli.sqlite3")).await?;

    let output = propertypal(tmp.path())?.args(["select", "ghost"]).output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
    Ok(())
}

#[tokio::test]
async fn report_totals_in_display_units() -> Result<()> {
    let tmp = tempdir()?;
    seed_database(&tmp.path().join("cli.sqlite3")).await?;
    propertypal(tmp.path())?.args(["select", "p2"]).assert().success();

    let report = stdout_json(
        &propertypal(tmp.path())?
            .args(["report", "--range", "all", "--json"])
            .output()?,
    );
    assert_eq!(report["range"], json!("all"));
    assert_eq!(report["total_expenses"], json!(200.0));
    assert_eq!(report["monthly_totals"].as_array().map(Vec::len), Some(2));
    let growth = report["expense_growth_rate"].as_f64().unwrap();
    assert!((growth + 33.33).abs() < 0.01, "growth {growth}");

    let text = propertypal(tmp.path())?.args(["report", "--range", "all"]).output()?;
    assert!(String::from_utf8_lossy(&text.stdout).contains("Total expenses : $200.00"));
    Ok(())
}

#[tokio::test]
async fn logout_forgets_the_selection() -> Result<()> {
    let tmp = tempdir()?;
    seed_database(&tmp.path().join("cli.sqlite3")).await?;
    propertypal(tmp.path())?.args(["select", "p2"]).assert().success();

    propertypal(tmp.path())?.arg("logout").assert().success();

    let session: Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("session.json"))?)?;
    assert!(session.get("currentPropertyId").is_none());

    let listed = stdout_json(&propertypal(tmp.path())?.args(["properties", "--json"]).output()?);
    assert_eq!(listed["current"], json!("p1"));
    Ok(())
}

#[tokio::test]
async fn bad_range_is_a_usage_error() -> Result<()> {
    let tmp = tempdir()?;
    let output = propertypal(tmp.path())?
        .args(["report", "--range", "decade"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}
