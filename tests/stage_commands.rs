mod provider_stub;

use std::collections::HashMap;
use std::fs;

use leadsheet::formats::{FlatRow, PageResult};
use predicates::prelude::*;
use provider_stub::{PageBehavior, ProviderStub, SHEET_LINK, StubConfig, forum_urls};

fn leadsheet(stub: &ProviderStub, home: &std::path::Path) -> assert_cmd::Command {
    let config_path = home.join("config.yaml");
    if !config_path.exists() {
        fs::write(
            &config_path,
            "extract_retries: 0\nextract_poll_interval_ms: 10\nfirecrawl_api_key: fc-file\ncomposio_api_key: cmp-file\n",
        )
        .expect("write config");
    }

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("leadsheet");
    for var in ["FIRECRAWL_API_KEY", "COMPOSIO_API_KEY", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd.env("XDG_CONFIG_HOME", home)
        .arg("--config")
        .arg(&config_path)
        .args(["--firecrawl-base-url", stub.base_url.as_str()])
        .args(["--composio-base-url", stub.base_url.as_str()]);
    cmd
}

#[test]
fn search_prints_one_url_per_line() -> anyhow::Result<()> {
    let urls = forum_urls(2);
    let stub = ProviderStub::spawn(StubConfig {
        search_urls: urls.clone(),
        ..StubConfig::default()
    });
    let home = tempfile::tempdir()?;

    leadsheet(&stub, home.path())
        .args(["search", "--description", "podcast editing", "--num-links", "2"])
        .assert()
        .success()
        .stdout(format!("{}\n{}\n", urls[0], urls[1]));

    let search = stub.requests_to("/v1/search");
    assert_eq!(search[0].api_key.as_deref(), Some("fc-file"));
    Ok(())
}

#[test]
fn search_honors_domain_override() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(StubConfig::default());
    let home = tempfile::tempdir()?;

    leadsheet(&stub, home.path())
        .args(["search", "--description", "crm", "--domain", "reddit.com"])
        .assert()
        .success()
        .stdout("No relevant URLs found.\n");

    let search = stub.requests_to("/v1/search");
    assert_eq!(
        search[0].body["query"],
        "site:reddit.com people looking for crm services"
    );
    Ok(())
}

#[test]
fn extract_flatten_sheet_chain_through_files() -> anyhow::Result<()> {
    let urls = forum_urls(2);
    let stub = ProviderStub::spawn(StubConfig {
        pages: HashMap::from([
            (urls[0].clone(), PageBehavior::Async(2)),
            (urls[1].clone(), PageBehavior::Fail),
        ]),
        ..StubConfig::default()
    });
    let home = tempfile::tempdir()?;
    let pages_path = home.path().join("work").join("pages.jsonl");
    let rows_path = home.path().join("work").join("rows.jsonl");

    leadsheet(&stub, home.path())
        .args(["extract", "--url", urls[0].as_str(), "--url", urls[1].as_str(), "--out"])
        .arg(&pages_path)
        .assert()
        .success()
        .stdout("Extracted 2 interaction(s) from 2 page(s).\n");

    let pages: Vec<PageResult> = leadsheet::formats::read_jsonl(&pages_path)?;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].url, urls[0]);
    assert!(pages[1].interactions().is_empty());
    let raw = fs::read_to_string(&pages_path)?;
    assert!(raw.contains(r#""outcome":"extracted""#), "{raw}");
    assert!(raw.contains(r#""outcome":"empty""#), "{raw}");

    leadsheet(&stub, home.path())
        .args(["flatten", "--pages"])
        .arg(&pages_path)
        .arg("--out")
        .arg(&rows_path)
        .assert()
        .success();

    let rows: Vec<FlatRow> = leadsheet::formats::read_jsonl(&rows_path)?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.website_url == urls[0]));

    leadsheet(&stub, home.path())
        .args(["sheet", "--title", "Chained", "--rows"])
        .arg(&rows_path)
        .assert()
        .success()
        .stdout(format!("{SHEET_LINK}\n"));

    let sheet = stub.requests_to("/execute");
    assert_eq!(sheet.len(), 1);
    assert_eq!(sheet[0].api_key.as_deref(), Some("cmp-file"));
    assert_eq!(sheet[0].body["input"]["title"], "Chained");
    Ok(())
}

#[test]
fn extract_refuses_to_overwrite_existing_output() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(StubConfig::default());
    let home = tempfile::tempdir()?;
    let pages_path = home.path().join("pages.jsonl");
    fs::write(&pages_path, "")?;

    leadsheet(&stub, home.path())
        .args(["extract", "--url", "https://www.quora.com/x", "--out"])
        .arg(&pages_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert!(stub.requests().is_empty());
    Ok(())
}

#[test]
fn sheet_with_no_rows_makes_no_request() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(StubConfig::default());
    let home = tempfile::tempdir()?;
    let rows_path = home.path().join("rows.jsonl");
    fs::write(&rows_path, "\n")?;

    leadsheet(&stub, home.path())
        .args(["sheet", "--rows"])
        .arg(&rows_path)
        .assert()
        .success()
        .stdout("No rows to write.\n");

    assert!(stub.requests().is_empty());
    Ok(())
}

#[test]
fn flatten_of_missing_file_fails() -> anyhow::Result<()> {
    let stub = ProviderStub::spawn(StubConfig::default());
    let home = tempfile::tempdir()?;

    leadsheet(&stub, home.path())
        .args(["flatten", "--pages"])
        .arg(home.path().join("nope.jsonl"))
        .arg("--out")
        .arg(home.path().join("rows.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.jsonl"));
    Ok(())
}
