//! Migration trees compiled into the binary with `rust-embed`.
//!
//! The `embed` feature is switched on for tests by the crate's own
//! dev-dependency entry.

use pathmigrate::{migrate, Config, FileSource, MemorySource};
use pathmigrate_backends::SqliteBackend;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "testdata/embedded/"]
struct Embedded;

fn names(source: &MemorySource, path: &str) -> Vec<(String, bool)> {
    source
        .list(path)
        .unwrap()
        .into_iter()
        .map(|e| (e.name, e.is_dir))
        .collect()
}

#[test]
fn test_from_embed_roots_tree_at_prefix() {
    let source = MemorySource::from_embed::<Embedded>("migrations");

    assert_eq!(
        names(&source, "/"),
        vec![
            ("1_accounts.sql".to_string(), false),
            ("2_account_name.sql".to_string(), false),
            ("test".to_string(), true),
        ]
    );
    assert_eq!(
        source.read_to_string("/test/1_audit.sql").unwrap(),
        "CREATE TABLE audit (id INTEGER PRIMARY KEY);\n"
    );
}

#[test]
fn test_from_embed_drops_files_outside_prefix() {
    let source = MemorySource::from_embed::<Embedded>("/migrations/");

    assert!(source.open("/1_legacy.sql").is_err());
    assert!(source.open("/1_seed.sql").is_err());
    assert!(source.list("/seeds").is_err());
    assert_eq!(
        source.walk_dirs("/", &|_: &str| false).unwrap(),
        vec!["/", "/test"]
    );
}

#[test]
fn test_from_embed_empty_prefix_keeps_everything() {
    let source = MemorySource::from_embed::<Embedded>("");

    assert_eq!(
        names(&source, "/"),
        vec![
            ("migrations".to_string(), true),
            ("migrations_old".to_string(), true),
            ("seeds".to_string(), true),
        ]
    );
    assert!(source.read_to_string("/seeds/1_seed.sql").is_ok());
}

#[tokio::test]
async fn test_embedded_tree_migrates() {
    let backend = SqliteBackend::memory().unwrap();
    let source = MemorySource::from_embed::<Embedded>("migrations");

    let result = migrate(&backend, Config::new().with_source(source))
        .await
        .unwrap();

    let root = result.get("/").unwrap();
    assert_eq!((root.previous_version, root.new_version), (0, 2));
    let test = result.get("/test").unwrap();
    assert_eq!((test.previous_version, test.new_version), (0, 1));
}
