use std::path::{Path, PathBuf};

use city_explorer_db::{
    connect_dir, discover_migrations, sort_by_ordinal, split, QueryBuilder,
};
use rusqlite::params;

fn migrations_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

#[test]
fn bundled_migrations_have_no_unterminated_text() {
    let mut files = discover_migrations(&migrations_dir()).unwrap();
    sort_by_ordinal(&mut files);
    assert!(!files.is_empty());

    for file in &files {
        let sql = file.read_sql().unwrap();
        let result = split(&sql);
        assert_eq!(result.trailing, None, "{} has trailing text", file.file_name);
    }

    let triggers = files.iter().find(|f| f.label == "updated_at_triggers").unwrap();
    let sql = triggers.read_sql().unwrap();
    let statements = split(&sql).statements;
    assert_eq!(statements.len(), 5, "{statements:#?}");
    assert!(statements.iter().all(|s| s.ends_with(';')));
}

#[test]
fn admin_audit_trigger_fires() {
    let data = tempfile::tempdir().unwrap();
    let db = connect_dir(data.path(), "city_explorer_app", &migrations_dir())
        .unwrap()
        .database;

    let insert = QueryBuilder::insert("users")
        .columns(["first_name", "last_name", "username", "email", "password"])
        .values(5)
        .build();
    let id = db
        .execute(
            &insert,
            params!["Peter", "Pan", "peter_pan", "peter@example.com", "hash"],
        )
        .unwrap()
        .inserted_id()
        .unwrap();

    let promote = QueryBuilder::update("users")
        .columns(["is_admin"])
        .filter("id = ?")
        .build();
    db.execute(&promote, params![1, id]).unwrap();

    let audit = QueryBuilder::select("admin_audit")
        .columns(["change"])
        .filter("user_id = ?")
        .build();
    let rows = db.execute(&audit, [id]).unwrap().into_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String>("change").unwrap(), "granted");
}
