//! 001_init.sql のスキーマ検証。全コレクションが 1 つの records テーブルを共有すること。

const INIT_SQL: &str = include_str!("../migrations/001_init.sql");

#[test]
fn test_init_creates_records_table() {
    let lower = INIT_SQL.to_lowercase();
    assert!(
        lower.contains("create table if not exists records"),
        "001_init must create table records"
    );
    assert!(
        lower.contains("create index if not exists idx_records_collection"),
        "001_init must index records by collection"
    );
}

#[test]
fn test_records_columns_and_key() {
    let block = extract_create_block(INIT_SQL, "records");
    for column in ["collection", "id", "data", "created_at", "updated_at"] {
        assert!(
            block.contains(column),
            "records table must define {column}"
        );
    }
    assert!(
        block.contains("PRIMARY KEY (collection, id)"),
        "records must be keyed by (collection, id)"
    );
}

#[tokio::test]
async fn test_init_sql_is_idempotent() {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    // tauri-plugin-sql のマイグレーションとバックエンドの init_schema の両方が流すため
    sqlx::raw_sql(INIT_SQL).execute(&pool).await.unwrap();
    respectabullz_lib::repository::init_schema(&pool).await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

fn extract_create_block(s: &str, table: &str) -> String {
    let start = format!("CREATE TABLE IF NOT EXISTS {table} (");
    let i = s.find(&start).expect("CREATE TABLE block not found");
    let rest = &s[i + start.len()..];
    let depth = rest
        .chars()
        .scan(1i32, |d, c| {
            match c {
                '(' => *d += 1,
                ')' => *d -= 1,
                _ => {}
            }
            Some(*d)
        })
        .position(|d| d == 0)
        .expect("matching ')' for CREATE TABLE block");
    rest[..depth].to_string()
}
