//! 初回起動で「サンプルデータで始める」を選んだときに投入するデータ
//!
//! 画面を一通り触れるよう、犬・出産・発情・顧客・待機リスト・経費を少しずつ用意する。
//! id は固定なので、何度投入しても重複しない。

use crate::repository::RecordRepository;
use serde_json::{json, Value};

/// (collection, id, data) の一覧
pub fn sample_records() -> Vec<(&'static str, &'static str, Value)> {
    vec![
        (
            "settings",
            "breeder",
            json!({
                "kennelName": "Sample Bullz Kennel",
                "breederName": "Sample Breeder",
                "isSample": true
            }),
        ),
        (
            "dogs",
            "sample-dog-sire",
            json!({
                "name": "Sample Titan",
                "sex": "M",
                "breed": "American Bully",
                "dateOfBirth": "2020-03-14",
                "status": "active"
            }),
        ),
        (
            "dogs",
            "sample-dog-dam",
            json!({
                "name": "Sample Luna",
                "sex": "F",
                "breed": "American Bully",
                "dateOfBirth": "2021-06-02",
                "status": "active"
            }),
        ),
        (
            "dogs",
            "sample-dog-puppy",
            json!({
                "name": "Sample Pup",
                "sex": "M",
                "breed": "American Bully",
                "dateOfBirth": "2024-02-10",
                "status": "available",
                "litterId": "sample-litter-1"
            }),
        ),
        (
            "litters",
            "sample-litter-1",
            json!({
                "code": "L-2024-01",
                "sireId": "sample-dog-sire",
                "damId": "sample-dog-dam",
                "whelpDate": "2024-02-10",
                "puppyCount": 5
            }),
        ),
        (
            "heatCycles",
            "sample-heat-1",
            json!({
                "dogId": "sample-dog-dam",
                "startDate": "2023-11-20"
            }),
        ),
        (
            "clients",
            "sample-client-1",
            json!({
                "name": "Jordan Example",
                "email": "jordan@example.com"
            }),
        ),
        (
            "waitlist",
            "sample-waitlist-1",
            json!({
                "clientId": "sample-client-1",
                "preference": "female",
                "position": 1
            }),
        ),
        (
            "expenses",
            "sample-expense-1",
            json!({
                "date": "2024-01-05",
                "category": "vet",
                "amount": 180.0,
                "dogId": "sample-dog-dam"
            }),
        ),
    ]
}

/// サンプルデータを投入し、件数を返す
pub async fn load_sample_data(repo: &dyn RecordRepository) -> Result<usize, String> {
    let records = sample_records();
    for (collection, id, data) in &records {
        repo.upsert(collection, id, data).await?;
    }
    Ok(records.len())
}
