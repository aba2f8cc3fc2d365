use crate::db::*;
use crate::types::{ArticleRecord, PostRecord};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::NamedTempFile;

mod posts;

async fn setup_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn post(source: &str, id: &str, created: DateTime<Utc>) -> PostRecord {
    PostRecord {
        source_id: source.into(),
        post_id: id.into(),
        page_name: format!("{source} page"),
        link: Some(format!("http://bit.ly/{id}")),
        resolved_url: Some(format!("https://www.{source}.com/{id}")),
        base_domain: Some(format!("www.{source}.com")),
        shares: Some(10),
        created_time: created,
        retrieved_on: created + Duration::days(1),
    }
}

fn article(record: &PostRecord, body: &str) -> ArticleRecord {
    ArticleRecord {
        post_id: record.post_id.clone(),
        source_id: record.source_id.clone(),
        url: record.resolved_url.clone().unwrap(),
        base_domain: record.base_domain.clone(),
        title: format!("Story {}", record.post_id),
        authors: vec!["Jane Roe".into(), "Sam Poe".into()],
        body_text: body.into(),
        post_created_time: record.created_time,
        retrieved_on: record.retrieved_on,
    }
}
