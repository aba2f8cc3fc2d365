use super::{at, post, setup_db};
use crate::config::DateRange;
use crate::db::PendingQuery;
use crate::types::SourceId;
use chrono::NaiveDate;

#[tokio::test]
async fn test_append_is_idempotent() {
    let (db, _temp) = setup_db().await;
    let records = vec![
        post("nytimes", "1", at(2016, 10, 3)),
        post("nytimes", "2", at(2016, 10, 2)),
    ];

    assert_eq!(db.append_post_records(&records).await.unwrap(), 2);
    assert_eq!(db.append_post_records(&records).await.unwrap(), 0);

    // The stored row is never overwritten
    let mut changed = records[0].clone();
    changed.shares = Some(9999);
    assert_eq!(db.append_post_records(&[changed]).await.unwrap(), 0);
    let pending = db.list_pending_posts(&PendingQuery::all()).await.unwrap();
    assert_eq!(pending[&SourceId::from("nytimes")][0].shares, Some(10));

    assert_eq!(db.count_posts(None).await.unwrap(), 2);
    db.close().await;
}

#[tokio::test]
async fn test_same_post_id_in_two_sources() {
    let (db, _temp) = setup_db().await;
    let records = vec![post("a", "1", at(2016, 1, 1)), post("b", "1", at(2016, 1, 1))];

    assert_eq!(db.append_post_records(&records).await.unwrap(), 2);
    assert_eq!(db.count_posts(Some(&SourceId::from("a"))).await.unwrap(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_large_append_is_chunked() {
    let (db, _temp) = setup_db().await;
    let records: Vec<_> = (0..500)
        .map(|i| post("guardian", &i.to_string(), at(2016, 1, 1)))
        .collect();

    assert_eq!(db.append_post_records(&records).await.unwrap(), 500);
    let known = db.known_post_ids(&SourceId::from("guardian")).await.unwrap();
    assert_eq!(known.len(), 500);
    assert!(known.contains("499"));
    assert!(db.known_post_ids(&SourceId::from("other")).await.unwrap().is_empty());
    db.close().await;
}

#[tokio::test]
async fn test_round_trip_preserves_fields() {
    let (db, _temp) = setup_db().await;
    let mut record = post("nytimes", "1", at(2016, 10, 3));
    record.shares = None;
    db.append_post_records(std::slice::from_ref(&record)).await.unwrap();

    let pending = db.list_pending_posts(&PendingQuery::all()).await.unwrap();
    assert_eq!(pending[&SourceId::from("nytimes")], vec![record]);
    db.close().await;
}

#[tokio::test]
async fn test_pending_excludes_unresolved_and_archived() {
    let (db, _temp) = setup_db().await;
    let archived = post("a", "1", at(2016, 1, 3));
    let mut unresolved = post("a", "2", at(2016, 1, 2));
    unresolved.resolved_url = None;
    unresolved.base_domain = None;
    let waiting = post("a", "3", at(2016, 1, 1));
    db.append_post_records(&[archived.clone(), unresolved, waiting])
        .await
        .unwrap();
    db.append_article_records(&[super::article(&archived, "Body")])
        .await
        .unwrap();

    let pending = db.list_pending_posts(&PendingQuery::all()).await.unwrap();

    let ids: Vec<_> = pending[&SourceId::from("a")]
        .iter()
        .map(|r| r.post_id.as_str())
        .collect();
    assert_eq!(ids, vec!["3"]);
    db.close().await;
}

#[tokio::test]
async fn test_pending_groups_by_source_newest_first() {
    let (db, _temp) = setup_db().await;
    db.append_post_records(&[
        post("b", "b-old", at(2016, 1, 1)),
        post("a", "a-old", at(2016, 1, 1)),
        post("b", "b-new", at(2016, 3, 1)),
        post("a", "a-new", at(2016, 2, 1)),
        post("c", "c-1", at(2016, 2, 1)),
    ])
    .await
    .unwrap();

    let pending = db
        .list_pending_posts(&PendingQuery::for_sources([
            SourceId::from("a"),
            SourceId::from("b"),
        ]))
        .await
        .unwrap();

    let keys: Vec<_> = pending.keys().map(SourceId::as_str).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(pending[&SourceId::from("a")][0].post_id, "a-new");
    assert_eq!(pending[&SourceId::from("b")][0].post_id, "b-new");
    assert_eq!(pending[&SourceId::from("b")][1].post_id, "b-old");
    db.close().await;
}

#[tokio::test]
async fn test_pending_retrieval_window() {
    let (db, _temp) = setup_db().await;
    // retrieved_on is created + 1 day
    db.append_post_records(&[
        post("a", "1", at(2016, 1, 30)),
        post("a", "2", at(2016, 1, 31)),
        post("a", "3", at(2016, 2, 1)),
    ])
    .await
    .unwrap();

    let query = PendingQuery::all().retrieved_between(Some(DateRange {
        start: NaiveDate::from_ymd_opt(2016, 1, 31).unwrap(),
        end: NaiveDate::from_ymd_opt(2016, 2, 1).unwrap(),
    }));
    let pending = db.list_pending_posts(&query).await.unwrap();

    let ids: Vec<_> = pending[&SourceId::from("a")]
        .iter()
        .map(|r| r.post_id.as_str())
        .collect();
    assert_eq!(ids, vec!["2", "1"]);
    db.close().await;
}

#[tokio::test]
async fn test_base_domain_counts() {
    let (db, _temp) = setup_db().await;
    let mut wire = post("a", "3", at(2016, 1, 1));
    wire.base_domain = Some("wire.example.org".into());
    let mut unresolved = post("a", "4", at(2016, 1, 1));
    unresolved.base_domain = None;
    db.append_post_records(&[
        post("a", "1", at(2016, 1, 1)),
        post("a", "2", at(2016, 1, 1)),
        wire,
        unresolved,
    ])
    .await
    .unwrap();

    let counts = db.base_domain_counts(&SourceId::from("a")).await.unwrap();

    assert_eq!(
        counts,
        vec![
            ("www.a.com".to_string(), 2),
            ("wire.example.org".to_string(), 1)
        ]
    );
    db.close().await;
}
