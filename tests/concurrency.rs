mod common;

use common::{body, create, etag, file_pool, request, with_body};
use pantry_api::filters::routes;
use pretty_assertions::assert_eq;
use serde_json::json;

const ROUNDS: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_with_the_same_tag() {
    let dir = tempfile::tempdir().unwrap();
    let api = routes(file_pool(dir.path(), 5).await);
    let (_, mut tag) = create(&api, "/tags", json!({ "name": "round 0" })).await;

    for round in 1..=ROUNDS {
        let first = with_body("PUT", "/tags/1", &json!({ "name": format!("round {round} a") }))
            .header("if-match", &tag)
            .reply(&api);
        let second = with_body("PUT", "/tags/1", &json!({ "name": format!("round {round} b") }))
            .header("if-match", &tag)
            .reply(&api);
        let (first, second) = tokio::join!(first, second);

        let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
        statuses.sort();
        assert_eq!(statuses, vec![200, 412], "round {round}");

        let winner = if first.status() == 200 { &first } else { &second };
        let response = request("GET", "/tags/1").reply(&api).await;
        assert_eq!(body(&response), body(winner), "round {round}");
        assert_eq!(etag(&response), etag(winner), "round {round}");

        tag = etag(winner);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_delete_and_update() {
    let dir = tempfile::tempdir().unwrap();
    let api = routes(file_pool(dir.path(), 5).await);
    let (_, tag) = create(&api, "/ingredients", json!({ "name": "Yeast" })).await;

    let update = with_body("PUT", "/ingredients/1", &json!({ "name": "Dry yeast" }))
        .header("if-match", &tag)
        .reply(&api);
    let delete = request("DELETE", "/ingredients/1")
        .header("if-match", &tag)
        .reply(&api);
    let (update, delete) = tokio::join!(update, delete);

    let after = request("GET", "/ingredients/1").reply(&api).await;
    match (update.status().as_u16(), delete.status().as_u16()) {
        (200, 412) => assert_eq!(body(&after), body(&update)),
        (404, 204) => assert_eq!(after.status(), 404),
        statuses => panic!("unexpected outcome {statuses:?}"),
    }
}
