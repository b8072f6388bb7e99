use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::engagement::engagement_router;
use crate::engagement::media::MediaStore;
use crate::engagement::router::ACTOR_HEADER;

// 1x1 transparent PNG
const PIXEL_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

fn router(h: &Harness) -> Router {
    engagement_router(h.core.clone())
}

fn event_body(title: &str, day: &str) -> Value {
    json!({
        "title": title,
        "description": "Pick up litter along the shore",
        "schedule": { "date": day, "start_time": "09:00", "end_time": "12:00" },
        "location": "North Beach",
        "image": PIXEL_URI,
        "targeted_skills": ["teamwork"],
        "duration_minutes": 180,
    })
}

fn post_json(uri: &str, actor: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str, actor: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    builder.body(Body::empty()).unwrap()
}

fn delete(uri: &str, actor: Option<&str>) -> Request<Body> {
    let mut builder = Request::delete(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    builder.body(Body::empty()).unwrap()
}

async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn community_and_event_creation_flow() {
    let h = harness();
    h.users.seed(owner("owner-1"));

    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/communities",
            Some("owner-1"),
            &json!({
                "name": "Harbor Volunteers",
                "description": "Keeps the shoreline clean",
                "image": PIXEL_URI,
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    // The stored reference replaces the inline payload, and the bytes
    // landed in the media store.
    let image = payload["community"]["image"].as_str().unwrap();
    assert!(image.starts_with("img-"));
    assert!(h.media.open(image).is_ok());

    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/events",
            Some("owner-1"),
            &event_body("Beach Cleanup", "2099-06-01"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router(&h)
        .oneshot(get("/api/v1/events", None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let listing = read_json_body(response).await;
    let events = listing.as_array().expect("array payload");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "Beach Cleanup");
    assert!(events[0]["community"]["image"]
        .as_str()
        .unwrap()
        .starts_with("img-"));
}

#[tokio::test]
async fn mutating_routes_require_the_actor_header() {
    let h = harness();
    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/events",
            None,
            &event_body("Beach Cleanup", "2099-06-01"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_image_payloads_are_rejected() {
    let h = harness();
    h.users.seed(owner("owner-1"));
    seed_community(&h, "owner-2", "Placeholder");

    let mut body = event_body("Beach Cleanup", "2099-06-01");
    body["image"] = json!("just-a-string");
    let response = router(&h)
        .oneshot(post_json("/api/v1/events", Some("owner-1"), &body))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_applications_conflict_over_http() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    let event = seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));
    let uri = format!("/api/v1/events/{}/applications", event.id.0);

    let first = router(&h)
        .oneshot(post_json(&uri, Some("vol-1"), &json!({})))
        .await
        .expect("route executes");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router(&h)
        .oneshot(post_json(&uri, Some("vol-1"), &json!({})))
        .await
        .expect("route executes");
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_event_lookup_is_not_found() {
    let h = harness();
    let response = router(&h)
        .oneshot(get("/api/v1/events/evt-missing", None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_owner_deletion_is_forbidden_not_missing() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    seed_community(&h, "owner-2", "Rival Collective");
    let event = seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));

    let response = router(&h)
        .oneshot(delete(
            &format!("/api/v1/events/{}", event.id.0),
            Some("owner-2"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let lookup = router(&h)
        .oneshot(get(&format!("/api/v1/events/{}", event.id.0), None))
        .await
        .expect("route executes");
    assert_eq!(lookup.status(), StatusCode::OK);
}

#[tokio::test]
async fn similarity_outages_map_to_bad_gateway() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));
    h.similarity.fail_next();

    let response = router(&h)
        .oneshot(post_json(
            "/api/v1/rankings/events",
            None,
            &json!({ "query": "cleanup" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn accept_route_approves_the_applicant() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    let event = seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));
    h.users.seed(volunteer("vol-1", &["teamwork"]));
    let applicant = h
        .core
        .applications
        .apply(&event.id, &user_id("vol-1"))
        .expect("application recorded");

    let response = router(&h)
        .oneshot(post_json(
            &format!(
                "/api/v1/events/{}/applicants/{}/accept",
                event.id.0, applicant.id.0
            ),
            Some("owner-1"),
            &json!({}),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["applicant"]["status"], "approved");
}

#[tokio::test]
async fn upcoming_listing_honors_the_page_parameter() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    for day in 1..=3 {
        seed_event(
            &h,
            "owner-1",
            &format!("Event {day}"),
            date(&format!("2099-06-{day:02}")),
        );
    }

    let second_page = router(&h)
        .oneshot(get("/api/v1/events?page=2", None))
        .await
        .expect("route executes");
    assert_eq!(second_page.status(), StatusCode::OK);
    let payload = read_json_body(second_page).await;
    assert_eq!(payload.as_array().unwrap().len(), 1);
    assert_eq!(payload[0]["title"], "Event 3");
}

#[tokio::test]
async fn reconcile_route_reports_repairs() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));

    let response = router(&h)
        .oneshot(post_json("/api/v1/maintenance/reconcile", None, &json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["relinked"], json!([]));
    assert_eq!(payload["unlinked"], json!([]));
}

#[tokio::test]
async fn application_status_route_reports_the_callers_entry() {
    let h = harness();
    seed_community(&h, "owner-1", "Harbor Volunteers");
    let event = seed_event(&h, "owner-1", "Beach Cleanup", date("2099-06-01"));
    h.core
        .applications
        .apply(&event.id, &user_id("vol-1"))
        .expect("application recorded");

    let response = router(&h)
        .oneshot(get(
            &format!("/api/v1/events/{}/applications/me", event.id.0),
            Some("vol-1"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "pending");

    let response = router(&h)
        .oneshot(get(
            &format!("/api/v1/events/{}/applications/me", event.id.0),
            Some("vol-2"),
        ))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], Value::Null);
}
