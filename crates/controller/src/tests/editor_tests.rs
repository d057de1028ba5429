use super::*;
use crate::test_support::{add_light, harness, Harness};
use shared::domain::LightId;

async fn curve_from(h: &Harness, points: &[(i32, f64)]) -> Curve {
    let curve_id = h
        .controller
        .storage()
        .create_curve(&NewCurve {
            name: "custom".into(),
            kind: CurveKind::Bri,
            is_default: false,
            offset: 0.0,
            points: points.to_vec(),
        })
        .await
        .expect("curve");
    h.controller.curve(curve_id).await.expect("stored")
}

fn xs(curve: &Curve) -> Vec<i32> {
    curve.points.iter().map(|point| point.x).collect()
}

#[test]
fn even_positions_span_the_day() {
    assert_eq!(even_positions(2), vec![0, 1440]);
    assert_eq!(even_positions(4), vec![0, 480, 960, 1440]);
    assert_eq!(even_positions(7), vec![0, 240, 480, 720, 960, 1200, 1440]);
}

#[tokio::test]
async fn create_curve_spreads_points_and_is_never_default() {
    let h = harness().await;
    let curve = h
        .controller
        .create_curve(NewCurveRequest {
            name: " evening ".into(),
            kind: CurveKind::Ct,
            offset: 4.0,
            count: 5,
            y: 300.0,
        })
        .await
        .expect("curve");

    assert_eq!(curve.name, "evening");
    assert!(!curve.is_default);
    assert_eq!(curve.offset, 4.0);
    assert_eq!(xs(&curve), vec![0, 360, 720, 1080, 1440]);
    assert!(curve.points.iter().all(|point| point.y == 300.0));
    assert!(curve.points[0].first);
    assert!(curve.points[4].last);
    assert_eq!(curve.points.iter().filter(|p| p.is_endpoint()).count(), 2);
}

#[tokio::test]
async fn create_curve_validates_input() {
    let h = harness().await;
    let request = NewCurveRequest {
        name: "x".into(),
        kind: CurveKind::Bri,
        offset: 0.0,
        count: 1,
        y: 10.0,
    };
    for bad in [
        NewCurveRequest {
            count: 1,
            ..request.clone()
        },
        NewCurveRequest {
            name: "  ".into(),
            count: 2,
            ..request.clone()
        },
        NewCurveRequest {
            count: 2,
            y: f64::INFINITY,
            ..request.clone()
        },
    ] {
        let err = h.controller.create_curve(bad).await.expect_err("invalid");
        assert!(matches!(err, ControllerError::Validation(_)), "{err}");
    }
}

#[test]
fn new_curve_request_defaults() {
    let request: NewCurveRequest =
        serde_json::from_str(r#"{"name":"n","kind":"bri"}"#).expect("json");
    assert_eq!(request.count, 2);
    assert_eq!(request.y, 200.0);
    assert_eq!(request.offset, 0.0);
}

#[tokio::test]
async fn insert_point_bisects_and_keeps_shape() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 100.0), (300, 120.0), (500, 180.0), (1440, 200.0)]).await;
    let before = h
        .controller
        .evaluate_curve(curve.id, Some(400.0))
        .await
        .expect("value");

    let updated = h
        .controller
        .insert_point(curve.id, 1, InsertSide::After)
        .await
        .expect("insert");
    assert_eq!(xs(&updated), vec![0, 300, 400, 500, 1440]);
    assert_eq!(updated.revision, curve.revision + 1);
    let inserted = &updated.points[2];
    assert!(!inserted.is_endpoint());
    assert!((inserted.y - before).abs() < 1e-9);

    let before_side = h
        .controller
        .insert_point(curve.id, 1, InsertSide::Before)
        .await
        .expect("insert before");
    assert_eq!(xs(&before_side), vec![0, 150, 300, 400, 500, 1440]);
}

#[tokio::test]
async fn insert_point_ignores_the_offset() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 100.0), (1440, 100.0)]).await;
    h.controller
        .update_curve(
            curve.id,
            CurveUpdate {
                name: None,
                offset: Some(25.0),
            },
        )
        .await
        .expect("offset");

    let updated = h
        .controller
        .insert_point(curve.id, 0, InsertSide::After)
        .await
        .expect("insert");
    assert_eq!(updated.points[1].x, 720);
    assert_eq!(updated.points[1].y, 100.0);
    assert_eq!(
        h.controller
            .evaluate_curve(curve.id, Some(720.0))
            .await
            .expect("value"),
        125.0
    );
}

#[tokio::test]
async fn insert_point_rejects_reserved_positions() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (720, 2.0), (1440, 3.0)]).await;

    let after_last = h
        .controller
        .insert_point(curve.id, 2, InsertSide::After)
        .await
        .expect_err("after last");
    assert!(matches!(after_last, ControllerError::Validation(_)));

    let before_first = h
        .controller
        .insert_point(curve.id, 0, InsertSide::Before)
        .await
        .expect_err("before first");
    assert!(matches!(before_first, ControllerError::Validation(_)));

    let out_of_range = h
        .controller
        .insert_point(curve.id, 3, InsertSide::Before)
        .await
        .expect_err("no such anchor");
    assert!(matches!(out_of_range, ControllerError::NotFound(_)));

    let unchanged = h.controller.curve(curve.id).await.expect("curve");
    assert_eq!(unchanged, curve);
}

#[tokio::test]
async fn insert_point_needs_a_free_minute() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (1, 2.0), (3, 2.5), (1440, 3.0)]).await;

    let err = h
        .controller
        .insert_point(curve.id, 0, InsertSide::After)
        .await
        .expect_err("adjacent");
    assert!(matches!(err, ControllerError::Validation(_)));

    let updated = h
        .controller
        .insert_point(curve.id, 1, InsertSide::After)
        .await
        .expect("gap of two");
    assert_eq!(xs(&updated), vec![0, 1, 2, 3, 1440]);
}

#[tokio::test]
async fn endpoints_cannot_be_deleted() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (600, 2.0), (1440, 3.0)]).await;

    for index in [0, 2] {
        let err = h
            .controller
            .delete_point(curve.id, index)
            .await
            .expect_err("endpoint");
        assert!(matches!(err, ControllerError::Validation(_)));
    }

    let updated = h.controller.delete_point(curve.id, 1).await.expect("delete");
    assert_eq!(xs(&updated), vec![0, 1440]);

    let err = h
        .controller
        .delete_point(curve.id, 5)
        .await
        .expect_err("missing");
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn update_point_reorders_interior_points() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (300, 2.0), (600, 3.0), (1440, 4.0)]).await;

    let updated = h
        .controller
        .update_point(curve.id, 1, 900, 7.5)
        .await
        .expect("update");
    assert_eq!(xs(&updated), vec![0, 600, 900, 1440]);
    assert_eq!(updated.points[2].y, 7.5);
    assert!(updated.points[0].first && updated.points[3].last);
}

#[tokio::test]
async fn update_point_keeps_endpoints_pinned() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (600, 2.0), (1440, 3.0)]).await;

    let err = h
        .controller
        .update_point(curve.id, 0, 10, 5.0)
        .await
        .expect_err("first moved");
    assert!(matches!(err, ControllerError::Validation(_)));
    let err = h
        .controller
        .update_point(curve.id, 2, 1400, 5.0)
        .await
        .expect_err("last moved");
    assert!(matches!(err, ControllerError::Validation(_)));

    let updated = h
        .controller
        .update_point(curve.id, 2, 1440, 50.0)
        .await
        .expect("value only");
    assert_eq!(updated.points[2].y, 50.0);
    assert!(updated.points[2].last);
}

#[tokio::test]
async fn update_point_rejects_bad_positions() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (300, 2.0), (600, 3.0), (1440, 4.0)]).await;

    for (x, y) in [(-1, 1.0), (1441, 1.0), (600, 1.0), (0, 1.0), (400, f64::NAN)] {
        let err = h
            .controller
            .update_point(curve.id, 1, x, y)
            .await
            .expect_err("invalid");
        assert!(matches!(err, ControllerError::Validation(_)), "x={x}: {err}");
    }
    let err = h
        .controller
        .update_point(curve.id, 9, 400, 1.0)
        .await
        .expect_err("missing");
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn default_curves_cannot_be_deleted() {
    let h = harness().await;
    let default = h
        .controller
        .storage()
        .default_curve(CurveKind::Bri)
        .await
        .expect("query")
        .expect("default");
    let err = h
        .controller
        .delete_curve(default.id)
        .await
        .expect_err("default");
    assert!(matches!(err, ControllerError::Validation(_)));
    h.controller.curve(default.id).await.expect("still there");
}

#[tokio::test]
async fn deleting_a_curve_returns_lights_to_the_default() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (1440, 2.0)]).await;
    add_light(&h.controller, 5, |light| light.bri_curve_id = Some(curve.id)).await;

    h.controller.delete_curve(curve.id).await.expect("delete");

    let err = h.controller.curve(curve.id).await.expect_err("gone");
    assert!(matches!(err, ControllerError::NotFound(_)));
    let light = h.controller.light(LightId(5)).await.expect("light");
    assert_eq!(light.bri_curve_id, None);

    let err = h
        .controller
        .delete_curve(curve.id)
        .await
        .expect_err("twice");
    assert!(matches!(err, ControllerError::NotFound(_)));
}

#[tokio::test]
async fn set_default_moves_the_flag_within_the_kind() {
    let h = harness().await;
    let previous = h
        .controller
        .storage()
        .default_curve(CurveKind::Bri)
        .await
        .expect("query")
        .expect("default");
    let curve = curve_from(&h, &[(0, 1.0), (1440, 2.0)]).await;

    let promoted = h.controller.set_default_curve(curve.id).await.expect("default");
    assert!(promoted.is_default);

    let bri: Vec<Curve> = h
        .controller
        .list_curves(Some(CurveKind::Bri))
        .await
        .expect("curves");
    assert_eq!(bri.iter().filter(|curve| curve.is_default).count(), 1);
    let demoted = h.controller.curve(previous.id).await.expect("previous");
    assert!(!demoted.is_default);
    assert!(demoted.revision > previous.revision);

    let ct_default = h
        .controller
        .storage()
        .default_curve(CurveKind::Ct)
        .await
        .expect("query");
    assert!(ct_default.is_some());
}

#[tokio::test]
async fn update_curve_renames_and_rejects_empty_names() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (1440, 2.0)]).await;

    let renamed = h
        .controller
        .update_curve(
            curve.id,
            CurveUpdate {
                name: Some("night".into()),
                offset: None,
            },
        )
        .await
        .expect("rename");
    assert_eq!(renamed.name, "night");
    assert_eq!(renamed.offset, 0.0);

    let err = h
        .controller
        .update_curve(
            curve.id,
            CurveUpdate {
                name: Some(String::new()),
                offset: None,
            },
        )
        .await
        .expect_err("empty");
    assert!(matches!(err, ControllerError::Validation(_)));
}

#[tokio::test]
async fn concurrent_inserts_on_one_curve_both_apply() {
    let h = harness().await;
    let curve = curve_from(&h, &[(0, 1.0), (1440, 2.0)]).await;

    let (a, b) = tokio::join!(
        h.controller.insert_point(curve.id, 0, InsertSide::After),
        h.controller.insert_point(curve.id, 0, InsertSide::After),
    );
    a.expect("first");
    b.expect("second");

    let curve = h.controller.curve(curve.id).await.expect("curve");
    assert_eq!(xs(&curve), vec![0, 360, 720, 1440]);
    assert_eq!(curve.revision, 2);
}
