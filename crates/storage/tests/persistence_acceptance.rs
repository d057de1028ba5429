use shared::domain::{CurveKind, FixtureInfo, LightId, SmartOffBaseline, Status};
use storage::Storage;

#[tokio::test]
async fn configuration_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("state").join("daylight.db").display());

    let storage = Storage::new(&url).await.expect("open");
    storage
        .upsert_fixture(&FixtureInfo {
            id: LightId(5),
            name: "Porch".into(),
            light_type: "Dimmable light".into(),
            model_id: "LWB010".into(),
        })
        .await
        .expect("fixture");
    let mut light = storage.light(LightId(5)).await.expect("query").expect("light");
    let bri = storage
        .default_curve(CurveKind::Bri)
        .await
        .expect("query")
        .expect("default");
    light.bri_controlled = true;
    light.bri_max = 180.0;
    light.bri_curve_id = Some(bri.id);
    storage.save_light_config(&light).await.expect("config");
    let baseline = SmartOffBaseline {
        on: Some(true),
        bri: Some(120),
        ct: None,
        active: true,
    };
    storage
        .save_smart_off(LightId(5), &baseline)
        .await
        .expect("baseline");
    storage
        .set_status(Status { enabled: true })
        .await
        .expect("status");

    let mut edit = storage
        .edit_curve(bri.id)
        .await
        .expect("open edit")
        .expect("curve");
    edit.insert_point(300, 230.0).await.expect("insert");
    edit.set_offset(12.0).await.expect("offset");
    let edited = edit.commit().await.expect("commit");
    drop(storage);

    let reopened = Storage::new(&url).await.expect("reopen");
    assert!(reopened.status().await.expect("status").enabled);
    assert_eq!(reopened.list_curves(None).await.expect("curves").len(), 2);

    let curve = reopened.curve(bri.id).await.expect("query").expect("curve");
    assert_eq!(curve, edited);
    assert_eq!(curve.offset, 12.0);
    assert!(curve.points.iter().any(|point| point.x == 300 && point.y == 230.0));

    let light = reopened.light(LightId(5)).await.expect("query").expect("light");
    assert!(light.bri_controlled);
    assert_eq!(light.bri_max, 180.0);
    assert_eq!(light.bri_curve_id, Some(bri.id));
    assert_eq!(light.smart_off, baseline);
}
